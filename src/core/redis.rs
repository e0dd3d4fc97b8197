use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

/// Lazily connected Redis handle. Every caller treats a missing connection as
/// "no limiting" so the grading path never depends on Redis being up.
#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

/// Outcome of trying to claim an attempt while it is being graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitClaim {
    /// We own the attempt until `release_submission`.
    Held,
    /// Another request is grading the same attempt right now.
    Taken,
    /// Redis is not connected or the guard is disabled.
    Unguarded,
}

fn submit_key(learner_id: &str, unit_id: &str, attempt_no: i32) -> String {
    format!("quiz-submit:{unit_id}:{learner_id}:{attempt_no}")
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let manager = ConnectionManager::new(Client::open(self.url.as_str())?).await?;
        *self.manager.write().await = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        self.manager.write().await.take();
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut conn) = self.connection().await else {
            return RedisHealth::Disconnected;
        };
        match cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Claims `(learner, unit, attempt)` for the duration of one grading request so a
    /// double click does not grade the same attempt twice. The TTL only bounds a claim
    /// whose owner died before releasing it.
    pub(crate) async fn claim_submission(
        &self,
        learner_id: &str,
        unit_id: &str,
        attempt_no: i32,
        ttl_seconds: u64,
    ) -> Result<SubmitClaim, RedisError> {
        if ttl_seconds == 0 {
            return Ok(SubmitClaim::Unguarded);
        }
        let Some(mut conn) = self.connection().await else {
            return Ok(SubmitClaim::Unguarded);
        };

        let claimed: Option<String> = cmd("SET")
            .arg(submit_key(learner_id, unit_id, attempt_no))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(if claimed.is_some() { SubmitClaim::Held } else { SubmitClaim::Taken })
    }

    pub(crate) async fn release_submission(
        &self,
        learner_id: &str,
        unit_id: &str,
        attempt_no: i32,
    ) -> Result<(), RedisError> {
        let Some(mut conn) = self.connection().await else {
            return Ok(());
        };
        cmd("DEL")
            .arg(submit_key(learner_id, unit_id, attempt_no))
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }
}
