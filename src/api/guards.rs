use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

/// Verified subject of a platform token. Learners and reviewers share one id space;
/// this service never looks accounts up.
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser(pub(crate) String);

impl CurrentUser {
    /// Learners may only act on their own answers.
    pub(crate) fn ensure_is(&self, learner_id: &str) -> Result<(), ApiError> {
        if self.0 == learner_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Cannot act on behalf of another learner"))
        }
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

        let claims = security::verify_token(token, state.settings()).map_err(|err| {
            tracing::debug!(error = %err, "Bearer token rejected");
            ApiError::Unauthorized(INVALID_CREDENTIALS)
        })?;

        let subject = claims.sub.trim();
        if subject.is_empty() {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        }
        Ok(CurrentUser(subject.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[test]
    fn bearer_requires_scheme_and_token() {
        assert_eq!(bearer(&parts(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer(&parts(Some("Bearer   "))), None);
        assert_eq!(bearer(&parts(None)), None);
    }

    #[test]
    fn learners_act_only_for_themselves() {
        let user = CurrentUser("learner-1".to_string());
        assert!(user.ensure_is("learner-1").is_ok());
        assert!(matches!(user.ensure_is("learner-2"), Err(ApiError::Forbidden(_))));
    }
}
