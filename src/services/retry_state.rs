use time::{Duration, PrimitiveDateTime};

/// Bounded retry bookkeeping shared by the AI retry queue and reviewer reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryState {
    pub(crate) count: u32,
    pub(crate) last_attempt_at: Option<PrimitiveDateTime>,
    pub(crate) max_attempts: u32,
}

impl RetryState {
    pub(crate) fn new(max_attempts: u32) -> Self {
        Self { count: 0, last_attempt_at: None, max_attempts }
    }

    /// Builds state from stored columns; negative values count as zero.
    pub(crate) fn from_stored(
        count: i32,
        last_attempt_at: Option<PrimitiveDateTime>,
        max_attempts: i32,
    ) -> Self {
        Self {
            count: count.max(0) as u32,
            last_attempt_at,
            max_attempts: max_attempts.max(0) as u32,
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.count >= self.max_attempts
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.count)
    }

    /// True when another attempt is allowed and `min_gap` has passed since the last one.
    pub(crate) fn is_due(&self, now: PrimitiveDateTime, min_gap: Duration) -> bool {
        if self.is_exhausted() {
            return false;
        }
        match self.last_attempt_at {
            Some(last) => now - last >= min_gap,
            None => true,
        }
    }

    pub(crate) fn record_attempt(self, at: PrimitiveDateTime) -> Self {
        Self { count: self.count.saturating_add(1), last_attempt_at: Some(at), ..self }
    }

    pub(crate) fn count_i32(&self) -> i32 {
        i32::try_from(self.count).unwrap_or(i32::MAX)
    }
}
