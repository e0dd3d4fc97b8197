pub(crate) mod ai_context;
pub(crate) mod ai_correction;
pub(crate) mod ai_service;
pub(crate) mod keyword_scoring;
pub(crate) mod notifications;
pub(crate) mod pending_review;
pub(crate) mod question_corrector;
pub(crate) mod result_aggregator;
pub(crate) mod retry_fallback;
pub(crate) mod retry_state;
pub(crate) mod storage;
pub(crate) mod submission_ingest;
