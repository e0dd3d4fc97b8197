pub(crate) mod ai_contexts;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod reviews;
pub(crate) mod router;
pub(crate) mod submissions;
