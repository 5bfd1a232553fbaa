pub(crate) mod json;
pub(crate) mod redact;
pub(crate) mod retry;
