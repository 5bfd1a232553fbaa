use uuid::Uuid;

/// Per-run context threaded through every stage for logging and snapshot naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: Uuid,
    pub query: String,
    pub top_n: usize,
}

impl JobContext {
    pub fn new(query: impl Into<String>, top_n: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            query: query.into(),
            top_n,
        }
    }
}
