#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Render plan not found: {0}")]
    PlanNotFound(String),

    #[error("Render plan malformed: {0}")]
    PlanMalformed(String),

    #[error("Task index {index} out of range for plan with {len} tasks")]
    TaskIndexOutOfRange { index: i64, len: usize },

    #[error("Task index unresolvable: {0}")]
    TaskIndexUnresolvable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
