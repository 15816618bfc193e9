use thiserror::Error;

#[derive(Error, Debug)]
pub enum HerdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("{tool} exited with {status}")]
    Tool { tool: String, status: String },

    #[error("{tool} timed out")]
    ToolTimeout { tool: String },

    #[error("spawn failed for loop {loop_id}: {reason}")]
    Spawn { loop_id: String, reason: String },
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, HerdError>;
