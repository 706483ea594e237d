use thiserror::Error;

#[derive(Error, Debug)]
pub enum CronsyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event parse error: {0}")]
    EventParse(#[from] serde_json::Error),

    #[error("Invalid deployment record: {0}")]
    InvalidRecord(String),
}
