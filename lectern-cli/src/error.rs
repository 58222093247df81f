use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load error: {0}")]
    Load(#[from] lectern_engine::LoadError),

    #[error("Source error: {0}")]
    Source(#[from] lectern_engine::SourceError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
