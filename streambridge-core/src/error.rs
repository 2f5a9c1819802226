use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Source Error - {0}")]
    Source(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Transformer Error - {0}")]
    Transformer(String),

    #[error("Failure Sink Error - {0}")]
    Failure(String),

    #[error("Bad Row Error - {0}")]
    BadRow(String),

    #[error("Config Error - {0}")]
    Config(String),

    /// The process cannot safely continue, e.g. a checkpoint-blocked source
    /// could not deliver. Returned up the stack so the hosting process can
    /// decide how to terminate.
    #[error("Fatal Error - {0}")]
    Fatal(String),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}
