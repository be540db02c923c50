//! Certificate generation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertgenError {
    #[error("certificate generation failed: {0}")]
    Generation(String),

    #[error("invalid subject name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("failed to write certificate: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rcgen::Error> for CertgenError {
    fn from(e: rcgen::Error) -> Self {
        Self::Generation(e.to_string())
    }
}
