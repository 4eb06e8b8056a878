//! Error types shared by the session store, the model adapter and the HTTP layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid image: {0}")]
    ImageDecode(String),

    #[error("Invalid session_id: {0}")]
    SessionNotFound(String),

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("SAM prediction failed: {0}")]
    ModelFailure(String),

    #[error("Invalid password")]
    AuthFailure,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageDecode(err.to_string())
    }
}

impl From<ort::Error> for Error {
    fn from(err: ort::Error) -> Self {
        Error::ModelFailure(err.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::ModelFailure(format!("unexpected tensor shape: {err}"))
    }
}
