use std::fmt::Display;

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Could not parse input at byte {offset} (path '{path}'): {message}")]
    Parse {
        message: String,
        path: String,
        offset: u64,
    },

    #[error("CRS {0} is not supported.")]
    UnsupportedCrs(String),

    #[error("Invalid coordinates '{value}': {message}")]
    InvalidCoordinates { value: String, message: String },

    #[error("Coordinate dimension mismatch, expected {expected}, found {found}.")]
    Dimension { expected: usize, found: usize },

    #[error("Feature events out of order: {0}")]
    EventOrder(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Error while processing the geozero target.")]
    Geozero(#[from] geozero::error::GeozeroError),

    #[error("Serde error.")]
    Serde(#[from] serde_json::error::Error),

    #[error("Could not deserialize feature: {0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse(message: impl Into<String>, path: impl Into<String>, offset: u64) -> Self {
        Error::Parse {
            message: message.into(),
            path: path.into(),
            offset,
        }
    }

    pub(crate) fn coordinates(value: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidCoordinates {
            value: value.into(),
            message: message.into(),
        }
    }
}

impl From<Error> for geozero::error::GeozeroError {
    fn from(err: Error) -> Self {
        match err {
            Error::Geozero(inner) => inner,
            other => geozero::error::GeozeroError::Feature(other.to_string()),
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Message(msg.to_string())
    }
}
