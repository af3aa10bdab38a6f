/*!
error module defines the error types used in mrt-collector.
*/
use oneio::OneIoError;
use std::fmt::{Display, Formatter};
use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum CollectorError {
    IoError(io::Error),
    OneIoError(OneIoError),
    HttpError(reqwest::Error),
    /// A source's collector index page could not be fetched or parsed.
    SourceIndexError { url: String, reason: String },
    /// The snapshot timestamp violates a source's dump cadence.
    CadenceError(String),
    /// The external MRT decoder failed for one file.
    DecoderError { url: String, reason: String },
    /// A per-record failure inside the enrichment core (dropped, never fatal).
    RecordError(String),
    ConfigError(String),
}

impl Error for CollectorError {}

impl Display for CollectorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CollectorError::IoError(e) => write!(f, "Error: {e}"),
            CollectorError::OneIoError(e) => write!(f, "Error: {e}"),
            CollectorError::HttpError(e) => write!(f, "Error: {e}"),
            CollectorError::SourceIndexError { url, reason } => {
                write!(f, "Error: source index {url} unreachable: {reason}")
            }
            CollectorError::CadenceError(s) => write!(f, "Error: {s}"),
            CollectorError::DecoderError { url, reason } => {
                write!(f, "Error: decoding {url} failed: {reason}")
            }
            CollectorError::RecordError(s) => write!(f, "Error: {s}"),
            CollectorError::ConfigError(s) => write!(f, "Error: {s}"),
        }
    }
}

impl From<io::Error> for CollectorError {
    fn from(error: io::Error) -> Self {
        CollectorError::IoError(error)
    }
}

impl From<OneIoError> for CollectorError {
    fn from(error: OneIoError) -> Self {
        CollectorError::OneIoError(error)
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(error: reqwest::Error) -> Self {
        CollectorError::HttpError(error)
    }
}
