//! Error types for decoding, encoding, publishing and the session client.

use std::path::PathBuf;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for a failed run (decode, encode, push or authentication failure).
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for invalid settings or usage.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// JUnit decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The report could not be opened or read.
    #[error("can not read the JUnit XML file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or unclosed XML.
    #[error("unable to process JUnit XML file {}, XML stream error at position {position}: {message}", .path.display())]
    Xml {
        path: PathBuf,
        position: u64,
        message: String,
    },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Ingestion XML encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The sink could not be opened or written.
    #[error("unable to write test results: {0}")]
    Io(#[from] std::io::Error),

    /// The XML writer rejected an event.
    #[error("XML stream error while writing test results: {message}")]
    Xml { message: String },

    /// Record iteration failed partway; the document was closed before returning.
    #[error(transparent)]
    Records(#[from] DecodeError),

    /// The record sequence was empty; no sink was opened.
    #[error("no test results to write")]
    NoRecords,
}

impl From<quick_xml::Error> for EncodeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml {
            message: err.to_string(),
        }
    }
}

pub type EncodeResult<T> = Result<T, EncodeError>;

/// Invalid publish settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A setting required for pushing is missing.
    #[error("mandatory setting '{name}' was not specified in the CLI arguments or configuration file")]
    Missing { name: &'static str },

    /// A setting has an invalid value or conflicts with another one.
    #[error("{message}")]
    Invalid { message: String },
}

impl SettingsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Session client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Sign-in or token exchange was refused.
    #[error("authentication failed: {message}")]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// The server answered 401 again after a fresh login.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The server refused internal-format XML (HTTP 400 in internal mode).
    #[error("test result XML was refused by server{description}")]
    Validation { description: String },

    /// Push answered with an unexpected status.
    #[error("test result post failed with status code ({status}){description}")]
    Push { status: u16, description: String },

    /// A response body was not the expected JSON.
    #[error("test result post ended with status code ({status}). Validate that the server URL is defined with its fully qualified domain name. Original message: {body}")]
    InvalidResponse { status: u16, body: String },

    /// Status endpoint failed or answered with an unreadable document.
    #[error("result status retrieval failed: {message}")]
    StatusRetrieval { message: String },

    /// Sign-out was refused.
    #[error("logout failed: code={status}")]
    Logout { status: u16 },

    /// Transport failure (connect, TLS, proxy, timeout).
    #[error("network error: {message}")]
    Network { message: String },

    /// The HTTP client could not be built from the settings.
    #[error("client configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    /// Only validation rejections are recoverable per file.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Run-level errors of the publish orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unable to process test results to file {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    /// The JUnit report contained no named test cases.
    #[error("no valid test results to push in JUnit XML file {}", .path.display())]
    EmptyResult { path: PathBuf },

    #[error("unable to push test result: {0}")]
    Client(#[from] ClientError),

    /// Scratch file for the encoded payload could not be created or read.
    #[error("can not create temp file for test result: {0}")]
    Scratch(#[source] std::io::Error),
}

impl PublishError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Settings(_) => EXIT_CONFIG_ERROR,
            Self::Decode(_)
            | Self::Encode { .. }
            | Self::EmptyResult { .. }
            | Self::Client(_)
            | Self::Scratch(_) => EXIT_FAILURE,
        }
    }
}

pub type PublishResult<T> = Result<T, PublishError>;
