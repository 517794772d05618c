//! Result records produced by the JUnit decoder and consumed by the encoder.

use std::fmt;

/// Maximum length (in characters) of a test name.
pub const MAX_TEST_NAME_LEN: usize = 255;

/// Outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Passed,
    Skipped,
    Failed,
}

impl ResultStatus {
    /// Name used by the ingestion XML (`status` attribute of `test_run`).
    pub fn external_name(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Skipped => "Skipped",
            Self::Failed => "Failed",
        }
    }

    /// Inverse of [`ResultStatus::external_name`].
    pub fn from_external_name(name: &str) -> Option<Self> {
        match name {
            "Passed" => Some(Self::Passed),
            "Skipped" => Some(Self::Skipped),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.external_name())
    }
}

/// Failure details attached to a failed test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Value of the `type` attribute (e.g. an exception class).
    pub kind: Option<String>,
    /// Value of the `message` attribute.
    pub message: Option<String>,
    /// Accumulated character data of the `failure`/`error` element.
    pub stack_trace: Option<String>,
}

/// One test outcome.
///
/// Error details can only be present when the status is [`ResultStatus::Failed`];
/// the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    package: String,
    class: String,
    name: String,
    status: ResultStatus,
    duration_ms: u64,
    started_ms: i64,
    error: Option<ErrorInfo>,
}

impl ResultRecord {
    /// Create a passed or skipped record. A `Failed` status is accepted and
    /// carries no error details.
    pub fn new(
        package: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
        status: ResultStatus,
        duration_ms: u64,
        started_ms: i64,
    ) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
            name: truncate_name(name.into()),
            status,
            duration_ms,
            started_ms,
            error: None,
        }
    }

    /// Create a failed record with error details.
    pub fn failed(
        package: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
        duration_ms: u64,
        started_ms: i64,
        error: ErrorInfo,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::new(
                package,
                class,
                name,
                ResultStatus::Failed,
                duration_ms,
                started_ms,
            )
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn started_ms(&self) -> i64 {
        self.started_ms
    }

    /// Error details; always `None` unless the status is `Failed`.
    pub fn error(&self) -> Option<&ErrorInfo> {
        match self.status {
            ResultStatus::Failed => self.error.as_ref(),
            _ => None,
        }
    }
}

/// Truncate to [`MAX_TEST_NAME_LEN`] characters (not bytes).
pub(crate) fn truncate_name(name: String) -> String {
    match name.char_indices().nth(MAX_TEST_NAME_LEN) {
        Some((cut, _)) => name[..cut].to_string(),
        None => name,
    }
}
