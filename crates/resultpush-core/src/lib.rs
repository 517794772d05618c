//! Test result publishing pipeline.
//!
//! This crate turns JUnit XML reports into the ingestion XML of the test
//! management server and pushes them over an authenticated session:
//!
//! - Streaming JUnit decoder producing [`ResultRecord`]s
//! - Streaming ingestion XML encoder with run metadata
//! - Session client with implicit login and a single re-login on 401
//! - Publish orchestrator with optional status polling
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use resultpush_core::{PublishResult, PublishSettings, Publisher};
//!
//! # async fn example() -> PublishResult<()> {
//! let settings = PublishSettings::new("https://octane.example.com", 1001, 1002)
//!     .with_password("ci-user", "secret")
//!     .with_check_result(None);
//!
//! let summary = Publisher::new(&settings)
//!     .publish(&[PathBuf::from("target/junit.xml")])
//!     .await?;
//! for (file, outcome) in summary.pushed() {
//!     println!("{} -> {}", file.display(), outcome.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Authentication
//!
//! - User and password posted to the JSON sign-in endpoint (session cookie)
//! - IDP access token exchanged through the OAuth2 token-exchange grant
//!
//! Every request carries the `HPECLIENTTYPE` client header; proxies apply to
//! authentication requests as well.

pub mod auth;
pub mod client;
pub mod encoder;
pub mod error;
pub mod junit;
pub mod model;
pub mod publish;
pub mod settings;

// Re-export main types
pub use auth::{AuthMethod, SessionToken};
pub use client::{PushOutcome, PushState, PushStatus, SessionClient};
pub use encoder::TestResultEncoder;
pub use error::{
    ClientError, ClientResult, DecodeError, DecodeResult, EncodeError, EncodeResult,
    PublishError, PublishResult, SettingsError, SettingsResult, EXIT_CONFIG_ERROR, EXIT_FAILURE,
    EXIT_SUCCESS,
};
pub use junit::JunitDecoder;
pub use model::{ErrorInfo, ResultRecord, ResultStatus};
pub use publish::{poll_status, FileOutcome, FileReport, PublishSummary, Publisher};
pub use settings::{
    BuildContext, Credentials, ProxySettings, PublishSettings, ReleaseRef, ResultMetadata, Secret,
    SuiteRef, TypedValue,
};
