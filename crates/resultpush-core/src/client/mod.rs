//! Session client for pushing test results.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::auth::AuthMethod;
use crate::error::{ClientError, ClientResult};
use crate::settings::{ProxySettings, PublishSettings};

mod helpers;
mod http;

use helpers::resolve_template;
use http::{HttpBackend, SessionState};

/// Client identification header sent with every request.
pub const CLIENT_TYPE_HEADER: &str = "HPECLIENTTYPE";
/// Value of [`CLIENT_TYPE_HEADER`].
pub const CLIENT_TYPE_VALUE: &str = "HPE_CI_CLIENT";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

const WORKSPACE_API_TEMPLATE: &str =
    "api/shared_spaces/{shared-space-id}/workspaces/{workspace-id}";
const PUSH_TEMPLATE: &str = "test-results?skip-errors={skip-errors}";
const STATUS_TEMPLATE: &str = "test-results/{id}";

/// Ingestion state reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushState {
    Queued,
    Running,
    Success,
    Warning,
    Failed,
    Error,
    /// A state this client does not know; treated as terminal.
    Other(String),
}

impl PushState {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "success" => Self::Success,
            "warning" => Self::Warning,
            "failed" => Self::Failed,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Other(raw) => raw,
        }
    }

    /// Polling stops at a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status document of one pushed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushStatus {
    pub state: PushState,
    pub until: Option<DateTime<FixedOffset>>,
    pub error_details: Option<String>,
}

/// Result of one push: the server id and, when polled, the last status seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub id: u64,
    pub status: Option<PushStatus>,
}

impl PushOutcome {
    /// False when polling ended before a terminal state was reached.
    pub fn is_confirmed(&self) -> bool {
        self.status
            .as_ref()
            .map_or(true, |status| status.state.is_terminal())
    }
}

/// Authenticated client bound to one shared space and workspace.
///
/// Owns the connection pool and the session for the whole run. Call
/// [`SessionClient::release`] once at the end to sign out.
#[derive(Debug)]
pub struct SessionClient {
    http: HttpBackend,
    workspace_url: String,
    skip_errors: bool,
    internal: bool,
}

impl SessionClient {
    pub fn new(settings: &PublishSettings) -> ClientResult<Self> {
        let server_url = settings.server_url().to_string();
        if server_url.is_empty() {
            return Err(ClientError::Config {
                message: "server URL is not set".to_string(),
            });
        }
        let (Some(shared_space), Some(workspace)) = (settings.shared_space, settings.workspace)
        else {
            return Err(ClientError::Config {
                message: "shared space and workspace must be set".to_string(),
            });
        };

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            HeaderName::from_static("hpeclienttype"),
            HeaderValue::from_static(CLIENT_TYPE_VALUE),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(proxy) = &settings.proxy {
            builder = builder.proxy(build_proxy(proxy)?);
        }
        let client = builder.build().map_err(|e| ClientError::Config {
            message: format!("failed to create HTTP client: {e}"),
        })?;

        let workspace_path = resolve_template(
            WORKSPACE_API_TEMPLATE,
            &[
                ("shared-space-id", shared_space.to_string().as_str()),
                ("workspace-id", workspace.to_string().as_str()),
            ],
        );

        Ok(Self {
            workspace_url: format!("{server_url}/{workspace_path}"),
            http: HttpBackend {
                client,
                server_url,
                auth: AuthMethod::from_credentials(&settings.credentials),
                state: SessionState::LoggedOut,
            },
            skip_errors: settings.skip_errors,
            internal: settings.internal,
        })
    }

    /// Authenticate now. Repeating it re-authenticates and replaces the session.
    pub async fn login(&mut self) -> ClientResult<()> {
        self.http.login().await.map(|_| ())
    }

    /// Sign out. Does nothing when not logged in.
    pub async fn logout(&mut self) -> ClientResult<()> {
        self.http.logout().await
    }

    /// Sign out and drop the connection pool.
    pub async fn release(mut self) -> ClientResult<()> {
        self.logout().await
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.http.state, SessionState::LoggedIn(_))
    }

    /// Push an ingestion document and return the server-assigned id.
    pub async fn push_result(&mut self, payload: Vec<u8>) -> ClientResult<u64> {
        let url = self.push_url();
        debug!(url = %url, bytes = payload.len(), "pushing test result");
        self.http.push(&url, payload, self.internal).await
    }

    /// Fetch the ingestion status of a pushed result.
    pub async fn get_status(&mut self, id: u64) -> ClientResult<PushStatus> {
        let url = self.status_url(id);
        debug!(url = %url, "fetching test result status");
        self.http.status(&url).await
    }

    /// Workspace-scoped URL for an already-resolved relative path.
    pub fn workspace_url(&self, relative: &str) -> String {
        format!("{}/{}", self.workspace_url, relative)
    }

    fn push_url(&self) -> String {
        self.workspace_url(&resolve_template(
            PUSH_TEMPLATE,
            &[("skip-errors", self.skip_errors.to_string().as_str())],
        ))
    }

    fn status_url(&self, id: u64) -> String {
        self.workspace_url(&resolve_template(
            STATUS_TEMPLATE,
            &[("id", id.to_string().as_str())],
        ))
    }
}

fn build_proxy(settings: &ProxySettings) -> ClientResult<reqwest::Proxy> {
    let port = settings.port.ok_or_else(|| ClientError::Config {
        message: format!("proxy port is not set for proxy host {}", settings.host),
    })?;
    let url = if settings.host.contains("://") {
        format!("{}:{}", settings.host, port)
    } else {
        format!("http://{}:{}", settings.host, port)
    };
    let mut proxy = reqwest::Proxy::all(&url).map_err(|e| ClientError::Config {
        message: format!("invalid proxy {url}: {e}"),
    })?;
    if let Some(user) = &settings.user {
        let password = settings
            .password
            .as_ref()
            .map(|p| p.expose_str().into_owned())
            .unwrap_or_default();
        proxy = proxy.basic_auth(user, &password);
    }
    Ok(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(settings: PublishSettings) -> SessionClient {
        SessionClient::new(&settings).unwrap()
    }

    #[test]
    fn test_client_type_header_name_matches() {
        assert_eq!(
            HeaderName::from_static("hpeclienttype").as_str(),
            CLIENT_TYPE_HEADER.to_ascii_lowercase()
        );
    }

    #[test]
    fn test_workspace_urls() {
        let client = client(
            PublishSettings::new("http://localhost:8080/", 1001, 1002).with_skip_errors(true),
        );
        assert_eq!(
            client.push_url(),
            "http://localhost:8080/api/shared_spaces/1001/workspaces/1002/test-results?skip-errors=true"
        );
        assert_eq!(
            client.status_url(55),
            "http://localhost:8080/api/shared_spaces/1001/workspaces/1002/test-results/55"
        );
        assert!(!client.is_logged_in());
    }

    #[test]
    fn test_new_requires_workspace() {
        let mut settings = PublishSettings::new("http://localhost:8080", 1001, 1002);
        settings.workspace = None;
        assert!(matches!(
            SessionClient::new(&settings),
            Err(ClientError::Config { .. })
        ));
    }

    #[test]
    fn test_proxy_with_credentials_builds() {
        let proxy = ProxySettings::new("proxy.local", 3128).with_credentials("u", "p".into());
        assert!(build_proxy(&proxy).is_ok());

        let mut no_port = ProxySettings::new("proxy.local", 3128);
        no_port.port = None;
        assert!(build_proxy(&no_port).is_err());
    }

    #[test]
    fn test_push_state_terminal() {
        for raw in ["success", "warning", "failed", "error"] {
            assert!(PushState::from_wire(raw).is_terminal(), "{raw}");
        }
        assert!(!PushState::from_wire("queued").is_terminal());
        assert!(!PushState::Running.is_terminal());
        assert_eq!(PushState::from_wire("archived").as_str(), "archived");
    }

    #[test]
    fn test_outcome_confirmed() {
        let unpolled = PushOutcome { id: 1, status: None };
        assert!(unpolled.is_confirmed());

        let pending = PushOutcome {
            id: 1,
            status: Some(PushStatus {
                state: PushState::Running,
                until: None,
                error_details: None,
            }),
        };
        assert!(!pending.is_confirmed());
    }
}
