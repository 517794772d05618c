//! Publish settings: server coordinates, credentials and result metadata.
//!
//! The value is assembled by the caller (CLI flags, configuration file) with
//! the `with_*` builders, checked once with [`PublishSettings::validate`], and
//! then only read by the encoder, the session client and the orchestrator.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{SettingsError, SettingsResult};

/// Poll timeout used when result checking is enabled without an explicit timeout.
pub const DEFAULT_CHECK_RESULT_TIMEOUT_SECS: u32 = 10;

/// Secret bytes that never show up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view for headers and JSON bodies.
    pub fn expose_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How the session client authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// User and password posted as JSON to the sign-in endpoint.
    Password { user: String, password: Secret },
    /// An IDP access token exchanged for a bearer token (OAuth2 token exchange).
    /// `user`/`password` identify the client in the Basic auth header.
    AccessToken {
        user: String,
        password: Secret,
        token: Secret,
    },
}

impl Default for Credentials {
    fn default() -> Self {
        Self::Password {
            user: String::new(),
            password: Secret::default(),
        }
    }
}

/// HTTP proxy applied to every request, including authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<Secret>,
}

impl ProxySettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            user: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: Secret) -> Self {
        self.user = Some(user.into());
        self.password = Some(password);
        self
    }
}

/// CI build that produced the results. All three parts are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub server_id: String,
    pub job_id: String,
    pub build_id: String,
}

/// Release assignment; an id and the default release are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRef {
    Id(u64),
    Default,
}

/// Suite assignment with an optional external run name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteRef {
    pub id: u64,
    pub external_run_id: Option<String>,
}

/// A validated `TYPE:VALUE` tag (field or environment taxonomy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValue {
    pub kind: String,
    pub value: String,
}

impl TypedValue {
    /// Parse `TYPE:VALUE`, splitting once on the first `:`.
    pub fn parse(raw: &str) -> SettingsResult<Self> {
        if !tag_pattern().is_match(raw) {
            return Err(SettingsError::invalid(format!(
                "tag and field tag arguments must be in TYPE:VALUE format: {raw}"
            )));
        }
        let (kind, value) = raw.split_once(':').ok_or_else(|| {
            SettingsError::invalid(format!("missing ':' in TYPE:VALUE argument: {raw}"))
        })?;
        Ok(Self {
            kind: kind.to_string(),
            value: value.to_string(),
        })
    }
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let part = r"\w([\s\w._]+)?\w";
        Regex::new(&format!("^{part}:{part}$")).expect("static tag pattern is valid")
    })
}

/// Metadata written into the ingestion document header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultMetadata {
    pub release: Option<ReleaseRef>,
    pub program: Option<u64>,
    pub milestone: Option<u64>,
    pub suite: Option<SuiteRef>,
    pub build_context: Option<BuildContext>,
    pub backlog_items: Vec<u64>,
    pub product_areas: Vec<u64>,
    pub fields: Vec<TypedValue>,
    pub environment: Vec<TypedValue>,
    /// Start time (epoch ms) for every test; the run start time when unset.
    pub started: Option<i64>,
}

impl ResultMetadata {
    /// True when any option that only applies to JUnit input is set.
    fn has_junit_only_options(&self) -> bool {
        self.release.is_some()
            || self.program.is_some()
            || self.milestone.is_some()
            || self.suite.is_some()
            || self.build_context.is_some()
            || !self.backlog_items.is_empty()
            || !self.product_areas.is_empty()
            || !self.fields.is_empty()
            || !self.environment.is_empty()
            || self.started.is_some()
    }
}

/// Everything the publish pipeline needs for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSettings {
    pub server: Option<String>,
    pub shared_space: Option<u64>,
    pub workspace: Option<u64>,
    pub credentials: Credentials,
    pub proxy: Option<ProxySettings>,
    /// Ask the server to skip invalid test runs instead of refusing the payload.
    pub skip_errors: bool,
    /// Input files are already in the ingestion XML format.
    pub internal: bool,
    /// Write the encoded document here instead of pushing it.
    pub output_file: Option<PathBuf>,
    /// Poll the ingestion status after each push.
    pub check_result: bool,
    pub check_result_timeout_secs: Option<u32>,
    pub metadata: ResultMetadata,
}

impl PublishSettings {
    pub fn new(server: impl Into<String>, shared_space: u64, workspace: u64) -> Self {
        Self {
            server: Some(server.into()),
            shared_space: Some(shared_space),
            workspace: Some(workspace),
            ..Self::default()
        }
    }

    /// Settings for write-only mode; no server access is needed.
    pub fn write_only(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: Some(output_file.into()),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_password(mut self, user: impl Into<String>, password: impl Into<Secret>) -> Self {
        self.credentials = Credentials::Password {
            user: user.into(),
            password: password.into(),
        };
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_skip_errors(mut self, skip: bool) -> Self {
        self.skip_errors = skip;
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_check_result(mut self, timeout_secs: Option<u32>) -> Self {
        self.check_result = true;
        self.check_result_timeout_secs = timeout_secs;
        self
    }

    pub fn with_metadata(mut self, metadata: ResultMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Effective poll timeout in seconds.
    pub fn check_result_timeout(&self) -> u32 {
        self.check_result_timeout_secs
            .unwrap_or(DEFAULT_CHECK_RESULT_TIMEOUT_SECS)
    }

    /// Server base URL without a trailing slash; empty when unset.
    pub fn server_url(&self) -> &str {
        self.server.as_deref().unwrap_or("").trim_end_matches('/')
    }

    /// Check cross-field constraints. `input_count` is the number of input files.
    pub fn validate(&self, input_count: usize) -> SettingsResult<()> {
        if self.internal {
            if self.output_file.is_some() {
                return Err(SettingsError::invalid(
                    "invalid argument for internal mode: 'output-file'",
                ));
            }
            if self.metadata.has_junit_only_options() {
                return Err(SettingsError::invalid(
                    "metadata arguments are not allowed in internal mode",
                ));
            }
        }

        if self.output_file.is_some() {
            if input_count != 1 {
                return Err(SettingsError::invalid(
                    "only single JUnit input file is allowed for output mode",
                ));
            }
            return Ok(());
        }

        if self.server.as_deref().map_or(true, str::is_empty) {
            return Err(SettingsError::Missing { name: "server" });
        }
        if self.shared_space.is_none() {
            return Err(SettingsError::Missing {
                name: "sharedspace",
            });
        }
        if self.workspace.is_none() {
            return Err(SettingsError::Missing { name: "workspace" });
        }

        if let Some(proxy) = &self.proxy {
            if proxy.port.is_none() {
                return Err(SettingsError::invalid(format!(
                    "proxy port was not specified for proxy host: {}",
                    proxy.host
                )));
            }
            if proxy.password.is_some() && proxy.user.is_none() {
                return Err(SettingsError::invalid(
                    "proxy user name was not specified for proxy password",
                ));
            }
        }

        if let Some(timeout) = self.check_result_timeout_secs {
            if timeout < 1 {
                return Err(SettingsError::invalid("timeout has to be positive integer"));
            }
        }

        Ok(())
    }
}

/// Collect a build context from its three optional parts; all or none.
pub fn build_context(
    server_id: Option<String>,
    job_id: Option<String>,
    build_id: Option<String>,
) -> SettingsResult<Option<BuildContext>> {
    match (server_id, job_id, build_id) {
        (None, None, None) => Ok(None),
        (Some(server_id), Some(job_id), Some(build_id)) => Ok(Some(BuildContext {
            server_id,
            job_id,
            build_id,
        })),
        (server_id, job_id, build_id) => {
            let missing: Vec<&str> = [
                ("build-context-server-id", server_id.is_none()),
                ("build-context-job-id", job_id.is_none()),
                ("build-context-build-id", build_id.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect();
            Err(SettingsError::invalid(format!(
                "for defining build context, need to define additional parameters: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Combine a release id and the default-release flag; both set is an error.
pub fn release_ref(id: Option<u64>, default_release: bool) -> SettingsResult<Option<ReleaseRef>> {
    match (id, default_release) {
        (Some(_), true) => Err(SettingsError::invalid(
            "default release cannot be assigned along with release ID assignment",
        )),
        (Some(id), false) => Ok(Some(ReleaseRef::Id(id))),
        (None, true) => Ok(Some(ReleaseRef::Default)),
        (None, false) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pushing() -> PublishSettings {
        PublishSettings::new("http://localhost:8080/", 1001, 1002).with_password("admin", "secret")
    }

    #[test]
    fn test_typed_value_splits_on_first_colon() {
        let tag = TypedValue::parse("OS:Linux").unwrap();
        assert_eq!(tag.kind, "OS");
        assert_eq!(tag.value, "Linux");

        let field = TypedValue::parse("Test_Level:Unit Test").unwrap();
        assert_eq!(field.kind, "Test_Level");
        assert_eq!(field.value, "Unit Test");
    }

    #[test]
    fn test_typed_value_rejects_bad_format() {
        for raw in ["OS", "OS:", ":Linux", "OS:Linux:Ubuntu", " OS:Linux", "OS::Linux"] {
            assert!(TypedValue::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_server_url_trimmed() {
        assert_eq!(pushing().server_url(), "http://localhost:8080");
    }

    #[test]
    fn test_validate_push_requires_server_coordinates() {
        assert!(pushing().validate(2).is_ok());

        let mut missing = pushing();
        missing.workspace = None;
        assert!(matches!(
            missing.validate(1),
            Err(SettingsError::Missing { name: "workspace" })
        ));

        let no_server = PublishSettings::default();
        assert!(matches!(
            no_server.validate(1),
            Err(SettingsError::Missing { name: "server" })
        ));
    }

    #[test]
    fn test_validate_write_only() {
        let settings = PublishSettings::write_only("out.xml");
        assert!(settings.validate(1).is_ok());
        assert!(settings.validate(2).is_err());
    }

    #[test]
    fn test_validate_internal_rejects_metadata() {
        let settings = pushing().with_internal(true).with_metadata(ResultMetadata {
            milestone: Some(3),
            ..ResultMetadata::default()
        });
        assert!(settings.validate(1).is_err());
        assert!(pushing().with_internal(true).validate(1).is_ok());
    }

    #[test]
    fn test_validate_proxy() {
        let mut proxy = ProxySettings::new("proxy.local", 3128);
        proxy.port = None;
        assert!(pushing().with_proxy(proxy).validate(1).is_err());

        let mut proxy = ProxySettings::new("proxy.local", 3128);
        proxy.password = Some(Secret::from("pw"));
        assert!(pushing().with_proxy(proxy).validate(1).is_err());

        let proxy = ProxySettings::new("proxy.local", 3128).with_credentials("u", "pw".into());
        assert!(pushing().with_proxy(proxy).validate(1).is_ok());
    }

    #[test]
    fn test_validate_timeout() {
        assert!(pushing().with_check_result(Some(0)).validate(1).is_err());
        let settings = pushing().with_check_result(None);
        assert!(settings.validate(1).is_ok());
        assert_eq!(settings.check_result_timeout(), DEFAULT_CHECK_RESULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_release_ref_exclusive() {
        assert!(release_ref(Some(1010), true).is_err());
        assert_eq!(release_ref(Some(1010), false).unwrap(), Some(ReleaseRef::Id(1010)));
        assert_eq!(release_ref(None, true).unwrap(), Some(ReleaseRef::Default));
        assert_eq!(release_ref(None, false).unwrap(), None);
    }

    #[test]
    fn test_build_context_all_or_nothing() {
        assert_eq!(build_context(None, None, None).unwrap(), None);
        assert!(build_context(Some("s".into()), Some("j".into()), Some("b".into()))
            .unwrap()
            .is_some());
        let err = build_context(Some("s".into()), None, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("build-context-job-id"));
        assert!(message.contains("build-context-build-id"));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let settings = pushing();
        assert!(!format!("{settings:?}").contains("secret"));
    }
}
