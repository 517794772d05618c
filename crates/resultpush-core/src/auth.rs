//! Session authentication.
//!
//! Two schemes are supported, selected by the configured credentials:
//! - JSON sign-in: user and password posted to `authentication/sign_in`; the
//!   server answers with a `LWSSO_COOKIE_KEY` session cookie.
//! - Token exchange: an IDP access token is exchanged through the OAuth2
//!   token-exchange grant at `osp/a/au/auth/oauth2/token`; the returned
//!   `access_token` is then sent as a pseudo-cookie.
//!
//! Both produce a [`SessionToken`] that the HTTP layer attaches as a `Cookie`
//! header to every workspace request.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::settings::{Credentials, Secret};

/// Relative path of the JSON sign-in endpoint.
pub const SIGN_IN_PATH: &str = "authentication/sign_in";
/// Relative path of the sign-out endpoint.
pub const SIGN_OUT_PATH: &str = "authentication/sign_out";
/// Relative path of the OAuth2 token endpoint.
pub const TOKEN_EXCHANGE_PATH: &str = "osp/a/au/auth/oauth2/token";

/// Session cookie set by the JSON sign-in endpoint.
pub const SESSION_COOKIE_NAME: &str = "LWSSO_COOKIE_KEY";
/// Pseudo-cookie carrying the exchanged bearer token.
pub const ACCESS_TOKEN_COOKIE_NAME: &str = "access_token";

const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const TOKEN_EXCHANGE_SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Cookie identifying an authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    name: String,
    value: String,
}

impl SessionToken {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("name", &self.name)
            .field("value", &"***")
            .finish()
    }
}

/// Authentication scheme for a session.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// User/password JSON sign-in.
    JsonSignIn { user: String, password: Secret },

    /// OAuth2 token exchange with Basic client authentication.
    TokenExchange {
        user: String,
        password: Secret,
        access_token: Secret,
    },
}

impl AuthMethod {
    pub fn from_credentials(credentials: &Credentials) -> Self {
        match credentials {
            Credentials::Password { user, password } => Self::JsonSignIn {
                user: user.clone(),
                password: password.clone(),
            },
            Credentials::AccessToken {
                user,
                password,
                token,
            } => Self::TokenExchange {
                user: user.clone(),
                password: password.clone(),
                access_token: token.clone(),
            },
        }
    }

    /// Endpoint path relative to the server URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::JsonSignIn { .. } => SIGN_IN_PATH,
            Self::TokenExchange { .. } => TOKEN_EXCHANGE_PATH,
        }
    }

    /// Authenticate against `server_url` and return the session token.
    pub(crate) async fn authenticate(
        &self,
        client: &reqwest::Client,
        server_url: &str,
    ) -> ClientResult<SessionToken> {
        let url = format!("{}/{}", server_url, self.endpoint());
        debug!(url = %url, "authenticating");

        match self {
            Self::JsonSignIn { user, password } => sign_in(client, &url, user, password).await,
            Self::TokenExchange {
                user,
                password,
                access_token,
            } => exchange_token(client, &url, user, password, access_token).await,
        }
    }
}

async fn sign_in(
    client: &reqwest::Client,
    url: &str,
    user: &str,
    password: &Secret,
) -> ClientResult<SessionToken> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "user": user,
            "password": password.expose_str(),
        }))
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(refused(status));
    }

    let token = response
        .cookies()
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
        .map(|cookie| SessionToken::new(SESSION_COOKIE_NAME, cookie.value()));
    token.ok_or_else(|| ClientError::Authentication {
        status: Some(status.as_u16()),
        message: format!("sign-in response did not set the {SESSION_COOKIE_NAME} cookie"),
    })
}

async fn exchange_token(
    client: &reqwest::Client,
    url: &str,
    user: &str,
    password: &Secret,
    access_token: &Secret,
) -> ClientResult<SessionToken> {
    let response = client
        .post(url)
        .header(AUTHORIZATION, basic_authorization(user, password))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(token_exchange_body(access_token))
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(refused(status));
    }

    let body: serde_json::Value =
        response
            .json()
            .await
            .map_err(|e| ClientError::Authentication {
                status: Some(status.as_u16()),
                message: format!("failed to parse access token from response: {e}"),
            })?;

    let token = body
        .get(ACCESS_TOKEN_COOKIE_NAME)
        .and_then(serde_json::Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ClientError::Authentication {
            status: Some(status.as_u16()),
            message: "token exchange response did not contain an access_token".to_string(),
        })?;

    Ok(SessionToken::new(ACCESS_TOKEN_COOKIE_NAME, token))
}

fn refused(status: StatusCode) -> ClientError {
    ClientError::Authentication {
        status: Some(status.as_u16()),
        message: format!(
            "code={}; reason={}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown")
        ),
    }
}

/// `Basic` header value over the raw `user:password` bytes.
fn basic_authorization(user: &str, password: &Secret) -> String {
    let mut raw = Vec::with_capacity(user.len() + 1 + password.expose().len());
    raw.extend_from_slice(user.as_bytes());
    raw.push(b':');
    raw.extend_from_slice(password.expose());
    format!("Basic {}", BASE64.encode(raw))
}

/// Form body of the token-exchange grant. The subject token is appended as is.
fn token_exchange_body(access_token: &Secret) -> Vec<u8> {
    let mut body = format!(
        "grant_type={}&subject_token_type={}&subject_token=",
        urlencoding::encode(TOKEN_EXCHANGE_GRANT_TYPE),
        urlencoding::encode(TOKEN_EXCHANGE_SUBJECT_TOKEN_TYPE),
    )
    .into_bytes();
    body.extend_from_slice(access_token.expose());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_authorization() {
        let header = basic_authorization("admin", &Secret::from("secret"));
        assert_eq!(header, "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn test_token_exchange_body() {
        let body = token_exchange_body(&Secret::from("abc.def"));
        let body = String::from_utf8(body).unwrap();
        assert_eq!(
            body,
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Atoken-exchange\
             &subject_token_type=urn%3Aietf%3Aparams%3Aoauth%3Atoken-type%3Aaccess_token\
             &subject_token=abc.def"
        );
    }

    #[test]
    fn test_method_from_credentials() {
        let password = AuthMethod::from_credentials(&Credentials::Password {
            user: "u".into(),
            password: "p".into(),
        });
        assert_eq!(password.endpoint(), SIGN_IN_PATH);

        let token = AuthMethod::from_credentials(&Credentials::AccessToken {
            user: "client".into(),
            password: "p".into(),
            token: "t".into(),
        });
        assert_eq!(token.endpoint(), TOKEN_EXCHANGE_PATH);
    }

    #[test]
    fn test_session_token_debug_hides_value() {
        let token = SessionToken::new(SESSION_COOKIE_NAME, "very-secret");
        assert_eq!(token.cookie_header(), "LWSSO_COOKIE_KEY=very-secret");
        assert!(!format!("{token:?}").contains("very-secret"));
    }
}
