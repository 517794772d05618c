//! HTTP layer: session state, the single 401 retry, status mapping.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::auth::{AuthMethod, SessionToken, SIGN_OUT_PATH};
use crate::error::{ClientError, ClientResult};

use super::helpers::{body_snippet, description_suffix, parse_push_id, parse_status_document};
use super::PushStatus;

/// Authentication state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    LoggedOut,
    LoggedIn(SessionToken),
}

/// HTTP backend (holds reqwest client, auth scheme and session state).
#[derive(Debug)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) server_url: String,
    pub(crate) auth: AuthMethod,
    pub(crate) state: SessionState,
}

impl HttpBackend {
    /// Authenticate, replacing any previous session.
    pub(crate) async fn login(&mut self) -> ClientResult<SessionToken> {
        let token = self.auth.authenticate(&self.client, &self.server_url).await?;
        debug!(cookie = token.name(), "logged in");
        self.state = SessionState::LoggedIn(token.clone());
        Ok(token)
    }

    /// Sign out; a no-op when no session is open. 200 and 302 both count as success.
    pub(crate) async fn logout(&mut self) -> ClientResult<()> {
        let SessionState::LoggedIn(token) = &self.state else {
            return Ok(());
        };

        let url = format!("{}/{}", self.server_url, SIGN_OUT_PATH);
        debug!(url = %url, "logging out");
        let response = self
            .client
            .post(&url)
            .header(COOKIE, token.cookie_header())
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::FOUND => {
                self.state = SessionState::LoggedOut;
                Ok(())
            }
            status => Err(ClientError::Logout {
                status: status.as_u16(),
            }),
        }
    }

    /// Send a request with the session cookie, logging in first if needed.
    ///
    /// A 401 triggers exactly one re-login and one retry; a second 401 is
    /// returned as [`ClientError::Unauthorized`].
    pub(crate) async fn execute(
        &mut self,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<reqwest::Response> {
        let token = match &self.state {
            SessionState::LoggedIn(token) => token.clone(),
            SessionState::LoggedOut => self.login().await?,
        };

        let first = request.try_clone().ok_or_else(|| ClientError::Config {
            message: "request body cannot be replayed".to_string(),
        })?;
        let response = first.header(COOKIE, token.cookie_header()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("session rejected (401), logging in again");
        let token = self.login().await?;
        let response = request.header(COOKIE, token.cookie_header()).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("request rejected again after re-authentication");
            return Err(ClientError::Unauthorized {
                message: "request was refused after re-authentication".to_string(),
            });
        }
        Ok(response)
    }

    /// POST an ingestion document; 202 yields the result id.
    ///
    /// In internal mode a 400 means the server's schema validation refused
    /// the document, which is reported as [`ClientError::Validation`].
    pub(crate) async fn push(
        &mut self,
        url: &str,
        payload: Vec<u8>,
        internal: bool,
    ) -> ClientResult<u64> {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/xml")
            .body(payload);
        let response = self.execute(request).await?;

        let status = response.status();
        let body = response.text().await?;
        let json: serde_json::Value = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(_) => {
                return Err(ClientError::InvalidResponse {
                    status: status.as_u16(),
                    body: body_snippet(&body),
                })
            }
        };

        match status {
            StatusCode::ACCEPTED => parse_push_id(&json).ok_or_else(|| {
                ClientError::InvalidResponse {
                    status: status.as_u16(),
                    body: body_snippet(&body),
                }
            }),
            StatusCode::BAD_REQUEST if internal => Err(ClientError::Validation {
                description: description_suffix(&json),
            }),
            _ => Err(ClientError::Push {
                status: status.as_u16(),
                description: description_suffix(&json),
            }),
        }
    }

    /// GET a status document; anything but 200 is a retrieval failure.
    pub(crate) async fn status(&mut self, url: &str) -> ClientResult<PushStatus> {
        let request = self.client.get(url);
        let response = self.execute(request).await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::StatusRetrieval {
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let body = response.text().await?;
        parse_status_document(&body).map_err(|message| ClientError::StatusRetrieval { message })
    }
}
