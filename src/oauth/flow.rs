// ABOUTME: AuthFlow — drives discover → prepare → listen → authorize → callback → exchange → persist.
// ABOUTME: Per-server in-flight guard, mandatory callback timeout, tokens stored via the SecretStore.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::vault::{SecretStore, StoreError};

use super::AuthError;
use super::discovery::{self, AuthServerMetadata};
use super::listener::RedirectListener;
use super::pkce::{self, CHALLENGE_METHOD};

/// Expiry slack so a token isn't handed out moments before it lapses.
const EXPIRY_SKEW_SECONDS: i64 = 30;

/// Truncation cap for token-endpoint error bodies carried in errors.
const ERROR_BODY_CAP: usize = 512;

/// The token endpoint's response to a successful exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// What gets persisted in the secret store under the server's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Absolute expiry computed from the response's `expires_in`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub obtained_at: DateTime<Utc>,
}

impl StoredToken {
    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| now + chrono::Duration::seconds(secs as i64));
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            scope: response.scope,
            expires_at,
            obtained_at: now,
        }
    }

    /// Whether the token has lapsed (with skew). Tokens without an expiry
    /// are treated as live until the server rejects them.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + chrono::Duration::seconds(EXPIRY_SKEW_SECONDS) >= at,
            None => false,
        }
    }
}

/// Hand-off of the authorization URL to the user's browser.
///
/// External collaborator concern: the flow only constructs the URL and owns
/// the listener. The binary wires in an implementation that prints or opens
/// the URL; tests drive the redirect themselves.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), AuthError>;
}

/// Drives OAuth 2.1 + PKCE attempts and persists the resulting tokens.
pub struct AuthFlow {
    http: reqwest::Client,
    store: Arc<SecretStore>,
    client_id: String,
    callback_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl AuthFlow {
    pub fn new(store: Arc<SecretStore>, client_id: String, callback_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            client_id,
            callback_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// The persisted token for a server, if present and unexpired.
    pub async fn stored_token(&self, server_name: &str) -> Result<Option<StoredToken>, StoreError> {
        let Some(value) = self.store.get(server_name).await? else {
            return Ok(None);
        };
        let Ok(token) = serde_json::from_value::<StoredToken>(value) else {
            // A foreign value under this name is not a usable token.
            return Ok(None);
        };
        if token.is_expired(Utc::now()) {
            debug!(server = server_name, "stored token is expired");
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Run one full authorization attempt for a server.
    ///
    /// Fails fast if an attempt for the same server is already in flight.
    /// The redirect listener is torn down on every exit path, including
    /// timeout; nothing is persisted unless the exchange succeeds.
    pub async fn authorize(
        &self,
        server_name: &str,
        resource_url: &str,
        scopes: &[String],
        opener: &dyn UrlOpener,
    ) -> Result<StoredToken, AuthError> {
        let _attempt = InFlightGuard::acquire(&self.in_flight, server_name)?;

        let metadata = discovery::discover(&self.http, resource_url).await?;
        debug!(
            server = server_name,
            authorization_endpoint = %metadata.authorization_endpoint,
            "discovered authorization server"
        );

        // Ephemeral session state, destroyed with this stack frame.
        let pkce = pkce::generate_pkce();
        let state = pkce::generate_state();

        let listener = RedirectListener::bind().await?;
        let redirect_uri = listener.redirect_uri();

        let authorization_url =
            build_authorization_url(&metadata, &self.client_id, &redirect_uri, &pkce.challenge, &state, scopes)?;
        opener.open(&authorization_url)?;

        let params = tokio::time::timeout(self.callback_timeout, listener.accept_callback())
            .await
            .map_err(|_| AuthError::Timeout)??;

        // CSRF defense: the state comparison happens before the code is
        // looked at, and a mismatch is fatal to the attempt.
        if params.state != state {
            return Err(AuthError::StateMismatch);
        }

        let response = self
            .exchange(&metadata.token_endpoint, &params.code, &pkce.verifier, &redirect_uri)
            .await?;

        let token = StoredToken::from_response(response, Utc::now());
        let value = serde_json::to_value(&token)
            .map_err(|e| AuthError::Store(StoreError::Serialize(e)))?;
        self.store.save(server_name, value).await.map_err(AuthError::Store)?;
        info!(server = server_name, "authorization succeeded; token persisted");

        drop(listener);
        Ok(token)
    }

    async fn exchange(
        &self,
        token_endpoint: &str,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", verifier),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_CAP);
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Construct the authorization URL for the browser hand-off.
fn build_authorization_url(
    metadata: &AuthServerMetadata,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
    scopes: &[String],
) -> Result<String, AuthError> {
    let mut url = Url::parse(&metadata.authorization_endpoint)
        .map_err(|_| AuthError::InvalidUrl(metadata.authorization_endpoint.clone()))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", CHALLENGE_METHOD)
        .append_pair("state", state);
    if !scopes.is_empty() {
        url.query_pairs_mut().append_pair("scope", &scopes.join(" "));
    }
    Ok(url.into())
}

/// Removes the server from the in-flight set when the attempt ends,
/// whichever way it ends.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    server: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, server: &str) -> Result<Self, AuthError> {
        let mut in_flight = set.lock().expect("in-flight lock poisoned");
        if !in_flight.insert(server.to_string()) {
            return Err(AuthError::AttemptInProgress(server.to_string()));
        }
        Ok(Self {
            set,
            server: server.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.server);
    }
}
