// ABOUTME: OAuth 2.1 + PKCE authorization against a discovered authorization server.
// ABOUTME: Discovery, PKCE material, the ephemeral redirect listener, and the flow driver.

pub mod discovery;
pub mod flow;
pub mod listener;
pub mod pkce;

pub use discovery::AuthServerMetadata;
pub use flow::{AuthFlow, StoredToken, TokenResponse, UrlOpener};
pub use listener::{CALLBACK_PATH, CallbackParams, RedirectListener};
pub use pkce::{PkcePair, generate_pkce, generate_state};

use crate::vault::StoreError;

/// Errors from the authorization flow. Each kind is distinct so callers can
/// tell whether to retry, re-authenticate, or investigate tampering.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization server descriptor could be resolved for the resource.
    #[error("authorization server discovery failed for {0}")]
    Discovery(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The callback's state token did not match the one generated for this
    /// attempt. Treated as a forgery; always fatal, never retried.
    #[error("callback state mismatch: possible cross-site request forgery")]
    StateMismatch,
    /// The authorization server redirected back with an error parameter.
    #[error("authorization server returned '{error}': {}", .description.as_deref().unwrap_or("no description"))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },
    /// The token endpoint rejected the exchange. Nothing was persisted.
    #[error("token exchange rejected with status {status}: {body}")]
    Exchange { status: u16, body: String },
    /// No callback arrived before the deadline. The listener was stopped.
    #[error("timed out waiting for the authorization callback")]
    Timeout,
    #[error("redirect listener error: {0}")]
    Listener(#[from] std::io::Error),
    /// Another authorization attempt for the same server is in flight.
    #[error("an authorization attempt for '{0}' is already in progress")]
    AttemptInProgress(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to hand off authorization url: {0}")]
    Browser(String),
}
