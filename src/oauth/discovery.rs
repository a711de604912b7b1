// ABOUTME: Authorization server discovery via well-known metadata documents.
// ABOUTME: Protected-resource descriptor first, then the origin's own authorization-server descriptor.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::AuthError;

/// Well-known path for the protected-resource descriptor.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
/// Well-known path for authorization server metadata.
pub const AUTH_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// Minimal authorization server metadata schema.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthServerMetadata {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

/// Protected-resource descriptor: points at the authorization servers that
/// protect the resource.
#[derive(Debug, Deserialize)]
struct ProtectedResourceMetadata {
    #[serde(default)]
    authorization_servers: Vec<String>,
}

/// Resolve the authorization server endpoints for a resource URL.
///
/// Strategies, in order: (a) the resource origin's protected-resource
/// descriptor, recursing into the authorization server it names; (b) an
/// authorization-server descriptor directly at the resource origin. Any
/// fetch or parse failure falls through to the next strategy; total
/// failure is a discovery error.
pub async fn discover(
    http: &reqwest::Client,
    resource_url: &str,
) -> Result<AuthServerMetadata, AuthError> {
    let origin = origin_of(resource_url)?;

    if let Some(meta) = via_protected_resource(http, &origin).await {
        return Ok(meta);
    }
    if let Some(meta) = fetch_auth_server_metadata(http, &origin).await {
        return Ok(meta);
    }

    Err(AuthError::Discovery(origin))
}

async fn via_protected_resource(http: &reqwest::Client, origin: &str) -> Option<AuthServerMetadata> {
    let url = format!("{origin}{PROTECTED_RESOURCE_PATH}");
    let resource: ProtectedResourceMetadata = fetch_json(http, &url).await?;

    for server in &resource.authorization_servers {
        let server_origin = match origin_of(server) {
            Ok(o) => o,
            Err(_) => {
                debug!(server, "protected-resource descriptor names an invalid server url");
                continue;
            }
        };
        if let Some(meta) = fetch_auth_server_metadata(http, &server_origin).await {
            return Some(meta);
        }
    }
    None
}

async fn fetch_auth_server_metadata(
    http: &reqwest::Client,
    origin: &str,
) -> Option<AuthServerMetadata> {
    let url = format!("{origin}{AUTH_SERVER_METADATA_PATH}");
    let meta: AuthServerMetadata = fetch_json(http, &url).await?;

    // Schema-valid means the endpoints are real URLs, not just present.
    if Url::parse(&meta.authorization_endpoint).is_err() || Url::parse(&meta.token_endpoint).is_err()
    {
        debug!(url, "authorization server metadata has invalid endpoint urls");
        return None;
    }
    Some(meta)
}

async fn fetch_json<T: serde::de::DeserializeOwned>(http: &reqwest::Client, url: &str) -> Option<T> {
    let response = match http.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(url, error = %e, "well-known fetch failed");
            return None;
        }
    };
    if !response.status().is_success() {
        debug!(url, status = %response.status(), "well-known fetch not successful");
        return None;
    }
    match response.json().await {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(url, error = %e, "well-known document failed to parse");
            None
        }
    }
}

/// The origin (scheme://host[:port]) of a URL, with no trailing slash.
pub(super) fn origin_of(raw: &str) -> Result<String, AuthError> {
    let url = Url::parse(raw).map_err(|_| AuthError::InvalidUrl(raw.to_string()))?;
    if !url.has_host() {
        return Err(AuthError::InvalidUrl(raw.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}
