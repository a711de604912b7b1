// ABOUTME: Ephemeral local redirect listener — one OS-assigned port, one valid callback.
// ABOUTME: Scoped resource: dropping the listener closes the socket on every exit path.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use super::AuthError;

/// Fixed path the authorization server redirects back to.
pub const CALLBACK_PATH: &str = "/callback";

/// Cap on the bytes read from one callback request.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Query parameters delivered by the one redirect callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// A single-use local HTTP listener for the browser redirect.
///
/// Bound to an OS-assigned loopback port. Unrelated requests (wrong path,
/// wrong method, missing parameters) receive an error response and never
/// complete the wait; callers bound the wait with a timeout and drop the
/// listener to guarantee the port closes.
pub struct RedirectListener {
    listener: TcpListener,
    port: u16,
}

impl RedirectListener {
    /// Bind to an ephemeral loopback port.
    pub async fn bind() -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        debug!(port, "redirect listener bound");
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI to register in the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CALLBACK_PATH)
    }

    /// Wait for the one valid callback.
    ///
    /// Loops over connections until a request hits the callback path with
    /// the required parameters; an `error` parameter from the authorization
    /// server terminates the wait as a denial.
    pub async fn accept_callback(&self) -> Result<CallbackParams, AuthError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "redirect listener accepted a connection");
            match handle_connection(stream).await {
                Ok(Some(params)) => return Ok(params),
                Ok(None) => continue,
                Err(denial @ AuthError::AuthorizationDenied { .. }) => return Err(denial),
                // Connection-level trouble from a stray client; keep waiting.
                Err(e) => {
                    debug!(error = %e, "ignoring broken callback connection");
                    continue;
                }
            }
        }
    }
}

/// Read one request and decide whether it is the callback.
///
/// Returns `Ok(None)` for anything that should not complete the wait.
async fn handle_connection(mut stream: TcpStream) -> Result<Option<CallbackParams>, AuthError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf);
    let Some(request_line) = request.lines().next() else {
        return Ok(None);
    };

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    if method != "GET" || path != CALLBACK_PATH {
        respond(&mut stream, "404 Not Found", "Not found.").await?;
        return Ok(None);
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        respond(
            &mut stream,
            "200 OK",
            "Authorization failed. You may close this window.",
        )
        .await?;
        return Err(AuthError::AuthorizationDenied {
            error,
            description: error_description,
        });
    }

    let (Some(code), Some(state)) = (code, state) else {
        respond(&mut stream, "400 Bad Request", "Missing code or state.").await?;
        return Ok(None);
    };

    // The state check happens in the flow after this response is sent, so
    // the body must not claim the authorization succeeded.
    respond(
        &mut stream,
        "200 OK",
        "Response received. You may close this window.",
    )
    .await?;
    Ok(Some(CallbackParams { code, state }))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
