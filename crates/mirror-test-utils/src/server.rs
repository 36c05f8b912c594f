//! [`FixtureServer`]: an axum server for remote item tests.
//!
//! Serves `HEAD` and `GET` for registered routes, honors `If-None-Match`
//! against a route's `ETag` and counts requests per method and path. A
//! route can advertise more bytes than it sends, which ends the connection
//! mid-body.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures::stream;
use tokio::sync::oneshot;

/// How the server answers requests for one path.
#[derive(Debug, Clone)]
pub struct Route {
    pub body: Vec<u8>,
    pub etag: Option<String>,
    /// Raw `Expires` header value
    pub expires: Option<String>,
    pub status: u16,
    /// Advertised `Content-Length` when it differs from the body
    pub content_length: Option<u64>,
}

impl Route {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            etag: None,
            expires: None,
            status: 200,
            content_length: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_expires(mut self, expires: impl Into<String>) -> Self {
        self.expires = Some(expires.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Advertise `length` bytes. A length above the body size sends the
    /// body and then drops the connection.
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }
}

#[derive(Debug, Default)]
struct Routes {
    routes: HashMap<String, Route>,
    hits: HashMap<(String, String), usize>,
}

type Shared = Arc<Mutex<Routes>>;

fn lock(state: &Shared) -> MutexGuard<'_, Routes> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A background HTTP server bound to a random local port.
///
/// ```rust,no_run
/// use mirror_test_utils::{FixtureServer, Route};
///
/// let server = FixtureServer::start();
/// server.route("/logo.png", Route::new("png bytes").with_etag("\"v1\""));
/// let url = server.url("/logo.png");
/// ```
pub struct FixtureServer {
    addr: SocketAddr,
    state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FixtureServer {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Shared::default();
        let app = Router::new()
            .fallback(respond)
            .with_state(Arc::clone(&state));
        let (shutdown, signal) = oneshot::channel::<()>();

        thread::spawn(move || {
            runtime.block_on(async move {
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = signal.await;
                    })
                    .await;
            });
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Add or replace the route at `path`.
    pub fn route(&self, path: &str, route: Route) {
        lock(&self.state).routes.insert(path.to_string(), route);
    }

    /// Requests received for `method` and `path`.
    pub fn hits(&self, method: &str, path: &str) -> usize {
        lock(&self.state)
            .hits
            .get(&(method.to_string(), path.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Send `body`, pause so it reaches the client, then end the stream short
/// of the advertised length.
fn cut_short(body: Vec<u8>) -> Body {
    let chunks = stream::unfold(Some(body), |pending| async move {
        match pending {
            Some(chunk) => Some((Ok::<_, Infallible>(Bytes::from(chunk)), None)),
            None => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                None
            }
        }
    });
    Body::from_stream(chunks)
}

async fn respond(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    let route = {
        let mut state = lock(&state);
        *state
            .hits
            .entry((method.to_string(), path.clone()))
            .or_default() += 1;
        state.routes.get(&path).cloned()
    };
    let Some(route) = route else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::builder().status(status);
    if let Some(etag) = &route.etag {
        response = response.header(header::ETAG, etag);
    }
    if let Some(expires) = &route.expires {
        response = response.header(header::EXPIRES, expires);
    }

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());
    if status == StatusCode::OK && route.etag.is_some() && route.etag.as_deref() == if_none_match {
        return response
            .status(StatusCode::NOT_MODIFIED)
            .body(Body::empty())
            .unwrap_or_default();
    }

    let actual = route.body.len() as u64;
    let advertised = route.content_length.unwrap_or(actual);
    let body = if method == Method::HEAD {
        Body::empty()
    } else if advertised > actual {
        cut_short(route.body)
    } else {
        Body::from(route.body)
    };
    response
        .header(header::CONTENT_LENGTH, advertised)
        .body(body)
        .unwrap_or_default()
}
