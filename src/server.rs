use std::net::SocketAddr;

use anyhow::{Context, Result};
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, ALLOW, CONTENT_TYPE};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::cache::ConfigCache;
use crate::logging;
use crate::view::ConfigView;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Bind to `addr` and serve the cache until shutdown is signalled
pub async fn start_server(
    addr: SocketAddr,
    cache: ConfigCache,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Starting web server on http://{}", listener.local_addr()?);
    serve(listener, cache, shutdown).await
}

/// Accept connections on `listener` until shutdown is signalled.
///
/// Connections already accepted are left to finish on their own tasks.
pub async fn serve(
    listener: TcpListener,
    cache: ConfigCache,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Web server stopping");
                    return Ok(());
                }
                continue;
            }
        };

        debug!("Accepted connection from {}", peer);

        let cache = cache.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Body>| {
                let cache = cache.clone();
                async move { handle_request(req, &cache).await }
            });

            if let Err(e) = Http::new().serve_connection(stream, service).await {
                debug!("Connection from {} closed with error: {}", peer, e);
            }
        });
    }
}

/// Quality value of a media range's parameters. A missing or malformed `q` counts as 1.
fn quality<'a>(mut params: impl Iterator<Item = &'a str>) -> f32 {
    params
        .find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("q") {
                value.trim().parse::<f32>().ok()
            } else {
                None
            }
        })
        .unwrap_or(1.0)
}

/// Whether the Accept header lists JSON with a non-zero quality
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media_range| {
            let mut parts = media_range.split(';');
            let media_type = parts.next().unwrap_or_default().trim();
            media_type.eq_ignore_ascii_case(JSON_MEDIA_TYPE) && quality(parts) > 0.0
        })
}

/// Handle an HTTP request
#[instrument(skip(req, cache), fields(method = %req.method(), path = %req.uri().path()))]
async fn handle_request(req: Request<Body>, cache: &ConfigCache) -> Result<Response<Body>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path != "/" {
        logging::log_request(method.as_str(), &path, 404, "text");
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not Found"))
            .context("Failed to build response");
    }

    if method != Method::GET && method != Method::HEAD {
        logging::log_request(method.as_str(), &path, 405, "text");
        return Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(ALLOW, HeaderValue::from_static("GET, HEAD"))
            .body(Body::from("Method Not Allowed"))
            .context("Failed to build response");
    }

    // One read per request; the snapshot stays valid even if the cache is updated meanwhile
    let snapshot = cache.read();

    // Render the chosen representation
    let (content_type, format, body) = if wants_json(req.headers()) {
        let body = serde_json::to_vec(&*snapshot).context("Failed to encode snapshot")?;
        (JSON_MEDIA_TYPE, "json", body)
    } else {
        let html = ConfigView::from_snapshot(&snapshot).render_html();
        ("text/html; charset=utf-8", "html", html.into_bytes())
    };

    // HEAD gets the same headers without the payload
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(body)
    };

    logging::log_request(method.as_str(), &path, 200, format);
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static(content_type))
        .body(body)
        .context("Failed to build response")
}
