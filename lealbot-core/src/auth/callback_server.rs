// lealbot-core/src/auth/callback_server.rs
//
// Loopback HTTP listener for the OAuth consent flow. Captures the
// `?code=...&state=...` redirect once and hands it to the waiting authorize
// flow through a oneshot channel.

use std::{net::SocketAddr, sync::Arc};
use tokio::sync::{oneshot, Mutex};
use axum::{
    Router,
    routing::get,
    extract::{Query, State},
    response::Html,
    http::StatusCode,
};
use axum_server::{Server, Handle};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use serde::Deserialize;
use tracing::{error, info};

use crate::Error;

/// What the redirect delivered. `state` must be checked against the nonce
/// the authorize flow generated before the code is exchanged.
#[derive(Debug, Clone)]
pub struct CallbackResult {
    pub code: String,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    done_tx: Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>,
}

/// Binds `127.0.0.1:port` and serves `/callback` until the returned shutdown
/// sender fires. The first successful redirect resolves the receiver; later
/// hits get a friendly page and are otherwise ignored.
pub async fn start_callback_server(
    port: u16,
) -> Result<(oneshot::Receiver<CallbackResult>, oneshot::Sender<()>), Error> {
    let (done_tx, done_rx) = oneshot::channel::<CallbackResult>();
    let state = CallbackState {
        done_tx: Arc::new(Mutex::new(Some(done_tx))),
    };

    let app = Router::new()
        .route("/callback", get(handle_callback))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("OAuth callback listener on http://{}/callback", addr);

    let handle = Handle::new();
    let handle_clone = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown_recv.await;
        handle_clone.graceful_shutdown(None);
    });

    let server = Server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service());
    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Callback listener error: {}", e);
        }
        info!("Callback listener shut down.");
    });

    Ok((done_rx, shutdown_send))
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<AuthQuery>,
) -> (StatusCode, Html<String>) {
    if let Some(err) = query.error.as_ref() {
        let desc = query.error_description.clone().unwrap_or_default();
        let msg = format!("<h2>Authorization failed</h2><p>{}</p><p>{}</p>", err, desc);
        return (StatusCode::OK, Html(msg));
    }

    if let Some(code) = query.code.clone() {
        if let Some(tx) = state.done_tx.lock().await.take() {
            let _ = tx.send(CallbackResult {
                code,
                state: query.state.clone(),
            });
        }
        let msg = "<h2>Authorization complete</h2>\
                   <p>The bot received its code. You can close this tab.</p>";
        return (StatusCode::OK, Html(msg.to_string()));
    }

    let msg = "<h2>Missing 'code' query param</h2><p>Try the authorize flow again.</p>";
    (StatusCode::OK, Html(msg.to_string()))
}

/// Pre-flight check so the authorize flow can fail with a clear message
/// instead of a bind error after the browser is already open.
pub async fn test_port_available(port: u16) -> Result<(), Error> {
    use tokio::net::TcpListener;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => Err(Error::Auth(format!("Port {} not available: {}", port, e))),
    }
}
