use crate::vardash_logic::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub fn router(app_state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/updates", get(ws_handler))
        .route("/health", get(health_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(cors)
        .with_state(app_state)
}

pub async fn run(
    port: u16,
    static_dir: &Path,
    app_state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(app_state, static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Dashboard server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("Dashboard server shutting down.");
        })
        .await?;

    Ok(())
}

async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Html(state.page.to_string())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.hub.register();
    let client_id = subscription.id;
    log::info!("Viewer {} connected", client_id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = subscription.frames.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                            break; // viewer went away
                        }
                    }
                    // Evicted by the hub, or the hub stopped
                    None => {
                        log::debug!("Viewer {} queue closed by hub", client_id);
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Viewers only listen; anything else is ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unregister(client_id);
    log::info!("Viewer {} disconnected", client_id);
}
