// MCP over Server-Sent Events: one event stream per session, messages posted alongside

use super::{ApiError, ApiResult};
use crate::config::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use waypost_mcp::McpServer;

/// Where clients post messages for a session
pub const MESSAGES_PATH: &str = "/messages/";

struct Session {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

/// Open SSE sessions keyed by id
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (outbound, inbound) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Session {
                outbound,
                cancel: CancellationToken::new(),
            },
        );
        (id, inbound)
    }

    fn get(&self, id: &Uuid) -> Option<(mpsc::UnboundedSender<String>, CancellationToken)> {
        self.lock()
            .get(id)
            .map(|s| (s.outbound.clone(), s.cancel.clone()))
    }

    fn close(&self, id: &Uuid) {
        if let Some(session) = self.lock().remove(id) {
            session.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closes the session when the event stream is dropped
struct SessionGuard {
    id: Uuid,
    sessions: SessionStore,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        tracing::info!("SSE session {} closed", self.id);
        self.sessions.close(&self.id);
    }
}

/// `GET /sse`: open a session and stream its responses
pub async fn open_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, mut inbound) = state.sessions.open();
    tracing::info!("SSE session {} opened", id);

    let guard = SessionGuard {
        id,
        sessions: state.sessions.clone(),
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        let endpoint = format!("{}?session_id={}", MESSAGES_PATH, id.simple());
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = inbound.recv().await {
            yield Ok(Event::default().event("message").data(message));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub session_id: Uuid,
}

/// `POST /messages/?session_id=...`: accept one JSON-RPC message.
///
/// The message is handled on its own task; its response (if any) is sent
/// on the session's event stream.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> ApiResult<StatusCode> {
    let (outbound, cancel) = state
        .sessions
        .get(&query.session_id)
        .ok_or_else(|| ApiError::not_found("Could not find session"))?;

    spawn_invocation(state.mcp.clone(), body, outbound, cancel, query.session_id);

    Ok(StatusCode::ACCEPTED)
}

/// Handle one message on its own task, abandoning it if the session closes
fn spawn_invocation(
    mcp: Arc<McpServer>,
    body: String,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    session_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Session {} closed, dropping in-flight request", session_id);
            }
            response = mcp.handle_invocation(&body) => {
                if let Some(response) = response {
                    if outbound.send(response).is_err() {
                        tracing::debug!("Session {} closed before response was sent", session_id);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::config::ServerConfig;
    use axum::body::{Body, BodyDataStream};
    use axum::http::Request;
    use axum::Router;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc::error::TryRecvError, oneshot};
    use tower::ServiceExt;
    use waypost_mcp::Profile;

    fn app(profile: Profile) -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(&ServerConfig::default(), profile).unwrap());
        (state.clone(), create_router(state))
    }

    /// Splits a response body into `(event, data)` pairs
    struct EventReader {
        body: BodyDataStream,
        buf: String,
    }

    impl EventReader {
        async fn open(router: &Router) -> Self {
            let response = router
                .clone()
                .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            Self {
                body: response.into_body().into_data_stream(),
                buf: String::new(),
            }
        }

        async fn next_event(&mut self) -> (String, String) {
            loop {
                if let Some(end) = self.buf.find("\n\n") {
                    let raw: String = self.buf.drain(..end + 2).collect();
                    let mut event = String::new();
                    let mut data = String::new();
                    for line in raw.lines() {
                        if let Some(value) = line.strip_prefix("event:") {
                            event = value.trim_start().to_string();
                        } else if let Some(value) = line.strip_prefix("data:") {
                            data.push_str(value.trim_start());
                        }
                    }
                    if event.is_empty() && data.is_empty() {
                        continue;
                    }
                    return (event, data);
                }
                let chunk = self.body.next().await.unwrap().unwrap();
                self.buf.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
    }

    async fn post(router: &Router, endpoint: &str, message: Value) -> StatusCode {
        router
            .clone()
            .oneshot(
                Request::post(endpoint)
                    .header("content-type", "application/json")
                    .body(Body::from(message.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (state, router) = app(Profile::Demo);
        let mut events = EventReader::open(&router).await;

        let (event, endpoint) = events.next_event().await;
        assert_eq!(event, "endpoint");
        assert!(endpoint.starts_with("/messages/?session_id="));
        assert_eq!(state.sessions.len(), 1);

        let status = post(
            &router,
            &endpoint,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "calculate", "arguments": {"expression": "2 + 3 * 4"}}}),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (event, data) = events.next_event().await;
        assert_eq!(event, "message");
        let response: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["content"][0]["text"], "14");
    }

    #[tokio::test]
    async fn test_notification_gets_no_event() {
        let (_state, router) = app(Profile::Echo);
        let mut events = EventReader::open(&router).await;
        let (_, endpoint) = events.next_event().await;

        let status = post(
            &router,
            &endpoint,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let status = post(&router, &endpoint, json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        // The first event after the notification is the ping response
        let (_, data) = events.next_event().await;
        let response: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(response["id"], "p");
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (_state, router) = app(Profile::Echo);
        let endpoint = format!("{}?session_id={}", MESSAGES_PATH, Uuid::new_v4().simple());

        let status = post(&router, &endpoint, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disconnect_closes_session() {
        let (state, router) = app(Profile::Echo);
        let mut events = EventReader::open(&router).await;
        let (_, endpoint) = events.next_event().await;

        let id: Uuid = endpoint
            .rsplit('=')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap();
        let (_, cancel) = state.sessions.get(&id).unwrap();
        assert!(!cancel.is_cancelled());

        drop(events);
        assert!(state.sessions.is_empty());
        assert!(cancel.is_cancelled());

        let status = post(&router, &endpoint, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Host that accepts one connection, never answers, and reports when the
    /// client closes it
    async fn spawn_silent_server() -> (String, oneshot::Receiver<()>, oneshot::Receiver<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = accepted_tx.send(());
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        });

        (format!("http://{}/", addr), accepted_rx, closed_rx)
    }

    fn fetch_message(url: &str) -> Value {
        json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call",
               "params": {"name": "fetch_webpage", "arguments": {"url": url}}})
    }

    #[tokio::test]
    async fn test_cancelled_invocation_sends_nothing() {
        let (state, _router) = app(Profile::Demo);
        let (url, accepted, _closed) = spawn_silent_server().await;

        let (outbound, mut inbound) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = spawn_invocation(
            state.mcp.clone(),
            fetch_message(&url).to_string(),
            outbound,
            cancel.clone(),
            Uuid::new_v4(),
        );

        accepted.await.unwrap();
        cancel.cancel();

        // The fetch timeout is 10s; cancellation must end the task well before it
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("task should stop once cancelled")
            .unwrap();
        assert_eq!(inbound.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_disconnect_abandons_in_flight_fetch() {
        let (state, router) = app(Profile::Demo);
        let (url, accepted, closed) = spawn_silent_server().await;

        let mut events = EventReader::open(&router).await;
        let (_, endpoint) = events.next_event().await;

        let status = post(&router, &endpoint, fetch_message(&url)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        accepted.await.unwrap();

        drop(events);
        assert!(state.sessions.is_empty());

        // Dropping the fetch closes its connection long before the fetch timeout
        tokio::time::timeout(Duration::from_secs(5), closed)
            .await
            .expect("fetch connection should be closed")
            .unwrap();
    }
}
