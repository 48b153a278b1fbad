//! Exposes an in-process fake of the container orchestration API for use in integration tests.
//!
//! ```
//! use pico_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let address = server.address();
//!    // point the remote at the address and run tests...
//! }
//! ```

use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing};
use serde::Deserialize;

/// The endpoint a [`Call`] was made to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Endpoint {
    /// `POST /api/containers`
    Create,
    /// `DELETE /api/containers/{name}`
    Delete,
    /// `PUT /api/{name}/restart`
    Restart,
    /// `PUT /api/{name}/stop`
    Stop,
    /// `PUT /api/{name}/start`
    Start,
    /// `GET /api/{name}/logs`
    Logs,
}

/// A request received by the [`TestServer`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Call {
    /// The endpoint that was called.
    pub endpoint: Endpoint,
    /// The container name from the path or request body.
    pub name: String,
    /// The image from the request body, for [`Endpoint::Create`] only.
    pub image: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<Call>>,
    containers: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

type ServerState = Arc<Inner>;

impl Inner {
    /// Records the call and decides on a response.
    ///
    /// Failing containers are answered with `500`. Deleting an unknown container yields `404`,
    /// like the real API does.
    async fn handle(&self, endpoint: Endpoint, name: String, image: Option<String>) -> StatusCode {
        tracing::debug!(?endpoint, %name, "received call");
        self.calls.lock().unwrap().push(Call {
            endpoint,
            name: name.clone(),
            image,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&name) {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        let mut containers = self.containers.lock().unwrap();
        match endpoint {
            Endpoint::Create => {
                containers.insert(name);
                StatusCode::OK
            }
            Endpoint::Delete if !containers.remove(&name) => StatusCode::NOT_FOUND,
            _ => StatusCode::OK,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    name: String,
    image: String,
}

async fn create(State(state): State<ServerState>, Json(body): Json<CreateBody>) -> StatusCode {
    state
        .handle(Endpoint::Create, body.name, Some(body.image))
        .await
}

async fn delete(State(state): State<ServerState>, Path(name): Path<String>) -> StatusCode {
    state.handle(Endpoint::Delete, name, None).await
}

async fn restart(State(state): State<ServerState>, Path(name): Path<String>) -> StatusCode {
    state.handle(Endpoint::Restart, name, None).await
}

async fn stop(State(state): State<ServerState>, Path(name): Path<String>) -> StatusCode {
    state.handle(Endpoint::Stop, name, None).await
}

async fn start(State(state): State<ServerState>, Path(name): Path<String>) -> StatusCode {
    state.handle(Endpoint::Start, name, None).await
}

async fn logs(State(state): State<ServerState>, Path(name): Path<String>) -> StatusCode {
    state.handle(Endpoint::Logs, name, None).await
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/containers", routing::post(create))
        .route("/api/containers/{name}", routing::delete(delete))
        .route("/api/{name}/restart", routing::put(restart))
        .route("/api/{name}/stop", routing::put(stop))
        .route("/api/{name}/start", routing::put(start))
        .route("/api/{name}/logs", routing::get(logs))
        .with_state(state)
}

/// An in-process fake of the container API for use in integration tests.
///
/// The server records every call it receives and answers with `200` unless told otherwise. It
/// listens on a random available port on localhost.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: ServerState,
}

impl TestServer {
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = ServerState::default();
        let app = router(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns the address of the server in `HOST:PORT` form.
    pub fn address(&self) -> String {
        self.socket.to_string()
    }

    /// Answers every future call concerning `name` with `500`.
    pub fn fail_for(&self, name: &str) {
        self.state.failing.lock().unwrap().insert(name.to_owned());
    }

    /// Delays every future response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    /// Returns all calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Returns the container names of all calls made to `endpoint`, in arrival order.
    pub fn names(&self, endpoint: Endpoint) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint == endpoint)
            .map(|call| call.name)
            .collect()
    }

    /// Returns the names of containers that were created and not deleted.
    pub fn containers(&self) -> HashSet<String> {
        self.state.containers.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Returns an address on localhost that refuses connections.
pub fn refusing_address() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    address.to_string()
}
