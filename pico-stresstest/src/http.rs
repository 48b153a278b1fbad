//! Contains a remote implementation using HTTP to interact with the container API.

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;

const USER_AGENT: &str = concat!("pico-stresstest/", env!("CARGO_PKG_VERSION"));

/// The result of a single call against the remote.
///
/// Every call issued by [`HttpRemote`] yields one of these. Transport errors never escape the
/// remote; they are turned into [`Outcome::Transport`] instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The remote responded with the given status code.
    Status(StatusCode),
    /// The request did not produce a response, for example due to a refused connection or a
    /// timeout. Contains a description of the error.
    Transport(String),
}

impl Outcome {
    /// Returns `true` if the remote responded with a `2xx` status code.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Status(status) if status.is_success())
    }

    /// Returns the status code, if the remote responded at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::Transport(reason) => write!(f, "FAILED ({reason})"),
        }
    }
}

/// Request body of the container creation endpoint.
#[derive(Debug, Serialize)]
struct CreateContainer<'a> {
    name: &'a str,
    image: &'a str,
}

/// A remote implementation using HTTP to interact with the container orchestration API.
///
/// The remote holds no state beyond the base URL and the connection pool of its client. None of
/// its calls are retried.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Creates a remote talking to the API at the given base URL, such as `http://host:8080/api`.
    ///
    /// If `timeout` is given, every request is bounded by it. Otherwise, the defaults of the
    /// underlying transport apply.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    /// Creates a remote for an API listening on `address` in `HOST:PORT` form.
    pub fn for_address(address: &str, timeout: Option<Duration>) -> reqwest::Result<Self> {
        Self::new(format!("http://{address}/api"), timeout)
    }

    /// The base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a container named `name` running `image`.
    pub async fn create(&self, name: &str, image: &str) -> Outcome {
        let url = format!("{}/containers", self.base_url);
        let body = CreateContainer { name, image };
        send(self.client.post(url).json(&body)).await
    }

    /// Deletes the container named `name`.
    pub async fn delete(&self, name: &str) -> Outcome {
        let url = format!("{}/containers/{name}", self.base_url);
        send(self.client.delete(url)).await
    }

    /// Restarts the container named `name`.
    pub async fn restart(&self, name: &str) -> Outcome {
        let url = format!("{}/{name}/restart", self.base_url);
        send(self.client.put(url)).await
    }

    /// Stops the container named `name`.
    pub async fn stop(&self, name: &str) -> Outcome {
        let url = format!("{}/{name}/stop", self.base_url);
        send(self.client.put(url)).await
    }

    /// Starts the previously stopped container named `name`.
    pub async fn start(&self, name: &str) -> Outcome {
        let url = format!("{}/{name}/start", self.base_url);
        send(self.client.put(url)).await
    }

    /// Fetches the logs of the container named `name`.
    ///
    /// Only the status code is of interest, the response body is discarded.
    pub async fn fetch_logs(&self, name: &str) -> Outcome {
        let url = format!("{}/{name}/logs", self.base_url);
        send(self.client.get(url)).await
    }
}

async fn send(request: RequestBuilder) -> Outcome {
    match request.send().await {
        Ok(response) => Outcome::Status(response.status()),
        Err(err) => {
            tracing::debug!(error = &err as &dyn std::error::Error, "request failed");
            Outcome::Transport(describe(&err))
        }
    }
}

/// Flattens the error and its sources into a single line.
fn describe(err: &reqwest::Error) -> String {
    let mut description = if err.is_timeout() {
        "request timed out".to_owned()
    } else {
        err.to_string()
    };

    let mut source = err.source();
    while let Some(inner) = source {
        description.push_str(": ");
        description.push_str(&inner.to_string());
        source = inner.source();
    }

    description
}
