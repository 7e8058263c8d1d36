//! HTTP transports: `reqwest` for real backends, an in-memory one for tests.

use std::cell::RefCell;

use async_trait::async_trait;

use crate::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// URL without its query string.
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request. Non-success statuses are returned, not raised.
#[async_trait(?Send)]
pub trait Transport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, ApiError> {
        let builder = reqwest::Client::builder();
        // Browsers enforce their own fetch timeouts.
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(std::time::Duration::from_secs(timeout_secs));
        #[cfg(target_arch = "wasm32")]
        let _ = timeout_secs;

        let client = builder
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait(?Send)]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ApiError::Transport(format!("tiempo de espera agotado ({})", request.url))
            } else {
                ApiError::Transport(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

struct Route {
    method: Method,
    path: String,
    body_contains: Option<String>,
    response: HttpResponse,
}

/// Canned-response transport that records every request it receives.
///
/// Routes match on method and path (query ignored); the first matching
/// route wins. Unmatched requests answer 404.
#[derive(Default)]
pub struct MemoryTransport {
    routes: Vec<Route>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, path: &str, status: u16, body: &str) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            body_contains: None,
            response: HttpResponse::new(status, body),
        });
        self
    }

    /// Like [`MemoryTransport::route`], but only for request bodies containing `needle`.
    pub fn route_when(
        mut self,
        method: Method,
        path: &str,
        needle: &str,
        status: u16,
        body: &str,
    ) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            body_contains: Some(needle.to_string()),
            response: HttpResponse::new(status, body),
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    fn answer(&self, request: &HttpRequest) -> HttpResponse {
        self.routes
            .iter()
            .find(|route| {
                route.method == request.method
                    && route.path == request.path()
                    && route.body_contains.as_ref().map_or(true, |needle| {
                        request
                            .body
                            .as_deref()
                            .is_some_and(|body| body.contains(needle.as_str()))
                    })
            })
            .map(|route| route.response.clone())
            .unwrap_or_else(|| HttpResponse::new(404, r#"{"detail": "No encontrado."}"#))
    }
}

#[async_trait(?Send)]
impl Transport for MemoryTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self.answer(&request);
        self.requests.borrow_mut().push(request);
        Ok(response)
    }
}
