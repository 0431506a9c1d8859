use std::future::Future;
use std::pin::Pin;

use compare::{CompareError, Method, QueryRequest};
use streaming::FetchError;

/// Boxed future that is not required to be `Send`; browser fetches are
/// single-threaded.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<&'static str>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            accept: None,
            content_type: None,
        }
    }
}

impl From<QueryRequest> for HttpRequest {
    fn from(q: QueryRequest) -> Self {
        Self {
            method: q.method,
            url: q.url,
            body: q.body,
            accept: Some(q.accept),
            content_type: q.content_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
}

impl From<HttpError> for FetchError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => FetchError::Transport(msg),
            HttpError::Status(code) => FetchError::Status(code),
        }
    }
}

impl From<HttpError> for CompareError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => CompareError::Transport(msg),
            HttpError::Status(code) => CompareError::Status(code),
        }
    }
}

/// Minimal HTTP capability the driver needs.
///
/// Methods return boxed futures for dyn-compatibility.
pub trait HttpClient {
    fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, HttpError>>;

    /// Send and return the body of a 2xx response.
    fn fetch_text(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<String, HttpError>> {
        let response = self.send(request);
        Box::pin(async move {
            let response = response.await?;
            if !response.is_success() {
                return Err(HttpError::Status(response.status));
            }
            Ok(response.body)
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::ReqwestClient;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::time::Duration;

    use super::*;

    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new(timeout: Duration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, HttpError>> {
            Box::pin(async move {
                let mut builder = match request.method {
                    Method::Get => self.client.get(request.url.as_str()),
                    Method::Post => self.client.post(request.url.as_str()),
                };
                if let Some(accept) = &request.accept {
                    builder = builder.header(reqwest::header::ACCEPT, accept.as_str());
                }
                if let Some(content_type) = request.content_type {
                    builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
                }
                if let Some(body) = request.body {
                    builder = builder.body(body);
                }

                let resp = builder
                    .send()
                    .await
                    .map_err(|e| HttpError::Transport(e.to_string()))?;
                let status = resp.status().as_u16();
                let body = resp
                    .text()
                    .await
                    .map_err(|e| HttpError::Transport(e.to_string()))?;
                Ok(HttpResponse { status, body })
            })
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::GlooClient;

#[cfg(target_arch = "wasm32")]
mod web {
    use gloo_net::http::Request;

    use super::*;

    #[derive(Debug, Default, Clone, Copy)]
    pub struct GlooClient;

    impl HttpClient for GlooClient {
        fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, HttpError>> {
            Box::pin(async move {
                let mut builder = match request.method {
                    Method::Get => Request::get(&request.url),
                    Method::Post => Request::post(&request.url),
                };
                if let Some(accept) = &request.accept {
                    builder = builder.header("Accept", accept);
                }
                if let Some(content_type) = request.content_type {
                    builder = builder.header("Content-Type", content_type);
                }
                let req = match request.body {
                    Some(body) => builder.body(body),
                    None => builder.build(),
                }
                .map_err(|e| HttpError::Transport(e.to_string()))?;

                let resp = req
                    .send()
                    .await
                    .map_err(|e| HttpError::Transport(e.to_string()))?;
                let status = resp.status();
                let body = resp
                    .text()
                    .await
                    .map_err(|e| HttpError::Transport(e.to_string()))?;
                Ok(HttpResponse { status, body })
            })
        }
    }
}
