//! [`HttpClient`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use wsbridge_core::HttpMethod;

use crate::types::{HttpClient, HttpError, HttpRequest, HttpResponse};

/// Construction options for [`ReqwestHttpClient`].
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("wsbridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP client backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with the given timeout and user agent.
    pub fn new(config: &HttpClientConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self { client })
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Post => reqwest::Method::POST,
    }
}

fn classify(url: &str, err: &reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout {
            url: url.to_owned(),
        }
    } else {
        HttpError::Request {
            url: url.to_owned(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(to_reqwest(method), &url);
        for (name, value) in headers.pairs() {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| classify(&url, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await.map_err(|e| HttpError::Body {
            url: url.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(status, "http call completed");
        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }
}
