//! Thin reqwest wrapper shared by both backend clients: base URL handling,
//! credentials, and mapping transport failures onto [`GatewayError`].

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use salesdesk_core::GatewayError;
use salesdesk_shared::Masked;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// How a service expects its credential.
#[derive(Debug, Clone)]
pub enum Credential {
    None,
    Bearer(Masked<String>),
    Header(&'static str, Masked<String>),
}

#[derive(Debug, Clone)]
pub struct HttpService {
    client: Client,
    base_url: String,
    service: &'static str,
    credential: Credential,
}

/// Strip surrounding whitespace and trailing slashes; default to https
/// unless the host is local.
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }
    while url.ends_with('/') {
        url.pop();
    }
    url
}

impl HttpService {
    pub fn new(
        service: &'static str,
        base_url: &str,
        timeout: Duration,
        credential: Credential,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable {
                service: service.to_string(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            service,
            credential,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, GatewayError> {
        let request = self.request(Method::GET, path).query(query);
        self.execute(request, path).await
    }

    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<String, GatewayError> {
        let request = self.request(method, path).json(body);
        self.execute(request, path).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.url(path))
            .header("Accept", "application/json");
        match &self.credential {
            Credential::Bearer(token) if !token.is_empty() => request.bearer_auth(token.expose()),
            Credential::Header(name, value) if !value.is_empty() => {
                request.header(*name, value.expose())
            }
            _ => request,
        }
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<String, GatewayError> {
        tracing::debug!(service = self.service, path, "Outgoing request");
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            tracing::warn!(service = self.service, path, status = status.as_u16(), "Request rejected");
            return Err(GatewayError::Status {
                service: self.service.to_string(),
                status: status.as_u16(),
                message: error_detail(status, &body),
            });
        }
        Ok(body)
    }

    fn transport_error(&self, err: &reqwest::Error) -> GatewayError {
        let service = self.service.to_string();
        if err.is_timeout() {
            return GatewayError::Timeout { service };
        }
        let message = if err.is_connect() {
            format!("cannot connect to {}", self.base_url)
        } else if err.is_builder() {
            format!("invalid URL {}", self.base_url)
        } else if err.is_decode() || err.is_body() {
            return GatewayError::decode(self.service, err.to_string());
        } else {
            err.to_string()
        };
        GatewayError::Unreachable { service, message }
    }
}

/// Prefer the server's own `error`/`message` text over the bare status line.
fn error_detail(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("error")
            .or_else(|| json.get("message"))
            .or_else(|| json.pointer("/data/message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() && body.len() <= 200 => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    }
}
