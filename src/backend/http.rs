//! Shared HTTP plumbing for the remote backend clients.

use std::time::Duration;

use crate::config::HttpTimeouts;

use super::types::BackendError;

/// Build the HTTP client shared by the auth and data clients.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn http_client(timeouts: HttpTimeouts) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.request_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .build()
        .map_err(|e| BackendError::HttpClientBuild(e.to_string()))
}

/// Send a request and return the body of a 2xx response.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<String, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;
    read_body(response).await
}

pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, BackendError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(BackendError::Status { status, message: parse_error_message(&text) });
    }
    Ok(text)
}

/// Send a request and return the raw bytes of a 2xx response.
pub(crate) async fn send_bytes(request: reqwest::RequestBuilder) -> Result<Vec<u8>, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;
    if !response.status().is_success() {
        return read_body(response).await.map(String::into_bytes);
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| BackendError::Request(e.to_string()))
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Pull the human-readable message out of an auth or REST error body.
pub(crate) fn parse_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.msg.or(b.error_description).or(b.message).or(b.error))
        .unwrap_or_else(|| body.trim().to_string())
}


#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
