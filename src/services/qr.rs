//! Signup links and QR code images.
//!
//! Images are rendered by an external QR service; this module only builds
//! the request URLs, the customer stamp payload, and downloads images to disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::backend::http::send_bytes;

pub const QR_SERVICE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";
pub const RESTAURANT_QR_SIZE: &str = "400x400";
pub const CUSTOMER_QR_SIZE: &str = "300x300";

/// Payload type marker the staff scanner accepts.
pub const STAMP_PAYLOAD_TYPE: &str = "stamp";

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("invalid QR service URL: {0}")]
    Url(String),
    #[error("QR code download failed: {0}")]
    Download(#[from] BackendError),
    #[error("could not save QR code: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoded in the customer's QR code; scanned by staff to grant stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampQrPayload {
    pub customer_id: Uuid,
    pub customer_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl StampQrPayload {
    #[must_use]
    pub fn new(customer_id: Uuid, customer_name: &str) -> Self {
        Self { customer_id, customer_name: customer_name.to_string(), kind: STAMP_PAYLOAD_TYPE.to_string() }
    }

    /// JSON text encoded into the QR code.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Customer signup link that preselects the restaurant.
#[must_use]
pub fn restaurant_signup_url(public_url: &str, slug: &str) -> String {
    format!("{}/?restaurant={slug}", public_url.trim_end_matches('/'))
}

/// QR service URL rendering `data` at `size` (e.g. `400x400`).
///
/// # Errors
///
/// Returns an error if the service URL constant cannot be parsed.
pub fn qr_image_url(data: &str, size: &str) -> Result<String, QrError> {
    reqwest::Url::parse_with_params(QR_SERVICE_URL, &[("size", size), ("data", data)])
        .map(String::from)
        .map_err(|e| QrError::Url(e.to_string()))
}

/// QR image for a restaurant's customer signup link.
///
/// # Errors
///
/// Returns an error if the service URL cannot be built.
pub fn restaurant_qr_url(public_url: &str, slug: &str) -> Result<String, QrError> {
    qr_image_url(&restaurant_signup_url(public_url, slug), RESTAURANT_QR_SIZE)
}

/// QR image carrying a customer's stamp payload.
///
/// # Errors
///
/// Returns an error if the service URL cannot be built.
pub fn customer_qr_url(customer_id: Uuid, customer_name: &str) -> Result<String, QrError> {
    qr_image_url(&StampQrPayload::new(customer_id, customer_name).to_json(), CUSTOMER_QR_SIZE)
}

/// Download file name, suffixed `-QR-Code.png`. Letters, digits, `.` and
/// `_` are kept; every other run of characters becomes one `-`, so the
/// result is always a single path component.
#[must_use]
pub fn qr_file_name(restaurant_name: &str) -> String {
    let mut name = String::with_capacity(restaurant_name.len() + 12);
    let mut in_gap = false;
    for ch in restaurant_name.chars() {
        if ch.is_alphanumeric() || ch == '.' || ch == '_' {
            name.push(ch);
            in_gap = false;
        } else {
            if !in_gap {
                name.push('-');
            }
            in_gap = true;
        }
    }
    if !in_gap {
        name.push('-');
    }
    name.push_str("QR-Code.png");
    name
}

/// Fetch the restaurant's QR image and write it into `dir`.
///
/// # Errors
///
/// Returns an error if the download fails or the file cannot be written.
pub async fn download_restaurant_qr(
    http: &reqwest::Client,
    image_url: &str,
    restaurant_name: &str,
    dir: &Path,
) -> Result<PathBuf, QrError> {
    let bytes = send_bytes(http.get(image_url)).await?;
    let path = dir.join(qr_file_name(restaurant_name));
    tokio::fs::write(&path, &bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "QR code saved");
    Ok(path)
}

#[cfg(test)]
#[path = "qr_test.rs"]
mod tests;
