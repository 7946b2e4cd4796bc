//! Request signing for the transaction relayer

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{EngineError, Result};
use crate::config::types::ApiCredentials;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_API_KEY: &str = "RELAYER-API-KEY";
pub const HEADER_SIGNATURE: &str = "RELAYER-SIGNATURE";
pub const HEADER_TIMESTAMP: &str = "RELAYER-TIMESTAMP";
pub const HEADER_PASSPHRASE: &str = "RELAYER-PASSPHRASE";

/// HMAC-SHA256 over `timestamp + METHOD + path + body`, base64 encoded
///
/// `secret` is base64 encoded. `request_path` includes the query string.
pub fn sign_request(
    secret: &str,
    timestamp: i64,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String> {
    let secret_bytes = BASE64
        .decode(secret)
        .map_err(|e| EngineError::Authentication(format!("Failed to decode secret: {}", e)))?;

    let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), request_path, body);

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| EngineError::Authentication(format!("Failed to create HMAC: {}", e)))?;
    mac.update(message.as_bytes());

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Signed headers for one relayer request
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub api_key: String,
    pub signature: String,
    pub timestamp: i64,
    pub passphrase: String,
}

impl AuthHeaders {
    /// Sign a request at the current time
    pub fn sign(
        credentials: &ApiCredentials,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<Self> {
        Self::sign_at(credentials, chrono::Utc::now().timestamp(), method, request_path, body)
    }

    pub fn sign_at(
        credentials: &ApiCredentials,
        timestamp: i64,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<Self> {
        let signature =
            sign_request(&credentials.api_secret, timestamp, method, request_path, body)?;
        Ok(Self {
            api_key: credentials.api_key.clone(),
            signature,
            timestamp,
            passphrase: credentials.passphrase.clone(),
        })
    }

    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_SIGNATURE, &self.signature)
            .header(HEADER_TIMESTAMP, self.timestamp.to_string())
            .header(HEADER_PASSPHRASE, &self.passphrase)
    }
}
