//! WebDAV destination
//!
//! Plain HTTP `PUT`/`GET` with basic authentication. Credentials are read from
//! the secret store on every call so an updated password is used by the very
//! next operation. Each request is bounded by the configured timeout.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::TransportError;
use crate::secrets::{SecretStore, WebDavCredential};

use super::{check_object_name, Transport};

/// Backups stored on a WebDAV server
pub struct WebDavTransport {
    client: Client,
    secrets: Arc<dyn SecretStore>,
}

impl WebDavTransport {
    pub fn new(secrets: Arc<dyn SecretStore>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::fatal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, secrets })
    }

    fn credential(&self) -> Result<WebDavCredential, TransportError> {
        WebDavCredential::load(self.secrets.as_ref())
            .map_err(|e| TransportError::fatal(e.to_string()))?
            .ok_or_else(|| TransportError::fatal("WebDAV credentials not configured"))
    }

    fn url_for(credential: &WebDavCredential, name: &str) -> Result<String, TransportError> {
        check_object_name(name)?;
        Ok(format!(
            "{}/{}",
            credential.base_url.trim_end_matches('/'),
            name
        ))
    }
}

fn send_error(method: &str, url: &str, err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::fatal(format!("{} {}: invalid request: {}", method, url, err))
    } else if err.is_timeout() {
        TransportError::retryable(format!("{} {}: timed out", method, url))
    } else {
        TransportError::retryable(format!("{} {}: {}", method, url, err))
    }
}

/// Map a non-success HTTP status to a transport error
pub fn classify_status(method: &str, url: &str, status: StatusCode) -> TransportError {
    let message = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("{} {}: authentication rejected", method, url)
        }
        _ => format!("{} {}: server returned {}", method, url, status),
    };
    TransportError::fatal(message).with_status(status.as_u16())
}

impl Transport for WebDavTransport {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let credential = self.credential()?;
        let url = Self::url_for(&credential, name)?;

        let response = self
            .client
            .put(&url)
            .basic_auth(&credential.username, Some(credential.password.as_str()))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .map_err(|e| send_error("PUT", &url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status("PUT", &url, status));
        }

        debug!(url = %url, bytes = bytes.len(), status = status.as_u16(), "uploaded backup");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let credential = self.credential()?;
        let url = Self::url_for(&credential, name)?;

        let response = self
            .client
            .get(&url)
            .basic_auth(&credential.username, Some(credential.password.as_str()))
            .send()
            .map_err(|e| send_error("GET", &url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status("GET", &url, status));
        }

        let body = response
            .bytes()
            .map_err(|e| send_error("GET", &url, e))?;

        debug!(url = %url, bytes = body.len(), "downloaded backup");
        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        match self.credential() {
            Ok(credential) => credential.base_url,
            Err(_) => "webdav (not configured)".to_string(),
        }
    }
}
