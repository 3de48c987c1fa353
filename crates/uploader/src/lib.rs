// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! TBX Uploader - push captured tracebacks and dataframes to a TBX server
//!
//! Tracebacks are sent as blobs to `POST {host}/tb/{id}`, dataframes as raw
//! bytes to `POST {host}/df/{id}`. Ids are normalized first (see
//! [`normalize_id`]) and the host falls back to the `TB_EXPLORER_HOST` or
//! `DF_EXPLORER_HOST` environment variables.

use std::env;

use reqwest::Client;
use serde::Deserialize;
use tbx_common::{pretty_size, TracebackSnapshot};
use tbx_engine::{encode_blob, BlobError};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable holding the default traceback server
pub const TB_HOST_ENV: &str = "TB_EXPLORER_HOST";

/// Environment variable holding the default dataframe server
pub const DF_HOST_ENV: &str = "DF_EXPLORER_HOST";

/// Errors raised while uploading
#[derive(Debug, Error)]
pub enum UploadError {
    /// Neither an explicit host nor the environment variable was given
    #[error("missing host: pass one explicitly or set {0}")]
    MissingHost(&'static str),
    /// The traceback could not be encoded
    #[error(transparent)]
    Encode(#[from] BlobError),
    /// The request could not be completed
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered but did not accept the upload
    #[error("server rejected upload ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error reported by the server
        message: String,
    },
}

/// Kind of an uploaded item, which selects the route on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// A traceback blob
    Traceback,
    /// Dataframe bytes
    Dataframe,
}

impl UploadKind {
    fn route(self) -> &'static str {
        match self {
            Self::Traceback => "tb",
            Self::Dataframe => "df",
        }
    }

    fn host_env(self) -> &'static str {
        match self {
            Self::Traceback => TB_HOST_ENV,
            Self::Dataframe => DF_HOST_ENV,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Normalize an id for use in a URL: `/` and spaces become `-`, letters are
/// lowercased.
pub fn normalize_id(id: &str) -> String {
    id.replace(['/', ' '], "-").to_lowercase()
}

/// Client for one TBX server
#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    host: String,
}

impl Uploader {
    /// Create an uploader for `host`, e.g. `http://127.0.0.1:5000`
    pub fn new(host: impl Into<String>) -> Self {
        let mut host = host.into();
        if !host.ends_with('/') {
            host.push('/');
        }
        Self { client: Client::new(), host }
    }

    /// Create an uploader for `host`, or the host configured for `kind` in
    /// the environment
    pub fn resolve(host: Option<&str>, kind: UploadKind) -> Result<Self, UploadError> {
        let var = kind.host_env();
        match host {
            Some(host) => Ok(Self::new(host)),
            None => env::var(var).map(Self::new).map_err(|_| UploadError::MissingHost(var)),
        }
    }

    /// Base URL of the server, always ending with `/`
    pub fn host(&self) -> &str {
        &self.host
    }

    /// URL under which an item is stored
    pub fn url_for(&self, kind: UploadKind, id: &str) -> String {
        format!("{}{}/{}", self.host, kind.route(), normalize_id(id))
    }

    /// Upload a traceback snapshot
    ///
    /// # Returns
    /// The URL at which the traceback can be viewed
    pub async fn upload_traceback(
        &self,
        snapshot: &TracebackSnapshot,
        id: &str,
    ) -> Result<String, UploadError> {
        info!("Dumping traceback...");
        let blob = encode_blob(snapshot)?;
        self.upload(UploadKind::Traceback, id, blob).await
    }

    /// Upload dataframe bytes as they are
    ///
    /// # Returns
    /// The URL at which the dataframe can be fetched
    pub async fn upload_dataframe(&self, bytes: Vec<u8>, id: &str) -> Result<String, UploadError> {
        self.upload(UploadKind::Dataframe, id, bytes).await
    }

    async fn upload(&self, kind: UploadKind, id: &str, body: Vec<u8>) -> Result<String, UploadError> {
        let url = self.url_for(kind, id);
        info!("Sending {} to {url}", pretty_size(body.len() as u64));

        let response = self.client.post(&url).body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("Upload response ({status}): {text}");

        let message = match serde_json::from_str::<UploadResponse>(&text) {
            Ok(reply) if reply.success && status.is_success() => {
                info!("Done! Accessible at {url}");
                return Ok(url);
            }
            Ok(reply) => reply.error.unwrap_or_else(|| "unknown error".to_string()),
            Err(_) => text,
        };
        Err(UploadError::Rejected { status: status.as_u16(), message })
    }
}

/// Upload a traceback to `host`, or to `TB_EXPLORER_HOST` when `host` is
/// `None`
pub async fn upload_tb(
    snapshot: &TracebackSnapshot,
    id: &str,
    host: Option<&str>,
) -> Result<String, UploadError> {
    Uploader::resolve(host, UploadKind::Traceback)?.upload_traceback(snapshot, id).await
}

/// Upload dataframe bytes to `host`, or to `DF_EXPLORER_HOST` when `host` is
/// `None`
pub async fn upload_df(bytes: Vec<u8>, id: &str, host: Option<&str>) -> Result<String, UploadError> {
    Uploader::resolve(host, UploadKind::Dataframe)?.upload_dataframe(bytes, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("Nightly Run/Step 3"), "nightly-run-step-3");
        assert_eq!(normalize_id("already-fine"), "already-fine");
    }

    #[test]
    fn test_url_for() {
        let uploader = Uploader::new("http://localhost:5000");
        assert_eq!(uploader.host(), "http://localhost:5000/");
        assert_eq!(
            uploader.url_for(UploadKind::Traceback, "My Crash"),
            "http://localhost:5000/tb/my-crash"
        );
        assert_eq!(uploader.url_for(UploadKind::Dataframe, "a/b"), "http://localhost:5000/df/a-b");
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_explicit_host() {
        env::set_var(TB_HOST_ENV, "http://from-env");
        let uploader = Uploader::resolve(Some("http://explicit/"), UploadKind::Traceback).unwrap();
        assert_eq!(uploader.host(), "http://explicit/");

        let uploader = Uploader::resolve(None, UploadKind::Traceback).unwrap();
        assert_eq!(uploader.host(), "http://from-env/");
        env::remove_var(TB_HOST_ENV);
    }

    #[test]
    #[serial]
    fn test_resolve_without_host_fails() {
        env::remove_var(DF_HOST_ENV);
        let err = Uploader::resolve(None, UploadKind::Dataframe).unwrap_err();
        assert!(matches!(err, UploadError::MissingHost(DF_HOST_ENV)));
    }
}
