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

//! Web server of the Traceback Explorer
//!
//! The server receives traceback and dataframe uploads, stores them as dumps,
//! and turns a stored traceback into a browsable session on request:
//!
//! | route | |
//! |---|---|
//! | `POST /tb/{id}` | store a traceback blob |
//! | `GET /tb/{id}` | open the traceback in a new session, redirect to it |
//! | `POST /df/{id}`, `GET /df/{id}` | store and fetch dataframe bytes |
//! | `GET /session/{id}` | render a session |
//! | `GET /last_session` | render the most recent session |
//! | `GET /frame/{id}` | variables of a frame as JSON |
//! | `GET /clear-sessions` | drop every session |
//! | `GET /` | list dumps and sessions |

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use axum::Router;
use eyre::Result;
use tbx_engine::SessionRegistry;
use tokio::net::TcpListener;
use tracing::info;

mod error;
pub use error::ApiError;

pub mod render;
mod routes;
pub mod storage;

use routes::AppState;
use storage::DumpStore;

/// Configuration for the Web UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebUiConfig {
    /// Directory holding uploaded dumps
    pub storage_dir: PathBuf,
    /// Address to listen on
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./store"),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
        }
    }
}

impl WebUiConfig {
    /// Socket address to listen on
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Builder for [`WebUi`] with a fluent API
#[derive(Debug, Clone, Default)]
pub struct WebUiBuilder {
    config: WebUiConfig,
}

impl WebUiBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage directory
    pub fn storage_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    /// Set the listening address
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    /// Set the listening port (0 picks a free one)
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Open the storage and build the server
    pub async fn build(self) -> Result<WebUi> {
        WebUi::new(self.config).await
    }
}

/// Main Web UI server
///
/// ```no_run
/// # async fn example() -> eyre::Result<()> {
/// let webui = tbx_webui::WebUiBuilder::new().storage_dir("./store").port(5000).build().await?;
/// webui.serve().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WebUi {
    config: WebUiConfig,
    store: Arc<DumpStore>,
    sessions: Arc<SessionRegistry>,
}

impl WebUi {
    /// Create a server, creating the storage directory when missing
    pub async fn new(config: WebUiConfig) -> Result<Self> {
        let store = Arc::new(DumpStore::open(&config.storage_dir).await?);
        Ok(Self { config, store, sessions: Arc::new(SessionRegistry::new()) })
    }

    /// Server configuration
    pub fn config(&self) -> &WebUiConfig {
        &self.config
    }

    /// Dump storage
    pub fn store(&self) -> &Arc<DumpStore> {
        &self.store
    }

    /// Session registry
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Build the router for the web application
    pub fn router(&self) -> Router {
        routes::router(AppState {
            store: Arc::clone(&self.store),
            sessions: Arc::clone(&self.sessions),
        })
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until Ctrl-C
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        info!("Traceback Explorer listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received, stopping server");
            })
            .await?;

        self.sessions.clear();
        Ok(())
    }
}
