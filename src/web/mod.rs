use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use tracing::info;

use crate::config::MetricsConfig;
use crate::db::DatabaseManager;

pub mod handlers;
pub mod metrics;

use self::handlers::{health::health_check, metrics::metrics as metrics_handler};
use self::metrics::SyncMetrics;

#[derive(Clone)]
pub struct WebState {
    pub db_manager: DatabaseManager,
    pub metrics: Arc<SyncMetrics>,
    pub started_at: Instant,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("metrics").get(metrics_handler))
}

#[derive(Clone)]
pub struct WebServer {
    bind_addr: String,
}

impl WebServer {
    pub fn new(
        config: &MetricsConfig,
        db_manager: DatabaseManager,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let _ = WEB_STATE.set(WebState {
            db_manager,
            metrics,
            started_at: Instant::now(),
        });

        Self {
            bind_addr: format!("{}:{}", config.bind_address, config.port),
        }
    }

    pub async fn start(&self) -> Result<()> {
        info!("starting metrics server on {}", self.bind_addr);

        let acceptor = TcpListener::new(self.bind_addr.clone()).bind().await;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}
