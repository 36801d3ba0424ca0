//! HTTP server running rate limiting layers built from configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Uri;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::headers::HeaderNames;
use super::key::key_func_for;
use super::layer::RateLimitLayer;
use crate::config::{RateLimitingConfig, SlidegateConfig};
use crate::error::{Result, SlidegateError};
use crate::ratelimit::RateLimiter;

/// HTTP server fronted by the configured limiter layers.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Routes with the limiter layers applied
    router: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self { addr, router }
    }

    /// Build the server from configuration, validating every layer.
    pub fn from_config(config: &SlidegateConfig) -> Result<Self> {
        let layers = build_layers(&config.rate_limiting)?;
        Ok(Self::new(config.server.http_addr, apply_layers(routes(), layers)))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Start the server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// In-flight requests complete after `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            SlidegateError::Io(e)
        })?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            SlidegateError::Io(e)
        })
    }
}

/// Build one layer per configured limiter, outermost first.
pub fn build_layers(config: &RateLimitingConfig) -> Result<Vec<RateLimitLayer>> {
    let headers = HeaderNames::try_from(&config.headers)?;

    config
        .layers
        .iter()
        .map(|layer_config| -> Result<RateLimitLayer> {
            let mut builder = RateLimiter::builder(
                layer_config.requests_limit,
                Duration::from_secs(layer_config.window_secs),
            );
            if let Some(ms) = config.backend_timeout_ms {
                builder = builder.backend_timeout(Duration::from_millis(ms));
            }
            let limiter = builder.build()?;

            let mut layer = RateLimitLayer::from_shared(Arc::new(limiter))
                .key_fn(key_func_for(&layer_config.keys)?)
                .override_rules(layer_config.rules.clone())
                .response_headers(headers.clone());
            if let Some(prefix) = &layer_config.path_prefix {
                layer = layer.path_prefix(prefix.clone());
            }
            if config.fail_open {
                layer = layer.fail_open();
            }

            info!(
                name = %layer_config.name,
                requests_limit = layer_config.requests_limit,
                window_secs = layer_config.window_secs,
                path_prefix = ?layer_config.path_prefix,
                "Rate limit layer configured"
            );
            Ok(layer)
        })
        .collect()
}

/// Wrap `router` so the first layer sees requests first.
pub fn apply_layers(router: Router, layers: Vec<RateLimitLayer>) -> Router {
    layers
        .into_iter()
        .rev()
        .fold(router, |router, layer| router.layer(layer))
}

fn routes() -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .fallback(echo_path)
}

async fn echo_path(uri: Uri) -> String {
    format!("{}\n", uri.path())
}
