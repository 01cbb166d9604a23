use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use info_core::DocumentHandler;
use info_store::open_store;
use tokio::task::JoinHandle;

use crate::config::{ServiceConfig, TlsConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Information Service host.
pub struct InfoServer {
    config: ServiceConfig,
    handler: Arc<DocumentHandler>,
}

impl InfoServer {
    /// Open the configured persistence plugin and wrap it in a handler.
    pub fn new(config: ServiceConfig) -> ServerResult<Self> {
        config.validate()?;
        let store = open_store(&config.persistence)?;
        Ok(Self::with_handler(config, Arc::new(DocumentHandler::new(store))))
    }

    pub fn with_handler(config: ServiceConfig, handler: Arc<DocumentHandler>) -> Self {
        Self { config, handler }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<DocumentHandler> {
        &self.handler
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::new(AppState::new(self.handler.clone())), &self.config)
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn serve(self) -> ServerResult<()> {
        let handle = Handle::new();
        tokio::spawn(shutdown_signal(handle.clone()));
        self.serve_with_handle(handle).await
    }

    /// Serve until `handle` is told to shut down.
    pub async fn serve_with_handle(self, handle: Handle) -> ServerResult<()> {
        let app = self.router();
        let addr = self.config.bind_addr;
        let rustls = match &self.config.tls {
            Some(tls) => Some(load_tls(tls).await?),
            None => None,
        };
        let sweeper = self.spawn_sweeper();

        let result = match rustls {
            Some(rustls) => {
                tracing::info!(%addr, "information service listening (https)");
                axum_server::bind_rustls(addr, rustls)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
            }
            None => {
                tracing::warn!(%addr, "no [tls] section configured, serving plain HTTP");
                axum_server::bind(addr)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
            }
        };

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("information service stopped");
        result.map_err(ServerError::from)
    }

    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let ttl = Duration::from_secs(self.config.pairing.ttl_secs?);
        let period = Duration::from_secs(self.config.pairing.sweep_interval_secs.max(1));
        let handler = self.handler.clone();
        tracing::info!(ttl_secs = ttl.as_secs(), "pairing sweeper enabled");
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let handler = handler.clone();
                match tokio::task::spawn_blocking(move || handler.sweep_pairings(ttl)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(op = "sweep_pairings", error = %e, "pairing sweep failed"),
                    Err(e) => tracing::error!(op = "sweep_pairings", error = %e, "sweeper worker failed"),
                }
            }
        }))
    }
}

/// Build the multi-threaded runtime with the configured worker pool size.
/// Document handler calls run on the blocking pool, which gets the same bound.
pub fn build_runtime(config: &ServiceConfig) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .max_blocking_threads(config.worker_threads)
        .thread_name("infoservice-worker")
        .enable_all()
        .build()
}

/// Leaf certificate followed by the optional chain, as one PEM bundle.
pub fn certificate_chain_pem(mut cert: Vec<u8>, chain: Option<Vec<u8>>) -> Vec<u8> {
    if let Some(chain) = chain {
        if !cert.is_empty() && !cert.ends_with(b"\n") {
            cert.push(b'\n');
        }
        cert.extend_from_slice(&chain);
    }
    cert
}

async fn read_pem(path: &Path) -> ServerResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::Tls(format!("{}: {e}", path.display())))
}

async fn load_tls(tls: &TlsConfig) -> ServerResult<RustlsConfig> {
    let cert = read_pem(&tls.cert_path).await?;
    let chain = match &tls.chain_path {
        Some(path) => Some(read_pem(path).await?),
        None => None,
    };
    let key = read_pem(&tls.key_path).await?;
    RustlsConfig::from_pem(certificate_chain_pem(cert, chain), key)
        .await
        .map_err(|e| ServerError::Tls(e.to_string()))
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
