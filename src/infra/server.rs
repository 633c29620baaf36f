//! HTTP/1 listener.
//!
//! Connections are served directly with hyper so the inbound request head
//! limit (`server.max_header_bytes`) can be applied.

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServerSettings;

use super::error::InfraError;

const TARGET: &str = "tagcache::server";

/// Accept connections until Ctrl-C. In-flight connections are left to finish
/// on their own tasks.
pub async fn serve(settings: &ServerSettings, router: Router) -> Result<(), InfraError> {
    let listener = TcpListener::bind(settings.addr).await?;
    info!(
        target: TARGET,
        addr = %settings.addr,
        max_header_bytes = settings.max_header_bytes.get(),
        "listening"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(target: TARGET, error = %err, "failed to accept connection");
                    continue;
                }
            },
            signal = &mut shutdown => {
                signal?;
                info!(target: TARGET, "shutdown signal received, no longer accepting");
                return Ok(());
            }
        };

        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(router.clone());
        let max_buf_size = settings.max_header_bytes.get();

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .max_buf_size(max_buf_size)
                .serve_connection(io, service)
                .await
            {
                debug!(target: TARGET, peer = %peer, error = %err, "connection closed with error");
            }
        });
    }
}
