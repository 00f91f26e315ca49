use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

use crate::config;
use crate::ipam::Ipam;
use crate::web;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Bind Error: {0}")]
    BindError(#[source] warp::Error),
}

pub struct Server {
    config: config::Config,
    ipam: Arc<Ipam>,
    logger: slog::Logger,
}

impl Server {
    pub fn create(config: &config::Config, logger: slog::Logger) -> Server {
        let srv_logger = logger.new(o!("module" => "server"));

        return Server {
            config: config.clone(),
            ipam: Arc::new(Ipam::create(&config.allocation, &logger)),
            logger: srv_logger,
        };
    }

    pub fn ipam(&self) -> Arc<Ipam> {
        return self.ipam.clone();
    }

    /// Serve the API until `shutdown` is notified. Runs the background purge
    /// alongside when a retention is configured.
    pub async fn serve(&self, shutdown: Arc<Notify>) -> Result<(), ServeError> {
        let routes = web::filters(self.ipam.clone());
        let signal = async move { shutdown.notified().await };
        let (addr, server) = match warp::serve(routes)
            .try_bind_with_graceful_shutdown(self.config.server.bind_address, signal)
        {
            Err(err) => {
                error!(self.logger, "Failed to bind: {}", err);
                return Err(ServeError::BindError(err));
            }
            Ok(bound) => bound,
        };
        info!(self.logger, "Serving"; "address" => %addr);

        tokio::select! {
            _ = server => {
                info!(self.logger, "Shutting down");
            }
            _ = self.purge_loop() => {}
        }
        return Ok(());
    }

    async fn purge_loop(&self) {
        let logger = self.logger.new(o!("routine" => "purge_loop"));
        let days = match self.config.discovery.retention_days {
            Some(days) => days,
            None => {
                debug!(logger, "No retention configured, background purge disabled");
                return std::future::pending::<()>().await;
            }
        };

        if self.config.discovery.purge_interval.is_zero() {
            warn!(logger, "Zero purge interval, background purge disabled");
            return std::future::pending::<()>().await;
        }

        let mut interval = tokio::time::interval(self.config.discovery.purge_interval);
        loop {
            interval.tick().await;
            let purged = self
                .ipam
                .reconciler
                .purge(chrono::Duration::days(days as i64))
                .await;
            debug!(logger, "Purged {} stale discovered addresses", purged; "days" => days);
        }
    }
}
