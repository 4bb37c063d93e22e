//! `GauntletServer` builder, accept loop, and admission loop.

use std::sync::Arc;
use std::time::Duration;

use gauntlet_protocol::{Codec, JsonCodec};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::handler::handle_connection;
use crate::{Gauntlet, GauntletConfig, GauntletError};

/// State shared by every connection task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) service: Gauntlet,
    pub(crate) codec: C,
}

/// Builder for a [`GauntletServer`].
///
/// ```rust,no_run
/// # async fn run() -> Result<(), gauntlet::GauntletError> {
/// let server = gauntlet::GauntletServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct GauntletServerBuilder {
    config: GauntletConfig,
}

impl GauntletServerBuilder {
    pub fn new() -> Self {
        Self {
            config: GauntletConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: GauntletConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Binds the listener. Uses [`JsonCodec`] on the wire.
    ///
    /// # Errors
    /// [`GauntletError::Io`] if the address cannot be bound.
    pub async fn build(self) -> Result<GauntletServer<JsonCodec>, GauntletError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "gauntlet listening");
        Ok(GauntletServer {
            listener,
            state: Arc::new(ServerState {
                service: Gauntlet::new(self.config),
                codec: JsonCodec,
            }),
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for GauntletServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Gauntlet server. Call [`run`](Self::run) to serve.
pub struct GauntletServer<C: Codec> {
    listener: TcpListener,
    state: Arc<ServerState<C>>,
    shutdown: CancellationToken,
}

impl GauntletServer<JsonCodec> {
    pub fn builder() -> GauntletServerBuilder {
        GauntletServerBuilder::new()
    }
}

impl<C: Codec> GauntletServer<C> {
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that makes [`run`](Self::run) return when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accepts connections and admits the queue head on a fixed interval
    /// until the shutdown token is cancelled.
    ///
    /// # Errors
    /// Currently never fails; accept errors are logged and skipped.
    pub async fn run(self) -> Result<(), GauntletError> {
        let every = self.state.service.config().admission_interval();
        tokio::spawn(admission_loop(
            Arc::clone(&self.state),
            every,
            self.shutdown.child_token(),
        ));
        tracing::info!(admission_interval_ms = every.as_millis() as u64, "gauntlet running");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, state).await {
                                tracing::debug!(%addr, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.state.service.shutdown();
        Ok(())
    }
}

async fn admission_loop<C: Codec>(
    state: Arc<ServerState<C>>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(user) = state.service.admit_next() {
                    tracing::debug!(
                        user_id = %user.id(),
                        waiting = state.service.queue().len(),
                        "admission tick"
                    );
                }
            }
        }
    }
}
