//! Relay node: wires configuration, keys and backends into a running relay.

use crate::api;
use crate::config::RelayConfig;
use crate::content::LocalPinStore;
use crate::crypto::{MlDsaVerifier, RelaySigner};
use crate::error::Result;
use crate::event::{create_event_channel, RelayEvent, RelayEventsChannel, RelayEventsSender};
use crate::notify::WebhookNotifier;
use crate::relay::RelayService;
use crate::store::{DualStore, LogStore, MemoryCache};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

/// Builder for constructing a relay node.
pub struct RelayNodeBuilder {
    config: RelayConfig,
}

impl RelayNodeBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Load the relay key, open the stores and build the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the relayer key is missing or invalid, or if a
    /// store cannot be opened.
    pub async fn build(self) -> Result<RunningRelay> {
        info!("Building snapshot-relay with config: {:?}", self.config);

        std::fs::create_dir_all(&self.config.root_dir)?;

        // Refuse to start without a usable relay key
        let signer = Arc::new(RelaySigner::from_file(&self.config.key_file())?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let durable = Arc::new(LogStore::open(&self.config.store_dir()).await?);
        let cache = Arc::new(MemoryCache::with_capacity(self.config.cache_capacity));
        let store = Arc::new(
            DualStore::new(cache, durable)
                .with_strict_writes(self.config.strict_writes)
                .with_events(events_tx.clone()),
        );
        store.warm_cache(self.config.warm_cache_limit).await?;

        let content = Arc::new(LocalPinStore::open(self.config.pin_dir())?);
        let notifier = Arc::new(WebhookNotifier::new(self.config.notify.clone())?);

        let service = RelayService::builder(signer, content, store)
            .verifier(Arc::new(MlDsaVerifier))
            .notifier(notifier)
            .events(events_tx.clone())
            .network(self.config.network.clone())
            .build();

        Ok(RunningRelay {
            config: self.config,
            service: Arc::new(service),
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// A running relay node.
pub struct RunningRelay {
    config: RelayConfig,
    service: Arc<RelayService>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: RelayEventsSender,
    events_rx: Option<RelayEventsChannel>,
}

impl RunningRelay {
    /// Get the relay's root directory.
    #[must_use]
    pub fn root_dir(&self) -> &PathBuf {
        &self.config.root_dir
    }

    /// The relay service.
    #[must_use]
    pub fn service(&self) -> &Arc<RelayService> {
        &self.service
    }

    /// Get a receiver for relay events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<RelayEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to relay events.
    #[must_use]
    pub fn subscribe_events(&self) -> RelayEventsChannel {
        self.events_tx.subscribe()
    }

    /// Serve requests on stdin/stdout until EOF or shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin or stdout fails.
    pub async fn run(&mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve newline-delimited JSON requests from `reader`, writing one
    /// response line per request to `writer`.
    ///
    /// Blank lines are skipped. Stops at end of input, on Ctrl-C, or when
    /// [`RunningRelay::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            "Relay {} serving network {}",
            self.service.service_info().relayer,
            self.config.network
        );
        let _ = self.events_tx.send(RelayEvent::Started);

        let mut lines = reader.lines();
        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("End of input");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let mut response = api::handle_line(&self.service, &line).await;
                    response.push('\n');
                    writer.write_all(response.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }

        let _ = self.events_tx.send(RelayEvent::ShuttingDown);
        info!("Relay shutdown complete");
        Ok(())
    }

    /// Request the relay to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
