//! HTTP listener answering every request from the mock store.

pub mod handler;
pub mod outcome;
pub mod writer;

pub use handler::{handle_request, Dispatcher};
pub use outcome::Outcome;

use crate::config::Config;
use crate::store::{InMemoryStore, MockStore};
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A bound, not yet running, mock listener.
pub struct MockServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl MockServer {
    /// Bind with an in-memory store honoring `history_max_retention`.
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn MockStore> =
            Arc::new(InMemoryStore::new(config.history_max_retention));
        Self::bind_with_store(config, store).await
    }

    /// Bind `listen.host:listen.port`; port `0` picks a free port.
    pub async fn bind_with_store(
        config: &Config,
        store: Arc<dyn MockStore>,
    ) -> anyhow::Result<Self> {
        let host = config.listen.host.as_str();
        let listener = TcpListener::bind((host, config.listen.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", host, config.listen.port))?;
        let local_addr = listener.local_addr()?;
        info!("Mock server bound to {}", local_addr);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Ok(Self {
            listener,
            local_addr,
            dispatcher: Arc::new(Dispatcher::from_config(config, store)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> Arc<dyn MockStore> {
        self.dispatcher.store().clone()
    }

    /// Sender that stops the accept loop when signalled.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until shutdown is signalled.
    pub async fn run(self) {
        // The sender stays alive for the whole loop so `recv` only returns on a signal.
        let MockServer {
            listener,
            local_addr,
            dispatcher,
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
        } = self;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let dispatcher = Arc::clone(&dispatcher);
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let dispatcher = Arc::clone(&dispatcher);
                                    async move { handle_request(req, dispatcher, addr).await }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!("Connection error from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error on {}: {}", local_addr, e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Mock server on {} shutting down", local_addr);
                    break;
                }
            }
        }
    }

    /// Run on a background task.
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let store = self.store();
        let shutdown_tx = self.shutdown_sender();
        let task = tokio::spawn(self.run());
        ServerHandle {
            local_addr,
            store,
            shutdown_tx,
            task,
        }
    }
}

/// A mock server running on a background task.
pub struct ServerHandle {
    local_addr: SocketAddr,
    store: Arc<dyn MockStore>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://<addr>`, handy for clients.
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn store(&self) -> Arc<dyn MockStore> {
        self.store.clone()
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Mock server task failed: {}", e);
        }
    }
}
