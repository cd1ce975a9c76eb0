//! The relay server: owns the serial channels and the client sessions, and
//! routes messages between them.
//!
//! Startup opens every configured serial device, loads the whitelist, and
//! binds the TCP listener; failure of any of these is fatal. After that
//! nothing is: sessions come and go, serial reads retry, and undeliverable
//! messages are dropped with a log line.
//!
//! Routing follows most-recent-writer ownership: when port *P* emits a
//! message it is delivered to the session that last wrote to *P*. If no
//! session ever wrote, or that session is gone, the message is dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, SerialChannel, DEFAULT_DELIMITERS};
use crate::datalog::DataLogger;
use crate::error::{RelayError, RelayResult};
use crate::session::{self, SessionContext, SessionTable};
use crate::transport::{self, SerialLink};
use crate::whitelist::Whitelist;

/// Queue depth between the serial reader threads and the router task.
const EVENT_QUEUE: usize = 256;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// TCP port to listen on (0 picks an ephemeral port).
    pub port: u16,
    /// Serial device names; list order assigns the port digits 0, 1, ...
    pub devices: Vec<String>,
    /// Baud rate applied to every device.
    pub baud: u32,
    /// Whitelist CSV file.
    pub whitelist: PathBuf,
    /// Root directory for the `Data-Logs` tree.
    pub log_root: PathBuf,
    /// Message boundary characters for the inbound device streams.
    pub delimiters: Vec<u8>,
}

impl RelayConfig {
    pub fn new(port: u16, devices: Vec<String>, whitelist: PathBuf) -> Self {
        RelayConfig {
            port,
            devices,
            baud: transport::DEFAULT_BAUD,
            whitelist,
            log_root: PathBuf::from("."),
            delimiters: DEFAULT_DELIMITERS.to_vec(),
        }
    }
}

/// A running relay server.
///
/// Dropping the handle leaves the server running until the process exits;
/// call [`RelayServer::shutdown`] for an orderly stop.
pub struct RelayServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    readers: Vec<thread::JoinHandle<()>>,
}

impl RelayServer {
    /// Open the configured physical serial ports and start the server.
    pub async fn start(config: RelayConfig) -> RelayResult<RelayServer> {
        if config.devices.is_empty() {
            return Err(RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "at least one serial device is required",
            )));
        }

        let mut links = Vec::with_capacity(config.devices.len());
        for name in &config.devices {
            links.push(transport::open_port(name, config.baud)?);
        }
        Self::start_with_links(config, links).await
    }

    /// Start the server over caller-supplied device links.
    ///
    /// Tests use this with [`transport::MemoryLink`] pairs in place of
    /// physical ports; `config.devices` is ignored.
    pub async fn start_with_links(
        config: RelayConfig,
        links: Vec<Box<dyn SerialLink>>,
    ) -> RelayResult<RelayServer> {
        let whitelist = Arc::new(Whitelist::load(&config.whitelist)?);
        let logger = DataLogger::new(&config.log_root);
        let shutdown = Arc::new(AtomicBool::new(false));

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let mut channels = Vec::with_capacity(links.len());
        let mut readers = Vec::with_capacity(links.len());
        for (index, link) in links.into_iter().enumerate() {
            let (channel, reader) = SerialChannel::open(
                index,
                link,
                config.delimiters.clone(),
                Arc::clone(&shutdown),
            )?;
            channels.push(channel);

            let events = events_tx.clone();
            let log = logger.clone();
            readers.push(
                thread::Builder::new()
                    .name(format!("serial-reader-{index}"))
                    .spawn(move || reader.run(events, log))?,
            );
        }
        drop(events_tx);

        let channels = Arc::new(channels);
        let sessions: SessionTable = Arc::new(Mutex::new(HashMap::new()));

        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            devices = channels.len(),
            "relay server started, waiting for clients"
        );

        let router = tokio::spawn(route_loop(events_rx, Arc::clone(&sessions)));
        let acceptor = tokio::spawn(accept_loop(
            listener,
            whitelist,
            channels,
            sessions,
            logger,
        ));

        Ok(RelayServer {
            local_addr,
            shutdown,
            tasks: vec![router, acceptor],
            readers,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, stop routing, and wind down the serial readers.
    /// In-flight writes may be lost; shutdown is best-effort.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for task in &self.tasks {
            task.abort();
        }
        for reader in self.readers {
            let _ = reader.join();
        }
        info!("relay server stopped");
    }
}

/// Accept connections forever, handing each to a session task with a fresh
/// monotonically increasing id.
async fn accept_loop(
    listener: TcpListener,
    whitelist: Arc<Whitelist>,
    channels: Arc<Vec<Arc<SerialChannel>>>,
    sessions: SessionTable,
    logger: DataLogger,
) {
    let mut next_id: u64 = 0;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                next_id += 1;
                debug!(session = next_id, %addr, "inbound connection");
                let ctx = SessionContext {
                    id: next_id,
                    whitelist: Arc::clone(&whitelist),
                    channels: Arc::clone(&channels),
                    sessions: Arc::clone(&sessions),
                    logger: logger.clone(),
                };
                tokio::spawn(session::run(stream, ctx));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

/// Deliver each channel emission to the session recorded as the port's
/// most recent writer.
async fn route_loop(mut events: mpsc::Receiver<ChannelEvent>, sessions: SessionTable) {
    while let Some(event) = events.recv().await {
        let dest = event.session_id.and_then(|id| {
            sessions
                .lock()
                .unwrap()
                .get(&id)
                .map(|tx| (id, tx.clone()))
        });

        match dest {
            Some((id, tx)) => {
                if tx.send(event.message).await.is_err() {
                    warn!(
                        session = id,
                        port = event.port_index,
                        "dropping message for closed session"
                    );
                }
            }
            None => warn!(
                port = event.port_index,
                session = ?event.session_id,
                message = %event.message,
                "invalid client for serial message, dropping"
            ),
        }
    }
}
