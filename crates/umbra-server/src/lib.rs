//! # Umbra DNS server
//!
//! UDP and TCP listeners on the same address sharing one query
//! pipeline, plus the HTTP control/debug surface. Listeners accept
//! until shutdown or a fatal socket error, and shutdown gives in-flight
//! queries a bounded grace window to finish writing their replies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{error, info};

pub mod control;
pub mod handler;
pub mod stats;
pub mod tcp;
pub mod udp;

pub use control::{ControlServer, ControlState};
pub use handler::{Pipeline, QueryHandler};
pub use stats::{ServerStats, StatsSnapshot};
pub use tcp::TcpServer;
pub use udp::UdpServer;

/// Read deadline for listeners; also the TCP idle timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Write deadline for replies.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long shutdown waits for in-flight queries.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Largest datagram the UDP listener accepts.
pub const MAX_UDP_MESSAGE: usize = 65535;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Listener errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket setup or I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The paired UDP and TCP listeners.
pub struct DnsServer {
    udp: UdpServer,
    tcp: TcpServer,
    active_tx: mpsc::Sender<()>,
    active_rx: mpsc::Receiver<()>,
}

impl DnsServer {
    /// Binds both listeners on `addr`. Failure to bind either is fatal.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let (active_tx, active_rx) = mpsc::channel(1);

        let udp = UdpServer::bind(addr, handler.clone(), active_tx.clone()).await?;
        let tcp = TcpServer::bind(addr, handler, active_tx.clone()).await?;

        Ok(Self {
            udp,
            tcp,
            active_tx,
            active_rx,
        })
    }

    /// Returns the bound UDP address.
    pub fn udp_addr(&self) -> SocketAddr {
        self.udp.local_addr()
    }

    /// Returns the bound TCP address.
    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    /// Serves until `shutdown` fires or a listener fails; a failing
    /// listener takes the other one down. In both cases in-flight
    /// queries get [`SHUTDOWN_GRACE`] to complete.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let Self {
            udp,
            tcp,
            active_tx,
            mut active_rx,
        } = self;

        let mut udp_task = tokio::spawn(udp.run());
        let mut tcp_task = tokio::spawn(tcp.run());

        tokio::select! {
            result = &mut udp_task => {
                error!("UDP listener exited unexpectedly");
                tcp_task.abort();
                if let Ok(Err(error)) = result {
                    error!(error = %error, "UDP listener error");
                }
            }
            result = &mut tcp_task => {
                error!("TCP listener exited unexpectedly");
                udp_task.abort();
                if let Ok(Err(error)) = result {
                    error!(error = %error, "TCP listener error");
                }
            }
            _ = shutdown.recv() => {
                info!("DNS server shutting down");
                udp_task.abort();
                tcp_task.abort();
            }
        }

        // The listeners are gone; wait for in-flight query tasks to
        // drop their tracker handles.
        drop(active_tx);
        let _ = timeout(SHUTDOWN_GRACE, active_rx.recv()).await;

        Ok(())
    }
}
