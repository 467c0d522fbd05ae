//! UDP listener.

use crate::handler::QueryHandler;
use crate::{Result, MAX_UDP_MESSAGE, WRITE_TIMEOUT};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, trace};
use umbra_proto::Message;

/// UDP DNS listener. Each datagram is handled in its own task.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    /// Every in-flight query task holds a clone; shutdown waits for
    /// the channel to close.
    tracker: mpsc::Sender<()>,
}

impl UdpServer {
    /// Binds the listener.
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn QueryHandler>,
        tracker: mpsc::Sender<()>,
    ) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, "UDP listener ready");

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            local_addr,
            tracker,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives datagrams until the socket fails.
    pub async fn run(self) -> Result<()> {
        let mut buf = vec![0u8; MAX_UDP_MESSAGE];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(error) => {
                    error!(error = %error, "UDP receive failed");
                    return Err(error.into());
                }
            };

            let packet = buf[..len].to_vec();
            let socket = self.socket.clone();
            let handler = self.handler.clone();
            let guard = self.tracker.clone();

            tokio::spawn(async move {
                let _guard = guard;
                if let Err(error) = process(socket, handler, packet, peer).await {
                    debug!(error = %error, client = %peer, "UDP query failed");
                }
            });
        }
    }
}

async fn process(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    packet: Vec<u8>,
    peer: SocketAddr,
) -> Result<()> {
    let query = match Message::parse(&packet) {
        Ok(message) => message,
        Err(error) => {
            // Malformed datagrams are dropped without a reply.
            trace!(error = %error, client = %peer, "dropping unparseable datagram");
            return Ok(());
        }
    };

    let response = handler.handle(query, peer).await;
    let wire = response.to_wire();

    timeout(WRITE_TIMEOUT, socket.send_to(&wire, peer))
        .await
        .map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "UDP send timed out")
        })??;

    Ok(())
}
