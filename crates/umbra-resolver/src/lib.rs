//! # Umbra upstream resolver
//!
//! Forwards a query to a list of public resolvers as a staggered race:
//! workers are launched top-down with a pause between starts, and the
//! first acceptable reply wins. A fast server short-circuits the ones
//! below it, while a slow or dead first server only costs one stagger
//! interval instead of stalling the whole lookup.
//!
//! Exchanges run over TCP (reliable for large responses) with read and
//! write deadlines. A reply is acceptable unless the exchange failed or
//! the RCODE is SERVFAIL; later winners are discarded through a one-slot
//! channel.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::debug;
use umbra_proto::Message;

/// Result type alias for resolver operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors surfaced to the query pipeline.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Every upstream failed, answered SERVFAIL, or timed out.
    #[error("cannot resolve {name}")]
    Unresolvable {
        /// The queried name.
        name: String,
    },

    /// The resolver was built with an empty upstream list.
    #[error("no upstream servers configured")]
    NoUpstreams,
}

/// Something that can answer a DNS query.
///
/// The server pipeline and the tests talk to this trait rather than to
/// [`RacingResolver`] directly.
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Resolves `query`, returning the winning upstream response.
    async fn lookup(&self, query: &Message) -> Result<Message>;
}

/// Timeouts for the race.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Per-exchange read deadline.
    pub read_timeout: Duration,
    /// Per-exchange connect/write deadline.
    pub write_timeout: Duration,
    /// Pause between launching consecutive upstream workers.
    pub stagger: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            stagger: Duration::from_secs(5),
        }
    }
}

/// Returns the default public upstream set, two addresses per operator:
/// Google, Cloudflare, Control D, Quad9, OpenDNS.
pub fn default_upstreams() -> Vec<SocketAddr> {
    const ADDRS: [Ipv4Addr; 10] = [
        // google
        Ipv4Addr::new(8, 8, 8, 8),
        Ipv4Addr::new(8, 8, 4, 4),
        // cloudflare
        Ipv4Addr::new(1, 1, 1, 1),
        Ipv4Addr::new(1, 0, 0, 1),
        // control d
        Ipv4Addr::new(76, 76, 2, 0),
        Ipv4Addr::new(76, 76, 10, 0),
        // quad9
        Ipv4Addr::new(9, 9, 9, 9),
        Ipv4Addr::new(149, 112, 112, 112),
        // opendns
        Ipv4Addr::new(208, 67, 222, 222),
        Ipv4Addr::new(208, 67, 220, 220),
    ];

    ADDRS
        .into_iter()
        .map(|ip| SocketAddr::new(IpAddr::V4(ip), 53))
        .collect()
}

/// The staggered racing resolver.
pub struct RacingResolver {
    servers: Vec<SocketAddr>,
    options: ResolverOptions,
}

impl RacingResolver {
    /// Creates a resolver over the given upstreams with default timeouts.
    pub fn new(servers: Vec<SocketAddr>) -> Self {
        Self::with_options(servers, ResolverOptions::default())
    }

    /// Creates a resolver with explicit timeouts.
    pub fn with_options(servers: Vec<SocketAddr>, options: ResolverOptions) -> Self {
        Self { servers, options }
    }

    /// Returns the configured upstream addresses.
    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    async fn exchange(
        addr: SocketAddr,
        wire: &[u8],
        expected_id: u16,
        options: &ResolverOptions,
    ) -> io::Result<Message> {
        let mut stream = timeout(options.write_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;

        let len = wire.len() as u16;
        timeout(options.write_timeout, async {
            stream.write_all(&len.to_be_bytes()).await?;
            stream.write_all(wire).await
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))??;

        let response = timeout(options.read_timeout, async {
            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
            stream.read_exact(&mut body).await?;
            Ok::<_, io::Error>(body)
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??;

        let message = Message::parse(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        if message.id() != expected_id {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "response id mismatch",
            ));
        }

        Ok(message)
    }
}

#[async_trait]
impl Lookup for RacingResolver {
    async fn lookup(&self, query: &Message) -> Result<Message> {
        if self.servers.is_empty() {
            return Err(ResolveError::NoUpstreams);
        }

        let name = query
            .question()
            .map(|q| q.qname.to_string())
            .unwrap_or_else(|| ".".to_string());
        let wire = query.to_wire();
        let expected_id = query.id();

        let (tx, mut rx) = mpsc::channel::<Message>(1);
        let mut workers = JoinSet::new();

        for &addr in &self.servers {
            let tx = tx.clone();
            let wire = wire.clone();
            let options = self.options.clone();

            workers.spawn(async move {
                match RacingResolver::exchange(addr, &wire, expected_id, &options).await {
                    Ok(response) => {
                        if response.is_servfail() {
                            debug!(upstream = %addr, "upstream answered SERVFAIL");
                            return;
                        }
                        // First sender wins; the slot holds one reply.
                        let _ = tx.try_send(response);
                    }
                    Err(error) => {
                        debug!(upstream = %addr, error = %error, "upstream exchange failed");
                    }
                }
            });

            // Give this worker a head start before launching the next,
            // returning immediately if it already produced the answer.
            if let Ok(Some(response)) = timeout(self.options.stagger, rx.recv()).await {
                return Ok(response);
            }
        }

        drop(tx);
        while workers.join_next().await.is_some() {}

        rx.try_recv()
            .map_err(|_| ResolveError::Unresolvable { name })
    }
}
