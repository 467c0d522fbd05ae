//! TCP listener.
//!
//! DNS over TCP frames every message with a two-byte big-endian length
//! prefix. Connections are handled one query at a time; the read
//! deadline doubles as the idle timeout.

use crate::handler::QueryHandler;
use crate::{Result, READ_TIMEOUT, WRITE_TIMEOUT};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, trace};
use umbra_proto::Message;

/// TCP DNS listener. Each connection is handled in its own task.
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    tracker: mpsc::Sender<()>,
}

impl TcpServer {
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

        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "TCP listener ready");

        Ok(Self {
            listener,
            handler,
            local_addr,
            tracker,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    error!(error = %error, "TCP accept failed");
                    return Err(error.into());
                }
            };

            let handler = self.handler.clone();
            let guard = self.tracker.clone();

            tokio::spawn(async move {
                let _guard = guard;
                if let Err(error) = serve_connection(stream, peer, handler).await {
                    debug!(error = %error, client = %peer, "TCP connection failed");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
) -> Result<()> {
    loop {
        let frame = match timeout(READ_TIMEOUT, read_frame(&mut stream)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(error)) => {
                if error.kind() == std::io::ErrorKind::UnexpectedEof {
                    trace!(client = %peer, "TCP connection closed by client");
                    return Ok(());
                }
                return Err(error.into());
            }
            Err(_) => {
                trace!(client = %peer, "TCP connection idle, closing");
                return Ok(());
            }
        };

        let query = match Message::parse(&frame) {
            Ok(message) => message,
            Err(error) => {
                debug!(error = %error, client = %peer, "dropping unparseable TCP query");
                continue;
            }
        };

        let response = handler.handle(query, peer).await;
        let wire = response.to_wire();

        timeout(WRITE_TIMEOUT, write_frame(&mut stream, &wire))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "TCP write timed out")
            })??;
    }
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;

    let len = usize::from(u16::from_be_bytes(len_buf));
    if len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "zero-length TCP frame",
        ));
    }

    let mut frame = vec![0u8; len];
    stream.read_exact(&mut frame).await?;
    Ok(frame)
}

async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(data.len() as u16).to_be_bytes()).await?;
    stream.write_all(data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::str::FromStr;
    use umbra_proto::{Name, Question, ResourceRecord};

    struct EchoHandler;

    #[async_trait]
    impl QueryHandler for EchoHandler {
        async fn handle(&self, query: Message, _client: SocketAddr) -> Message {
            let mut response = Message::response_from(&query);
            response.add_answer(ResourceRecord::a(
                query.question().unwrap().qname.clone(),
                60,
                std::net::Ipv4Addr::new(192, 0, 2, 1),
            ));
            response
        }
    }

    async fn exchange(addr: SocketAddr, query: &Message) -> Message {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let wire = query.to_wire();
        stream
            .write_all(&(wire.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&wire).await.unwrap();

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
        stream.read_exact(&mut body).await.unwrap();
        Message::parse(&body).unwrap()
    }

    #[tokio::test]
    async fn serves_a_query() {
        let (tracker, _rx) = mpsc::channel(1);
        let server = TcpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(EchoHandler),
            tracker,
        )
        .await
        .unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run());

        let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
        let response = exchange(addr, &query).await;

        assert_eq!(response.id(), query.id());
        assert_eq!(response.answers().len(), 1);
    }

    #[tokio::test]
    async fn connection_serves_multiple_queries() {
        let (tracker, _rx) = mpsc::channel(1);
        let server = TcpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(EchoHandler),
            tracker,
        )
        .await
        .unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        for name in ["one.test", "two.test"] {
            let query = Message::query(Question::a(Name::from_str(name).unwrap()));
            let wire = query.to_wire();
            stream
                .write_all(&(wire.len() as u16).to_be_bytes())
                .await
                .unwrap();
            stream.write_all(&wire).await.unwrap();

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await.unwrap();
            let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
            stream.read_exact(&mut body).await.unwrap();
            assert_eq!(Message::parse(&body).unwrap().id(), query.id());
        }
    }
}
