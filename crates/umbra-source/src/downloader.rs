//! Streaming hostfile download and parsing.
//!
//! Hostfiles run to hundreds of thousands of lines, so the body is
//! consumed chunk by chunk and split into lines as it arrives; the
//! whole file is never buffered.
//!
//! Accepted line shapes are `<ip> <domain>` and `<domain>`, optionally
//! indented; `#` starts a comment. A fixed set of sinkhole IP prefixes
//! is stripped and a fixed set of well-known pseudo-hosts is dropped.

use crate::{Result, SourceError};
use futures::StreamExt;

/// Leading IPs that hostfiles map blocked domains to.
const KNOWN_PREFIXES: &[&str] = &[
    "127.0.0.1",
    "255.255.255.255",
    "::1",
    "fe80::1%lo0",
    "ff00::0",
    "ff02::1",
    "ff02::2",
    "ff02::3",
    "0.0.0.0",
];

/// Hostnames that appear in every hostfile but are never block targets.
const PSEUDO_HOSTS: &[&str] = &[
    "localhost",
    "local",
    "localhost.localdomain",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
    "0.0.0.0",
];

/// Extracts the domain from one hostfile line, if it carries one.
fn parse_line(line: &str) -> Option<&str> {
    let mut row = line.trim();
    if row.is_empty() || row.starts_with('#') {
        return None;
    }

    for prefix in KNOWN_PREFIXES {
        if let Some(rest) = row.strip_prefix(prefix) {
            row = rest;
        }
    }
    row = row.trim();

    if row.is_empty() || PSEUDO_HOSTS.contains(&row) {
        return None;
    }

    Some(row)
}

/// Hostfile fetcher.
#[derive(Clone, Default)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Creates a downloader with a fresh HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts streaming the hostfile at `url`.
    pub async fn stream(&self, url: &str) -> Result<DomainReader> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| SourceError::Http {
                url: url.to_string(),
                source,
            })?;

        Ok(DomainReader {
            url: url.to_string(),
            body: Some(Box::pin(response.bytes_stream())),
            carry: Vec::new(),
            ready: std::collections::VecDeque::new(),
        })
    }

    /// Streams `url` and invokes `on_domain` for every parsed domain.
    ///
    /// Transport errors and callback errors abort the iteration and
    /// propagate.
    pub async fn for_each<F>(&self, url: &str, mut on_domain: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let mut reader = self.stream(url).await?;
        while let Some(domain) = reader.next_domain().await? {
            on_domain(&domain)?;
        }
        Ok(())
    }
}

type BodyStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

/// Incremental line splitter over a streaming response body.
pub struct DomainReader {
    url: String,
    /// `None` once the body is exhausted.
    body: Option<BodyStream>,
    /// Bytes of the current, still unterminated line.
    carry: Vec<u8>,
    /// Domains parsed but not yet handed out.
    ready: std::collections::VecDeque<String>,
}

impl DomainReader {
    /// Returns the next parsed domain, or `None` at end of body.
    pub async fn next_domain(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(domain) = self.ready.pop_front() {
                return Ok(Some(domain));
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };

            match body.next().await {
                Some(Ok(chunk)) => {
                    self.carry.extend_from_slice(&chunk);
                    self.split_lines();
                }
                Some(Err(source)) => {
                    self.body = None;
                    return Err(SourceError::Http {
                        url: self.url.clone(),
                        source,
                    });
                }
                None => {
                    self.body = None;
                    // The final line may lack a terminator.
                    if !self.carry.is_empty() {
                        let last = std::mem::take(&mut self.carry);
                        self.push_line(&last);
                    }
                }
            }
        }
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            self.push_line(&line[..line.len() - 1]);
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        if let Some(domain) = parse_line(&line) {
            self.ready.push_back(domain.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_line("# a comment"), None);
        assert_eq!(parse_line("   # indented comment"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   \t"), None);
    }

    #[test]
    fn prefixes_are_stripped() {
        assert_eq!(parse_line("0.0.0.0 evil.test"), Some("evil.test"));
        assert_eq!(parse_line("127.0.0.1\tads.test"), Some("ads.test"));
        assert_eq!(parse_line("::1 tracker.test"), Some("tracker.test"));
        assert_eq!(parse_line("  255.255.255.255 spam.test  "), Some("spam.test"));
    }

    #[test]
    fn bare_domains_pass_through() {
        assert_eq!(parse_line("evil.test"), Some("evil.test"));
        assert_eq!(parse_line("  evil.test  "), Some("evil.test"));
    }

    #[test]
    fn pseudo_hosts_are_dropped() {
        assert_eq!(parse_line("localhost"), None);
        assert_eq!(parse_line("127.0.0.1 localhost"), None);
        assert_eq!(parse_line("255.255.255.255 broadcasthost"), None);
        assert_eq!(parse_line("::1 ip6-loopback"), None);
        assert_eq!(parse_line("0.0.0.0 0.0.0.0"), None);
        assert_eq!(parse_line("0.0.0.0"), None);
    }

    async fn serve_body(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/hosts", get(move || async move { body }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/hosts")
    }

    #[tokio::test]
    async fn for_each_streams_all_domains() {
        let url =
            serve_body("# comment\n0.0.0.0 a.test\nb.test\nlocalhost\n\n127.0.0.1 c.test").await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let downloader = Downloader::new();
        downloader
            .for_each(&url, |domain| {
                seen.lock().push(domain.to_string());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock(), ["a.test", "b.test", "c.test"]);
    }

    #[tokio::test]
    async fn callback_error_aborts_iteration() {
        let url = serve_body("a.test\nb.test\nc.test\n").await;

        let mut calls = 0;
        let downloader = Downloader::new();
        let result = downloader
            .for_each(&url, |_| {
                calls += 1;
                Err(SourceError::InvalidUrl {
                    url: "sentinel".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn unreachable_host_propagates_transport_error() {
        // Bind and drop so the port refuses connections.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let downloader = Downloader::new();
        let result = downloader
            .for_each(&format!("http://{addr}/hosts"), |_| Ok(()))
            .await;

        assert!(matches!(result, Err(SourceError::Http { .. })));
    }
}
