//! The per-query pipeline.
//!
//! Every query walks the same four-stage pipeline, and every terminal
//! branch writes exactly one reply and one history record:
//!
//! 1. answer cache — hit replies with the cached record
//! 2. blacklist — A/AAAA queries for blocked names get a synthetic
//!    loopback answer
//! 3. upstream race — failure replies SERVFAIL
//! 4. cache write — the first answer record of a successful response
//!    is stored for its TTL, and the response forwarded verbatim

use crate::stats::ServerStats;
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};
use umbra_blacklist::Blacklist;
use umbra_cache::AnswerCache;
use umbra_history::{HistoryLogger, Record, Status};
use umbra_proto::{
    Class, Message, Question, RData, RecordClass, RecordType, ResourceRecord, ResponseCode,
};
use umbra_resolver::Lookup;

/// Something that turns a query into a reply.
///
/// The listeners are generic over this so tests can drive them with
/// canned handlers.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Handles one query from `client`.
    async fn handle(&self, query: Message, client: SocketAddr) -> Message;
}

/// The production pipeline.
pub struct Pipeline {
    cache: Arc<AnswerCache>,
    blacklist: Arc<Blacklist>,
    resolver: Arc<dyn Lookup>,
    history: HistoryLogger,
    stats: Arc<ServerStats>,
    block_ttl: u32,
}

impl Pipeline {
    /// Wires the pipeline together. `block_ttl` is the TTL in seconds
    /// stamped onto synthetic blocked replies.
    pub fn new(
        cache: Arc<AnswerCache>,
        blacklist: Arc<Blacklist>,
        resolver: Arc<dyn Lookup>,
        history: HistoryLogger,
        stats: Arc<ServerStats>,
        block_ttl: u32,
    ) -> Self {
        Self {
            cache,
            blacklist,
            resolver,
            history,
            stats,
            block_ttl,
        }
    }

    fn blocked_record(&self, question: &Question) -> ResourceRecord {
        let rdata = if question.qtype == RecordType::AAAA.into() {
            RData::Aaaa(Ipv6Addr::LOCALHOST)
        } else {
            RData::A(Ipv4Addr::LOCALHOST)
        };

        ResourceRecord::new(
            question.qname.clone(),
            question.qtype,
            Class::Known(RecordClass::IN),
            self.block_ttl,
            rdata,
        )
    }
}

#[async_trait]
impl QueryHandler for Pipeline {
    async fn handle(&self, query: Message, client: SocketAddr) -> Message {
        let Some(question) = query.question().cloned() else {
            // Nothing to answer; refuse the malformed query politely.
            let mut response = Message::response_from(&query);
            response.set_rcode(ResponseCode::FormErr);
            return response;
        };

        let qtype = question.qtype.to_u16();
        let cache_key = question.qname.to_string().to_ascii_lowercase();

        if let Some(record) = self.cache.get(qtype, &cache_key) {
            let mut response = Message::response_from(&query);
            response.add_answer(record);

            self.history
                .save(Record::new(client, &question, Status::Cached))
                .await;
            debug!(client = %client, domain = %question.qname, "domain is cached");
            self.stats.inc_cached();
            return response;
        }

        if question.is_address_query() && self.blacklist.has(&cache_key) {
            let mut response = Message::response_from(&query);
            response.add_answer(self.blocked_record(&question));

            self.history
                .save(Record::new(client, &question, Status::Blocked))
                .await;
            debug!(client = %client, domain = %question.qname, "domain is blocked");
            self.stats.inc_blocked();
            return response;
        }

        match self.resolver.lookup(&query).await {
            Err(err) => {
                self.history
                    .save(Record::new(client, &question, Status::Failed))
                    .await;
                error!(
                    client = %client,
                    domain = %question.qname,
                    error = %err,
                    "failed to resolve a domain"
                );
                self.stats.inc_failed();
                Message::servfail_for(&query)
            }
            Ok(response) => {
                if let Some(answer) = response.answers().first() {
                    self.cache.set(qtype, &cache_key, answer.clone());
                }

                self.history
                    .save(Record::new(client, &question, Status::Resolved))
                    .await;
                debug!(client = %client, domain = %question.qname, "domain is resolved");
                self.stats.inc_resolved();
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::str::FromStr;
    use tokio::sync::broadcast;
    use umbra_history::HistoryStorage;
    use umbra_proto::Name;
    use umbra_resolver::ResolveError;
    use umbra_store::HistoryRecord;

    /// Lookup stub returning a canned response or an error.
    struct StubResolver {
        answer: Option<ResourceRecord>,
        calls: Mutex<usize>,
    }

    impl StubResolver {
        fn answering(record: ResourceRecord) -> Self {
            Self {
                answer: Some(record),
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: None,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Lookup for StubResolver {
        async fn lookup(&self, query: &Message) -> umbra_resolver::Result<Message> {
            *self.calls.lock() += 1;
            match &self.answer {
                Some(record) => {
                    let mut response = Message::response_from(query);
                    response.add_answer(record.clone());
                    Ok(response)
                }
                None => Err(ResolveError::Unresolvable {
                    name: "down.test.".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        rows: Mutex<Vec<HistoryRecord>>,
    }

    #[async_trait]
    impl HistoryStorage for RecordingSink {
        async fn add_history_records(
            &self,
            records: Vec<HistoryRecord>,
        ) -> umbra_store::Result<()> {
            self.rows.lock().extend(records);
            Ok(())
        }
    }

    struct Harness {
        pipeline: Pipeline,
        cache: Arc<AnswerCache>,
        blacklist: Arc<Blacklist>,
        stats: Arc<ServerStats>,
        sink: Arc<RecordingSink>,
        shutdown: broadcast::Sender<()>,
        flusher: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn new(resolver: Arc<dyn Lookup>) -> Self {
            let cache = Arc::new(AnswerCache::new());
            let blacklist = Arc::new(Blacklist::new(16));
            let stats = Arc::new(ServerStats::new());
            let sink = Arc::new(RecordingSink::default());
            let (shutdown, _) = broadcast::channel(1);
            let (history, flusher) =
                HistoryLogger::spawn(sink.clone(), shutdown.subscribe());

            let pipeline = Pipeline::new(
                cache.clone(),
                blacklist.clone(),
                resolver,
                history,
                stats.clone(),
                10,
            );

            Self {
                pipeline,
                cache,
                blacklist,
                stats,
                sink,
                shutdown,
                flusher,
            }
        }

        /// Flushes and returns the history statuses seen so far.
        async fn statuses(self) -> Vec<String> {
            self.shutdown.send(()).unwrap();
            self.flusher.await.unwrap();
            self.sink.rows.lock().iter().map(|r| r.status.clone()).collect()
        }
    }

    fn client() -> SocketAddr {
        "192.0.2.77:50000".parse().unwrap()
    }

    fn a_query(name: &str) -> Message {
        Message::query(Question::a(Name::from_str(name).unwrap()))
    }

    #[tokio::test]
    async fn cache_hit_short_circuits() {
        let resolver = Arc::new(StubResolver::failing());
        let harness = Harness::new(resolver.clone());

        let cached = ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            60,
            Ipv4Addr::new(1, 2, 3, 4),
        );
        harness.cache.set(1, "example.com.", cached.clone());

        let query = a_query("example.com");
        let response = harness.pipeline.handle(query.clone(), client()).await;

        assert_eq!(response.id(), query.id());
        assert_eq!(response.answers(), &[cached]);
        assert_eq!(resolver.calls(), 0);
        assert_eq!(harness.stats.snapshot().cached, 1);
        assert_eq!(harness.statuses().await, ["cached"]);
    }

    #[tokio::test]
    async fn blocked_a_query_gets_loopback() {
        let resolver = Arc::new(StubResolver::failing());
        let harness = Harness::new(resolver.clone());
        harness.blacklist.add(["ads.test"]);

        let response = harness.pipeline.handle(a_query("ads.test"), client()).await;

        assert_eq!(response.rcode(), ResponseCode::NoError);
        let answer = &response.answers()[0];
        assert_eq!(answer.rdata().as_a(), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(answer.ttl(), 10);
        assert_eq!(resolver.calls(), 0);
        assert_eq!(harness.stats.snapshot().blocked, 1);
        assert_eq!(harness.statuses().await, ["blocked"]);
    }

    #[tokio::test]
    async fn blocked_aaaa_query_gets_v6_loopback() {
        let harness = Harness::new(Arc::new(StubResolver::failing()));
        harness.blacklist.add(["ads.test"]);

        let query = Message::query(Question::aaaa(Name::from_str("ads.test").unwrap()));
        let response = harness.pipeline.handle(query, client()).await;

        let answer = &response.answers()[0];
        assert_eq!(answer.rdata().as_aaaa(), Some(Ipv6Addr::LOCALHOST));
        assert_eq!(answer.ttl(), 10);
        assert_eq!(harness.statuses().await, ["blocked"]);
    }

    #[tokio::test]
    async fn blocked_name_still_forwards_other_qtypes() {
        let txt_answer = ResourceRecord::new(
            Name::from_str("ads.test").unwrap(),
            RecordType::TXT.into(),
            Class::Known(RecordClass::IN),
            60,
            RData::Txt(b"\x02ok".to_vec()),
        );
        let resolver = Arc::new(StubResolver::answering(txt_answer));
        let harness = Harness::new(resolver.clone());
        harness.blacklist.add(["ads.test"]);

        let query = Message::query(Question::new(
            Name::from_str("ads.test").unwrap(),
            RecordType::TXT,
            RecordClass::IN,
        ));
        let response = harness.pipeline.handle(query, client()).await;

        assert_eq!(resolver.calls(), 1);
        assert_eq!(response.answers().len(), 1);
        assert_eq!(harness.statuses().await, ["resolved"]);
    }

    #[tokio::test]
    async fn forwarded_answers_are_cached() {
        let upstream = ResourceRecord::a(
            Name::from_str("ok.test").unwrap(),
            30,
            Ipv4Addr::new(9, 9, 9, 9),
        );
        let resolver = Arc::new(StubResolver::answering(upstream.clone()));
        let harness = Harness::new(resolver.clone());

        let first = harness.pipeline.handle(a_query("ok.test"), client()).await;
        assert_eq!(first.answers()[0].rdata().as_a(), Some(Ipv4Addr::new(9, 9, 9, 9)));

        // The second query is served from the cache.
        let second = harness.pipeline.handle(a_query("ok.test"), client()).await;
        assert_eq!(second.answers()[0], upstream);
        assert_eq!(resolver.calls(), 1);

        let snapshot = harness.stats.snapshot();
        assert_eq!(snapshot.resolved, 1);
        assert_eq!(snapshot.cached, 1);
        assert_eq!(harness.statuses().await, ["resolved", "cached"]);
    }

    #[tokio::test]
    async fn upstream_failure_becomes_servfail() {
        let harness = Harness::new(Arc::new(StubResolver::failing()));

        let query = a_query("down.test");
        let response = harness.pipeline.handle(query.clone(), client()).await;

        assert_eq!(response.rcode(), ResponseCode::ServFail);
        assert_eq!(response.id(), query.id());
        assert!(harness.cache.get(1, "down.test.").is_none());
        assert_eq!(harness.stats.snapshot().failed, 1);
        assert_eq!(harness.statuses().await, ["failed"]);
    }

    #[tokio::test]
    async fn questionless_query_is_formerr() {
        let harness = Harness::new(Arc::new(StubResolver::failing()));

        let query = Message::new(umbra_proto::Header::query());
        let response = harness.pipeline.handle(query, client()).await;

        assert_eq!(response.rcode(), ResponseCode::FormErr);
        assert_eq!(harness.statuses().await, Vec::<String>::new());
    }

    #[tokio::test]
    async fn cache_key_is_case_insensitive() {
        let upstream = ResourceRecord::a(
            Name::from_str("ok.test").unwrap(),
            30,
            Ipv4Addr::new(9, 9, 9, 9),
        );
        let resolver = Arc::new(StubResolver::answering(upstream));
        let harness = Harness::new(resolver.clone());

        harness.pipeline.handle(a_query("OK.TEST"), client()).await;
        harness.pipeline.handle(a_query("ok.test"), client()).await;

        assert_eq!(resolver.calls(), 1);
        drop(harness.statuses().await);
    }
}
