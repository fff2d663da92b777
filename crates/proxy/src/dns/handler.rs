use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use futures::FutureExt;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::RecordType;
use tracing::{debug, error, warn};

use crate::dns::metrics::ServerMetrics;
use crate::dns::table::RecordTable;
use crate::dns::upstream::Upstream;

/// Serves one DNS query against the currently published record table,
/// delegating misses and unsupported types to the upstream resolver.
///
/// Safe to invoke concurrently: the only shared state is the published
/// table reference, read with a single atomic load per query.
pub struct QueryHandler {
    table: Arc<ArcSwap<RecordTable>>,
    upstream: Arc<dyn Upstream>,
    metrics: Arc<ServerMetrics>,
}

impl QueryHandler {
    pub fn new(
        table: Arc<ArcSwap<RecordTable>>,
        upstream: Arc<dyn Upstream>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            table,
            upstream,
            metrics,
        }
    }

    /// Serves one datagram and returns the wire bytes of the response.
    ///
    /// Internal faults never escape: a panic anywhere on the query path is
    /// converted into a SERVFAIL response. `None` is returned only when no
    /// response is possible at all (undecodable query, encode failure).
    pub async fn handle(&self, buf: &[u8]) -> Option<Vec<u8>> {
        let query = match Message::from_vec(buf) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Dropping undecodable datagram");
                return None;
            }
        };

        let start = Instant::now();
        let response = match AssertUnwindSafe(self.answer(&query)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                error!(id = query.id(), "Query handling panicked; answering SERVFAIL");
                servfail(&query)
            }
        };
        self.metrics.observe_request(start.elapsed().as_secs_f64());

        encode(response)
    }

    async fn answer(&self, query: &Message) -> Message {
        let questions = query.queries();
        if questions.len() > 1 {
            // Deliberate contract: resolvers send one question per query.
            warn!(
                count = questions.len(),
                "Multiple questions in query; only the first is honored"
            );
        }

        let Some(question) = questions.first() else {
            debug!(id = query.id(), "Query without question; forwarding upstream");
            return self.forward(query).await;
        };

        let query_type = question.query_type();
        if matches!(query_type, RecordType::A | RecordType::AAAA) {
            let table = self.table.load();
            if let Some(entry) = table.lookup(query_type, question.name()) {
                debug!(
                    domain = %question.name(),
                    record_type = ?query_type,
                    answers = entry.records.len(),
                    "Local table hit"
                );
                let mut response = reply_to(query);
                response
                    .set_authoritative(true)
                    .set_response_code(entry.rcode)
                    .add_answers(entry.records.iter().cloned());
                return response;
            }
        }

        self.forward(query).await
    }

    async fn forward(&self, query: &Message) -> Message {
        let start = Instant::now();
        let result = self.upstream.forward(query).await;
        self.metrics
            .observe_upstream_request(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_upstream_failure();
                warn!(id = query.id(), error = %e, "Upstream query failed; answering SERVFAIL");
                servfail(query)
            }
        }
    }
}

fn reply_to(query: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .add_queries(query.queries().iter().cloned());
    response
}

fn servfail(query: &Message) -> Message {
    let mut response = reply_to(query);
    response.set_response_code(ResponseCode::ServFail);
    response
}

fn encode(message: Message) -> Option<Vec<u8>> {
    match message.to_vec() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(error = %e, "Failed to encode DNS response");
            None
        }
    }
}
