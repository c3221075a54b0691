//! Heimdall client facade.
//!
//! # Design
//! `HeimdallClient` holds the base address, a shared [`Transport`] and the
//! process-wide [`Shutdown`] signal. Each method builds its endpoint URL,
//! runs it through [`fetch_with_retry`] with that endpoint's envelope type and
//! unwraps `result`. Event records are paged through with an advancing
//! `from-id` cursor.

use serde::de::DeserializeOwned;
use tracing::info;
use url::Url;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::endpoint::{
    checkpoint_count_url, checkpoint_url, milestone_count_url, milestone_url, span_url,
    state_sync_url, STATE_FETCH_LIMIT,
};
use crate::error::HeimdallError;
use crate::fetch::fetch_with_retry;
use crate::http::{Transport, UreqTransport};
use crate::shutdown::Shutdown;
use crate::types::{
    Checkpoint, CheckpointResponse, CountResponse, EventRecordWithTime, HeimdallSpan, Milestone,
    MilestoneResponse, SpanResponse, StateSyncEventsResponse,
};

/// Resilient client for the Heimdall REST API.
///
/// Every method retries until it succeeds, `ctx` is done, or
/// [`close`](HeimdallClient::close) is called. Pass a context with a deadline
/// unless something else is guaranteed to close the client.
#[derive(Debug)]
pub struct HeimdallClient<R: Transport = UreqTransport> {
    base_url: String,
    transport: R,
    shutdown: Shutdown,
    config: ClientConfig,
}

impl HeimdallClient<UreqTransport> {
    pub fn new(base_url: &str) -> Result<Self, HeimdallError> {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self, HeimdallError> {
        Self::with_transport(base_url, UreqTransport::new(config.request_timeout), config)
    }
}

impl<R: Transport> HeimdallClient<R> {
    /// Fails only if `base_url` does not parse.
    pub fn with_transport(base_url: &str, transport: R, config: ClientConfig) -> Result<Self, HeimdallError> {
        Url::parse(base_url)?;
        Ok(Self {
            base_url: base_url.to_string(),
            transport,
            shutdown: Shutdown::new(),
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &R {
        &self.transport
    }

    /// A handle to this client's shutdown signal. Triggering it has the same
    /// effect on in-flight calls as [`close`](HeimdallClient::close).
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// All event records with id >= `from_id` recorded up to `to` (unix
    /// seconds), sorted by id.
    ///
    /// Pages of [`STATE_FETCH_LIMIT`] are requested until one comes back short
    /// or empty (`204` or a `null` result). Any failure discards the pages
    /// gathered so far.
    pub async fn state_sync_events(
        &self,
        ctx: &Context,
        from_id: u64,
        to: i64,
    ) -> Result<Vec<EventRecordWithTime>, HeimdallError> {
        let mut records = Vec::new();
        let mut from_id = from_id;

        loop {
            let url = state_sync_url(&self.base_url, from_id, to)?;
            info!(query = url.query().unwrap_or_default(), "fetching state sync events");

            let page = match self.fetch_envelope::<StateSyncEventsResponse>(ctx, &url).await? {
                Some(response) => match response.result {
                    Some(page) => page,
                    None => break,
                },
                None => break,
            };

            let short_page = (page.len() as u64) < STATE_FETCH_LIMIT;
            records.extend(page);
            if short_page {
                break;
            }
            from_id = match from_id.checked_add(STATE_FETCH_LIMIT) {
                Some(next) => next,
                // No ids exist past u64::MAX.
                None => break,
            };
        }

        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    pub async fn span(&self, ctx: &Context, span_id: u64) -> Result<HeimdallSpan, HeimdallError> {
        let url = span_url(&self.base_url, span_id)?;
        let response: SpanResponse = self.fetch_required(ctx, &url).await?;
        Ok(response.result)
    }

    /// Latest checkpoint.
    pub async fn fetch_checkpoint(&self, ctx: &Context) -> Result<Checkpoint, HeimdallError> {
        let url = checkpoint_url(&self.base_url)?;
        let response: CheckpointResponse = self.fetch_required(ctx, &url).await?;
        Ok(response.result)
    }

    /// Latest milestone.
    pub async fn fetch_milestone(&self, ctx: &Context) -> Result<Milestone, HeimdallError> {
        let url = milestone_url(&self.base_url)?;
        let response: MilestoneResponse = self.fetch_required(ctx, &url).await?;
        Ok(response.result)
    }

    pub async fn fetch_checkpoint_count(&self, ctx: &Context) -> Result<i64, HeimdallError> {
        let url = checkpoint_count_url(&self.base_url)?;
        let response: CountResponse = self.fetch_required(ctx, &url).await?;
        Ok(response.result.result)
    }

    pub async fn fetch_milestone_count(&self, ctx: &Context) -> Result<i64, HeimdallError> {
        let url = milestone_count_url(&self.base_url)?;
        let response: CountResponse = self.fetch_required(ctx, &url).await?;
        Ok(response.result.result)
    }

    /// Fires the shutdown signal and drops idle connections. Every in-flight
    /// and later call fails with [`HeimdallError::ShutdownDetected`]. Calling
    /// it again is a no-op for the signal.
    pub fn close(&self) {
        self.shutdown.trigger();
        self.transport.close_idle_connections();
    }

    async fn fetch_envelope<T: DeserializeOwned>(&self, ctx: &Context, url: &Url) -> Result<Option<T>, HeimdallError> {
        fetch_with_retry(ctx, &self.transport, url, &self.shutdown, &self.config).await
    }

    /// Like `fetch_envelope`, but a 204 is an error.
    async fn fetch_required<T: DeserializeOwned>(&self, ctx: &Context, url: &Url) -> Result<T, HeimdallError> {
        self.fetch_envelope(ctx, url).await?.ok_or(HeimdallError::NoResponse)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ContextError;
    use crate::http::HttpResponse;
    use crate::test_support::{Scripted, ScriptedTransport};
    use crate::types::Envelope;

    const BASE: &str = "http://heimdall:1317";

    fn client(script: impl IntoIterator<Item = Scripted>) -> HeimdallClient<ScriptedTransport> {
        HeimdallClient::with_transport(BASE, ScriptedTransport::new(script), ClientConfig::default()).unwrap()
    }

    fn record(id: u64) -> EventRecordWithTime {
        EventRecordWithTime {
            id,
            contract: "0x0000000000000000000000000000000000001001".to_string(),
            data: "0x".to_string(),
            tx_hash: format!("0x{id:064x}"),
            log_index: id % 4,
            bor_chain_id: "15001".to_string(),
            record_time: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn page(ids: impl IntoIterator<Item = u64>) -> Scripted {
        let envelope = Envelope {
            height: "1".to_string(),
            result: Some(ids.into_iter().map(record).collect::<Vec<_>>()),
        };
        Scripted::ok(serde_json::to_string(&envelope).unwrap())
    }

    fn from_ids(urls: &[Url]) -> Vec<u64> {
        urls.iter()
            .map(|url| {
                url.query_pairs()
                    .find(|(k, _)| k == "from-id")
                    .map(|(_, v)| v.parse().unwrap())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let err = HeimdallClient::with_transport("::nope", ScriptedTransport::new(Vec::new()), ClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, HeimdallError::InvalidUrl(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_stops_on_short_page_and_sorts() {
        // Each page is served in reverse order.
        let client = client([
            page((1..=50).rev()),
            page((51..=100).rev()),
            page((101..=110).rev()),
        ]);

        let records = client.state_sync_events(&Context::background(), 1, 1_700_000_000).await.unwrap();

        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=110).collect::<Vec<_>>());

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(from_ids(&requests), vec![1, 51, 101]);
        assert!(requests.iter().all(|url| url.path() == "/clerk/event-record/list"));
        assert!(requests[0].as_str().ends_with("to-time=1700000000&limit=50"));
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_on_no_content_returns_empty() {
        let client = client([Scripted::Respond(HttpResponse::no_content())]);

        let records = client.state_sync_events(&Context::background(), 7, 100).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_on_null_result_stops() {
        let client = client([page(1..=50), Scripted::ok(r#"{"height":"1","result":null}"#)]);

        let records = client.state_sync_events(&Context::background(), 1, 100).await.unwrap();

        assert_eq!(records.len(), 50);
        assert_eq!(client.transport().requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_stops_at_the_end_of_the_id_space() {
        let start = u64::MAX - 10;
        let client = client([page(start - 39..=u64::MAX), Scripted::Respond(HttpResponse::no_content())]);

        let records = client.state_sync_events(&Context::background(), start, 100).await.unwrap();

        assert_eq!(records.len(), 50);
        assert_eq!(records.last().unwrap().id, u64::MAX);
        assert_eq!(from_ids(&client.transport().requests()), vec![start]);
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_failure_discards_partial_results() {
        let client = client([page(1..=50), Scripted::status(503)]);
        let ctx = Context::background().with_timeout(Duration::from_secs(12));

        let err = client.state_sync_events(&ctx, 1, 100).await.unwrap_err();

        assert!(matches!(err, HeimdallError::Context(ContextError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_retries_a_failed_page_in_place() {
        let client = client([page(1..=50), Scripted::Refuse, page(51..=60)]);

        let records = client.state_sync_events(&Context::background(), 1, 100).await.unwrap();

        assert_eq!(records.len(), 60);
        assert_eq!(from_ids(&client.transport().requests()), vec![1, 51, 51]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_resources_unwrap_result() {
        let client = client([
            Scripted::ok(r#"{"height":"5","result":{"result":42}}"#),
            Scripted::ok(
                r#"{"height":"5","result":{"proposer":"0x01","start_block":0,"end_block":512,"root_hash":"0x02","bor_chain_id":"15001","timestamp":0}}"#,
            ),
            Scripted::ok(r#"{"height":"5","result":{"span_id":9,"start_block":1,"end_block":2,"bor_chain_id":"137"}}"#),
        ]);
        let ctx = Context::background();

        assert_eq!(client.fetch_milestone_count(&ctx).await.unwrap(), 42);
        let milestone = client.fetch_milestone(&ctx).await.unwrap();
        assert_eq!(milestone.end_block, 512);
        let span = client.span(&ctx, 9).await.unwrap();
        assert_eq!(span.span_id, 9);

        let paths: Vec<String> = client.transport().requests().iter().map(|u| u.path().to_string()).collect();
        assert_eq!(paths, vec!["/milestone/count", "/milestone", "/bor/span/9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_resource_no_content_is_no_response() {
        let client = client([Scripted::Respond(HttpResponse::no_content())]);

        let err = client.fetch_checkpoint(&Context::background()).await.unwrap_err();

        assert!(matches!(err, HeimdallError::NoResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn close_abandons_a_stalled_request() {
        let client = std::sync::Arc::new(client([Scripted::Stall(Duration::from_secs(30))]));

        let in_flight = {
            let client = std::sync::Arc::clone(&client);
            tokio::spawn(async move { client.fetch_checkpoint_count(&Context::background()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        client.close();

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, HeimdallError::ShutdownDetected));
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_aborts_in_flight_and_future_calls() {
        let client = std::sync::Arc::new(client([Scripted::status(500)]));

        let in_flight = {
            let client = std::sync::Arc::clone(&client);
            tokio::spawn(async move { client.fetch_checkpoint_count(&Context::background()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        client.close();
        client.close();

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, HeimdallError::ShutdownDetected));

        let err = client.fetch_milestone(&Context::background()).await.unwrap_err();
        assert!(matches!(err, HeimdallError::ShutdownDetected));

        assert_eq!(client.transport().idle_closes(), 2);
        assert!(client.shutdown_signal().is_triggered());
    }
}
