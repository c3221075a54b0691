//! URL builders for the Heimdall REST endpoints.
//!
//! Every builder replaces the base address's path and query wholesale, so a
//! base of `http://host/anything?x=1` still yields `http://host/<endpoint>`.

use url::Url;

use crate::error::HeimdallError;

/// Page size for the event-record endpoint.
pub const STATE_FETCH_LIMIT: u64 = 50;

const STATE_SYNC_EVENTS_PATH: &str = "clerk/event-record/list";
const CHECKPOINT_PATH: &str = "/checkpoints/latest";
const CHECKPOINT_COUNT_PATH: &str = "/checkpoints/count";
const MILESTONE_PATH: &str = "/milestone";
const MILESTONE_COUNT_PATH: &str = "/milestone/count";

pub fn make_url(base: &str, path: &str, query: &str) -> Result<Url, HeimdallError> {
    let mut url = Url::parse(base)?;
    url.set_path(path);
    url.set_query(if query.is_empty() { None } else { Some(query) });
    Ok(url)
}

pub fn span_url(base: &str, span_id: u64) -> Result<Url, HeimdallError> {
    make_url(base, &format!("bor/span/{span_id}"), "")
}

pub fn state_sync_url(base: &str, from_id: u64, to: i64) -> Result<Url, HeimdallError> {
    let query = format!("from-id={from_id}&to-time={to}&limit={STATE_FETCH_LIMIT}");
    make_url(base, STATE_SYNC_EVENTS_PATH, &query)
}

pub fn checkpoint_url(base: &str) -> Result<Url, HeimdallError> {
    make_url(base, CHECKPOINT_PATH, "")
}

pub fn checkpoint_count_url(base: &str) -> Result<Url, HeimdallError> {
    make_url(base, CHECKPOINT_COUNT_PATH, "")
}

pub fn milestone_url(base: &str) -> Result<Url, HeimdallError> {
    make_url(base, MILESTONE_PATH, "")
}

pub fn milestone_count_url(base: &str) -> Result<Url, HeimdallError> {
    make_url(base, MILESTONE_COUNT_PATH, "")
}
