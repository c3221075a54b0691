use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub proposer: String,
    pub start_block: u64,
    pub end_block: u64,
    pub root_hash: String,
    pub bor_chain_id: String,
    pub timestamp: u64,
}

pub type Milestone = Checkpoint;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validator {
    #[serde(rename = "ID")]
    pub id: u64,
    pub signer: String,
    pub power: i64,
    pub accum: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorSet {
    pub validators: Vec<Validator>,
    pub proposer: Option<Validator>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub span_id: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub validator_set: ValidatorSet,
    pub selected_producers: Vec<Validator>,
    pub bor_chain_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub id: u64,
    pub contract: String,
    pub data: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub bor_chain_id: String,
    pub record_time: String,
    /// Unix seconds used for the `to-time` filter.
    #[serde(skip)]
    pub unix_time: i64,
}

#[derive(Serialize)]
struct Envelope<T> {
    height: String,
    result: T,
}

#[derive(Serialize)]
struct Count {
    result: i64,
}

#[derive(Deserialize)]
pub struct EventQuery {
    #[serde(rename = "from-id")]
    pub from_id: u64,
    #[serde(rename = "to-time")]
    pub to_time: i64,
    pub limit: usize,
}

#[derive(Debug, Default)]
struct Store {
    height: u64,
    checkpoint: Option<Checkpoint>,
    milestone: Option<Milestone>,
    checkpoint_count: i64,
    milestone_count: i64,
    spans: HashMap<u64, Span>,
    events: Vec<EventRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Status to answer with while `remaining` is non-zero. `None` means forever.
    status: Option<(u16, Option<u32>)>,
    delay: Duration,
}

/// In-memory Heimdall plus knobs for injecting failures.
#[derive(Debug, Default)]
pub struct MockState {
    store: RwLock<Store>,
    faults: Mutex<Faults>,
    hits: Mutex<HashMap<String, usize>>,
}

pub type Shared = Arc<MockState>;

impl MockState {
    pub fn new() -> Shared {
        Arc::new(Self::default())
    }

    /// A store with a checkpoint, a milestone, three spans and 120 events.
    pub fn demo() -> Shared {
        let state = Self::new();
        state.set_height(1_000);
        state.set_checkpoint(checkpoint(0, 511));
        state.set_milestone(checkpoint(512, 527));
        state.set_counts(1, 1);
        for id in 0..3 {
            state.insert_span(span(id));
        }
        state.push_events((1..=120).map(|id| event(id, 1_700_000_000 + id as i64)));
        state
    }

    pub fn set_height(&self, height: u64) {
        self.write().height = height;
    }

    pub fn set_checkpoint(&self, checkpoint: Checkpoint) {
        self.write().checkpoint = Some(checkpoint);
    }

    pub fn set_milestone(&self, milestone: Milestone) {
        self.write().milestone = Some(milestone);
    }

    pub fn set_counts(&self, checkpoints: i64, milestones: i64) {
        let mut store = self.write();
        store.checkpoint_count = checkpoints;
        store.milestone_count = milestones;
    }

    pub fn insert_span(&self, span: Span) {
        self.write().spans.insert(span.span_id, span);
    }

    pub fn push_events(&self, events: impl IntoIterator<Item = EventRecord>) {
        self.write().events.extend(events);
    }

    /// Answer the next `n` requests with `status`.
    pub fn fail_next(&self, n: u32, status: u16) {
        self.faults().status = Some((status, Some(n)));
    }

    /// Answer every request with `status` until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, status: u16) {
        self.faults().status = Some((status, None));
    }

    /// Hold every request for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.faults().delay = delay;
    }

    pub fn clear_faults(&self) {
        *self.faults() = Faults::default();
    }

    /// Requests received for `path`, failed ones included.
    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the hit and decides whether to fail it.
    fn admit(&self, path: &str) -> (Duration, Option<u16>) {
        *self
            .hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default() += 1;

        let mut faults = self.faults();
        let failure = match &mut faults.status {
            Some((status, None)) => Some(*status),
            Some((status, Some(remaining))) if *remaining > 0 => {
                *remaining -= 1;
                Some(*status)
            }
            _ => None,
        };
        (faults.delay, failure)
    }
}

pub fn checkpoint(start_block: u64, end_block: u64) -> Checkpoint {
    Checkpoint {
        proposer: "0x0000000000000000000000000000000000000001".to_string(),
        start_block,
        end_block,
        root_hash: format!("0x{end_block:064x}"),
        bor_chain_id: "15001".to_string(),
        timestamp: 1_700_000_000 + end_block,
    }
}

pub fn span(span_id: u64) -> Span {
    let validator = Validator {
        id: 1,
        signer: "0x0000000000000000000000000000000000000001".to_string(),
        power: 100,
        accum: 0,
    };
    Span {
        span_id,
        start_block: span_id * 6400,
        end_block: span_id * 6400 + 6399,
        validator_set: ValidatorSet {
            validators: vec![validator.clone()],
            proposer: Some(validator.clone()),
        },
        selected_producers: vec![validator],
        bor_chain_id: "15001".to_string(),
    }
}

pub fn event(id: u64, unix_time: i64) -> EventRecord {
    EventRecord {
        id,
        contract: "0x0000000000000000000000000000000000001001".to_string(),
        data: format!("0x{id:02x}"),
        tx_hash: format!("0x{id:064x}"),
        log_index: 0,
        bor_chain_id: "15001".to_string(),
        record_time: unix_time.to_string(),
        unix_time,
    }
}

pub fn app() -> Router {
    app_with_state(MockState::new())
}

pub fn app_with_state(state: Shared) -> Router {
    Router::new()
        .route("/checkpoints/latest", get(latest_checkpoint))
        .route("/checkpoints/count", get(checkpoint_count))
        .route("/milestone", get(latest_milestone))
        .route("/milestone/count", get(milestone_count))
        .route("/bor/span/{id}", get(get_span))
        .route("/clerk/event-record/list", get(list_events))
        .layer(middleware::from_fn_with_state(state.clone(), inject_faults))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: Shared) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock heimdall listening");
    }
    axum::serve(listener, app_with_state(state)).await
}

async fn inject_faults(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let (delay, failure) = state.admit(&path);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if let Some(status) = failure {
        debug!(%path, status, "injecting failure");
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }
    next.run(request).await
}

fn envelope<T: Serialize>(store: &Store, result: T) -> Json<Envelope<T>> {
    Json(Envelope {
        height: store.height.to_string(),
        result,
    })
}

async fn latest_checkpoint(State(state): State<Shared>) -> Response {
    let store = state.read();
    match &store.checkpoint {
        Some(checkpoint) => envelope(&store, checkpoint.clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn latest_milestone(State(state): State<Shared>) -> Response {
    let store = state.read();
    match &store.milestone {
        Some(milestone) => envelope(&store, milestone.clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn checkpoint_count(State(state): State<Shared>) -> Response {
    let store = state.read();
    envelope(&store, Count { result: store.checkpoint_count }).into_response()
}

async fn milestone_count(State(state): State<Shared>) -> Response {
    let store = state.read();
    envelope(&store, Count { result: store.milestone_count }).into_response()
}

async fn get_span(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    let store = state.read();
    match store.spans.get(&id) {
        Some(span) => envelope(&store, span.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Records with `id >= from-id` and time `<= to-time`, ascending, at most
/// `limit`. Answers 204 when nothing matches.
async fn list_events(State(state): State<Shared>, Query(query): Query<EventQuery>) -> Response {
    let store = state.read();
    let mut page: Vec<EventRecord> = store
        .events
        .iter()
        .filter(|e| e.id >= query.from_id && e.unix_time <= query.to_time)
        .cloned()
        .collect();
    page.sort_by_key(|e| e.id);
    page.truncate(query.limit);

    if page.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    envelope(&store, page).into_response()
}
