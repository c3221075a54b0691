//! Response envelopes and payload DTOs for the Heimdall API.
//!
//! # Design
//! The fetch engine never looks inside these types; it only cares whether a
//! body decodes. They mirror the JSON Heimdall emits and are defined
//! independently from the mock-server crate, so integration tests catch
//! schema drift between the two.

use serde::{Deserialize, Serialize};

/// Wrapper every Heimdall endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope<T> {
    pub height: String,
    pub result: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub proposer: String,
    pub start_block: u64,
    pub end_block: u64,
    pub root_hash: String,
    pub bor_chain_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Milestone {
    pub proposer: String,
    pub start_block: u64,
    pub end_block: u64,
    pub root_hash: String,
    pub bor_chain_id: String,
    pub timestamp: u64,
}

/// Body of the `/count` endpoints: `{"result": n}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Count {
    pub result: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validator {
    #[serde(rename = "ID")]
    pub id: u64,
    pub signer: String,
    pub power: i64,
    #[serde(default)]
    pub accum: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ValidatorSet {
    #[serde(default)]
    pub validators: Vec<Validator>,
    #[serde(default)]
    pub proposer: Option<Validator>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeimdallSpan {
    pub span_id: u64,
    pub start_block: u64,
    pub end_block: u64,
    #[serde(default)]
    pub validator_set: ValidatorSet,
    #[serde(default)]
    pub selected_producers: Vec<Validator>,
    pub bor_chain_id: String,
}

/// A state-sync event record plus the time Heimdall recorded it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecordWithTime {
    pub id: u64,
    pub contract: String,
    pub data: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub bor_chain_id: String,
    pub record_time: String,
}

pub type CheckpointResponse = Envelope<Checkpoint>;
pub type MilestoneResponse = Envelope<Milestone>;
pub type CountResponse = Envelope<Count>;
pub type SpanResponse = Envelope<HeimdallSpan>;
/// `result` may be `null` once the cursor is past the last record.
pub type StateSyncEventsResponse = Envelope<Option<Vec<EventRecordWithTime>>>;
