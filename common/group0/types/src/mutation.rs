// Copyright 2021 Datafuse Labs.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Deserialize;
use serde::Serialize;

use crate::StateId;

pub const GROUP0_HISTORY_TABLE: &str = "system.group0_history";
pub const GROUP0_KV_STORE_TABLE: &str = "system.group0_kv_store";

/// One canonical schema mutation, opaque to group 0.
///
/// The schema-merge engine produces and consumes the payload; group 0 only
/// re-stamps the write timestamp so that every mutation of a command carries
/// the timestamp embedded in the command's state id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SchemaMutation {
    /// `keyspace.table` the mutation targets.
    pub table: String,
    pub payload: Vec<u8>,
    pub timestamp: i64,
}

impl SchemaMutation {
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// One row of `system.group0_history`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub description: String,
    pub gc_after_secs: u64,
}

/// The pending write that records a state id into the history table.
///
/// Building one does not touch storage; it is persisted by the command
/// pipeline as the last write of an apply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryMutation {
    pub state_id: StateId,
    pub row: HistoryRow,
}

/// Payload of a group-0 snapshot pull, piggybacked on the schema migration
/// request. A peer that speaks the group-0 protocol must fill both parts.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub schema: Option<Vec<SchemaMutation>>,
    pub history: Option<HistoryMutation>,
}
