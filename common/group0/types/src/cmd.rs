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

use common_exception::ErrorCode;
use common_exception::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::HistoryMutation;
use crate::KvQuery;
use crate::SchemaMutation;
use crate::StateId;

pub type NodeId = u64;

/// The state change a command carries.
///
/// Decoding rejects unknown tags, so a node never half-applies a command
/// written by a newer version it does not understand.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum GroupChange {
    SchemaBatch(Vec<SchemaMutation>),
    KvQuery(KvQuery),
}

/// The payload unit crossing the replicated log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Command {
    pub change: GroupChange,

    /// Records `new_state_id` into the history table; always the last write
    /// of an apply.
    pub history_append: HistoryMutation,

    /// When present, apply is conditional on this being the current last
    /// history entry. Absent means an unconditional apply.
    pub prev_state_id: Option<StateId>,

    pub new_state_id: StateId,

    /// Broadcast address of the proposing node, handed to the schema-merge
    /// engine as the mutation origin.
    pub creator_addr: String,

    pub creator_node_id: NodeId,
}

impl Command {
    /// Serialize for the log. The format is plain serde_json over the tagged
    /// enums above: stable across versions that only add variants.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let x = serde_json::to_vec(self)?;
        Ok(x)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Command> {
        serde_json::from_slice(bytes)
            .map_err(|e| ErrorCode::BadBytes(format!("can not decode group-0 command: {}", e)))
    }
}
