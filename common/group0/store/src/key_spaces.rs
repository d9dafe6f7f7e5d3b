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

use common_group0_sled_store::SledKeySpace;
use common_group0_types::HistoryRow;
use common_group0_types::StateId;
use serde::Deserialize;
use serde::Serialize;

/// `system.group0_history`: the append-only chain of applied state ids.
/// Key order is state-id order, thus `last()` is the current state.
pub struct History {}
impl SledKeySpace for History {
    const PREFIX: u8 = 1;
    const NAME: &'static str = "history";
    type K = StateId;
    type V = HistoryRow;
}

/// One stored cell of `system.group0_kv_store`: the value of the single
/// clustering row, with its write timestamp.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KvRow {
    pub value: Vec<u8>,
    pub timestamp: i64,
}

/// `system.group0_kv_store`: one row per opaque key.
pub struct KvStore {}
impl SledKeySpace for KvStore {
    const PREFIX: u8 = 2;
    const NAME: &'static str = "kv_store";
    type K = Vec<u8>;
    type V = KvRow;
}
