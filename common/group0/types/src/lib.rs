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

//! This crate defines the data types that travel through the group-0
//! replicated log, and the state-ID scheme that orders them.


mod cmd;
mod kv_query;
mod mutation;
mod state_id;

pub use cmd::Command;
pub use cmd::GroupChange;
pub use cmd::NodeId;
pub use kv_query::KvQuery;
pub use kv_query::KvResult;
pub use mutation::GroupSnapshot;
pub use mutation::HistoryMutation;
pub use mutation::HistoryRow;
pub use mutation::SchemaMutation;
pub use mutation::GROUP0_HISTORY_TABLE;
pub use mutation::GROUP0_KV_STORE_TABLE;
pub use state_id::StateId;
