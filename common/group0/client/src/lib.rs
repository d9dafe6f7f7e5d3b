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

//! The group-0 linearization core.
//!
//! Cluster-wide metadata mutations are funneled through a replicated log so
//! that every node applies the same changes in the same order. A proposer
//! builds its mutation against local, only eventually consistent state; the
//! optimistic state-id chain recorded in the history table turns the log's
//! arbitrary commit order back into one serial execution.

#[cfg(test)]
#[macro_use]
extern crate common_tracing;

#[cfg(test)]
mod group0_test;

mod abort;
mod compiler;
mod group0;
mod guard;
mod log;
mod schema;
mod snapshot;
mod state_machine;

pub mod testing;

pub use abort::AbortHandle;
pub use abort::AbortSignal;
pub use compiler::compile_select;
pub use compiler::compile_update;
pub use compiler::RelOp;
pub use compiler::Restriction;
pub use compiler::SelectStatement;
pub use compiler::UpdateStatement;
pub use group0::Group0;
pub use guard::Guard;
pub use log::LogError;
pub use log::LogResult;
pub use log::ReplicatedLog;
pub use schema::SchemaMerger;
pub use snapshot::MigrationPeer;
pub use state_machine::GroupStateMachine;
