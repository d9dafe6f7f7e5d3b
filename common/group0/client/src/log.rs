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

use async_trait::async_trait;

use crate::AbortSignal;

pub type LogResult<T> = std::result::Result<T, LogError>;

/// How the replicated log can fail an `add_entry` or `read_barrier` call.
///
/// `DroppedEntry` and `CommitStatusUnknown` are transient and retried inside
/// the submission engine; everything else surfaces to the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("the log dropped the entry without committing it")]
    DroppedEntry,

    #[error("the leader does not know whether the entry committed")]
    CommitStatusUnknown,

    #[error("this node is not the log leader")]
    NotALeader,

    #[error("the operation was aborted")]
    Aborted,

    #[error("log storage error: {0}")]
    Storage(String),
}

/// The consumed face of the underlying replicated log (raft).
///
/// Leader forwarding is assumed to be enabled: a healthy log never answers
/// `NotALeader` to a forwarded entry.
#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    /// Append an opaque entry and wait until it is applied on this node's
    /// state machine.
    async fn add_entry(&self, entry: Vec<u8>, abort: &AbortSignal) -> LogResult<()>;

    /// Wait until this node has applied every entry committed before the
    /// call.
    async fn read_barrier(&self, abort: &AbortSignal) -> LogResult<()>;
}
