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

//! In-process doubles of the consumed interfaces, for driving a group-0
//! "cluster" inside one test: a committed log with per-node lag, a recording
//! schema merger and a direct-call migration peer.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use common_base::tokio;
use common_base::tokio::sync::Mutex;
use common_base::tokio::sync::Notify;
use common_base::GlobalSequence;
use common_exception::ErrorCode;
use common_exception::Result;
use common_group0_store::GroupConfig;
use common_group0_types::GroupSnapshot;
use common_group0_types::NodeId;
use common_group0_types::SchemaMutation;

use crate::AbortSignal;
use crate::Group0;
use crate::GroupStateMachine;
use crate::LogError;
use crate::LogResult;
use crate::MigrationPeer;
use crate::ReplicatedLog;
use crate::SchemaMerger;

struct LogNode {
    sm: Option<GroupStateMachine>,
    applied: usize,
    paused: bool,
}

struct LogState {
    entries: Vec<Vec<u8>>,
    nodes: Vec<LogNode>,
}

/// An in-process replicated log: entries commit in call order; `add_entry`
/// waits until the entry is applied on the submitting node, like the real
/// log's `wait=applied`. Other nodes catch up lazily, on their own next
/// barrier or submission, so a remote proposer holding its apply lock never
/// stalls a commit.
///
/// A paused node stops applying, which is how tests make a node lag for
/// barrier and snapshot scenarios. `inject_error` makes the next `add_entry`
/// fail the way a real log does: a `DroppedEntry` fails before committing, a
/// `CommitStatusUnknown` fails after the entry actually committed.
pub struct LoopbackLog {
    state: Mutex<LogState>,
    commit_notify: Notify,
    inject: StdMutex<VecDeque<LogError>>,
}

impl LoopbackLog {
    pub fn new() -> Arc<LoopbackLog> {
        Arc::new(LoopbackLog {
            state: Mutex::new(LogState {
                entries: vec![],
                nodes: vec![],
            }),
            commit_notify: Notify::new(),
            inject: StdMutex::new(VecDeque::new()),
        })
    }

    /// Allocate the next node slot. The returned index is the one to pass to
    /// `handle` and `register`.
    pub async fn reserve(&self) -> usize {
        let mut st = self.state.lock().await;
        st.nodes.push(LogNode {
            sm: None,
            applied: 0,
            paused: false,
        });
        st.nodes.len() - 1
    }

    pub fn handle(self: &Arc<Self>, node: usize) -> LoopbackHandle {
        LoopbackHandle {
            log: self.clone(),
            node,
        }
    }

    pub async fn register(&self, node: usize, sm: GroupStateMachine) {
        let mut st = self.state.lock().await;
        st.nodes[node].sm = Some(sm);
    }

    pub fn inject_error(&self, e: LogError) {
        self.inject.lock().unwrap().push_back(e);
    }

    pub async fn pause(&self, node: usize) {
        let mut st = self.state.lock().await;
        st.nodes[node].paused = true;
    }

    /// Un-pause and catch the node up with everything committed meanwhile.
    pub async fn resume(&self, node: usize) -> Result<()> {
        {
            let mut st = self.state.lock().await;
            st.nodes[node].paused = false;
            Self::catch_up(&mut st, node)
                .await
                .map_err(|e| ErrorCode::GroupLogError(e.to_string()))?;
        }
        self.commit_notify.notify_waiters();
        Ok(())
    }

    pub async fn entries_len(&self) -> usize {
        let st = self.state.lock().await;
        st.entries.len()
    }

    fn take_injected(&self) -> Option<LogError> {
        self.inject.lock().unwrap().pop_front()
    }

    async fn commit_and_apply(&self, entry: Vec<u8>, node: usize) -> LogResult<()> {
        {
            let mut st = self.state.lock().await;
            st.entries.push(entry);

            if !st.nodes[node].paused {
                Self::catch_up(&mut st, node).await?;
            }
        }
        self.commit_notify.notify_waiters();
        Ok(())
    }

    async fn catch_up(st: &mut LogState, node: usize) -> LogResult<()> {
        let sm = match &st.nodes[node].sm {
            None => return Ok(()),
            Some(sm) => sm.clone(),
        };

        let from = st.nodes[node].applied;
        if from >= st.entries.len() {
            return Ok(());
        }

        let batch = st.entries[from..].to_vec();
        st.nodes[node].applied = st.entries.len();

        sm.apply(batch)
            .await
            .map_err(|e| LogError::Storage(e.message()))?;

        Ok(())
    }

    async fn barrier(&self, node: usize, abort: &AbortSignal) -> LogResult<()> {
        loop {
            let notified = self.commit_notify.notified();

            {
                let mut st = self.state.lock().await;
                if !st.nodes[node].paused {
                    Self::catch_up(&mut st, node).await?;
                    return Ok(());
                }
            }

            tokio::select! {
                _ = abort.wait() => return Err(LogError::Aborted),
                _ = notified => {}
            }
        }
    }
}

/// One node's face of the `LoopbackLog`.
pub struct LoopbackHandle {
    log: Arc<LoopbackLog>,
    node: usize,
}

#[async_trait]
impl ReplicatedLog for LoopbackHandle {
    async fn add_entry(&self, entry: Vec<u8>, abort: &AbortSignal) -> LogResult<()> {
        if abort.is_aborted() {
            return Err(LogError::Aborted);
        }

        if let Some(err) = self.log.take_injected() {
            return match err {
                LogError::CommitStatusUnknown => {
                    // The entry did commit; only the reply was lost.
                    self.log.commit_and_apply(entry, self.node).await?;
                    Err(LogError::CommitStatusUnknown)
                }
                e => Err(e),
            };
        }

        self.log.commit_and_apply(entry, self.node).await
    }

    async fn read_barrier(&self, abort: &AbortSignal) -> LogResult<()> {
        self.log.barrier(self.node, abort).await
    }
}

/// A schema-merge engine that records every merge it is asked to do and can
/// serve the union back as the canonical schema.
pub struct RecordingMerger {
    merges: StdMutex<Vec<(String, Vec<SchemaMutation>)>>,
}

impl RecordingMerger {
    pub fn new() -> Arc<RecordingMerger> {
        Arc::new(RecordingMerger {
            merges: StdMutex::new(vec![]),
        })
    }

    pub fn merges(&self) -> Vec<(String, Vec<SchemaMutation>)> {
        self.merges.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaMerger for RecordingMerger {
    async fn merge_schema_from(&self, origin: &str, mutations: &[SchemaMutation]) -> Result<()> {
        let mut m = self.merges.lock().unwrap();
        m.push((origin.to_string(), mutations.to_vec()));
        Ok(())
    }

    async fn schema_mutations(&self) -> Result<Vec<SchemaMutation>> {
        let m = self.merges.lock().unwrap();
        Ok(m.iter().flat_map(|(_o, muts)| muts.clone()).collect())
    }
}

/// Serves migration-request pulls by calling the target node's state machine
/// directly.
pub struct LoopbackPeers {
    nodes: StdMutex<HashMap<NodeId, GroupStateMachine>>,
}

impl LoopbackPeers {
    pub fn new() -> Arc<LoopbackPeers> {
        Arc::new(LoopbackPeers {
            nodes: StdMutex::new(HashMap::new()),
        })
    }

    pub fn register(&self, node_id: NodeId, sm: GroupStateMachine) {
        self.nodes.lock().unwrap().insert(node_id, sm);
    }
}

#[async_trait]
impl MigrationPeer for LoopbackPeers {
    async fn pull_group0_snapshot(&self, from: NodeId) -> Result<GroupSnapshot> {
        let sm = {
            let nodes = self.nodes.lock().unwrap();
            nodes
                .get(&from)
                .cloned()
                .ok_or_else(|| ErrorCode::Internal(format!("no such peer: {}", from)))?
        };

        sm.group0_snapshot().await
    }
}

/// One test node: a coordinator wired to shared loopback collaborators.
pub struct GroupTestContext {
    pub config: GroupConfig,
    pub group0: Group0,
    pub schema: Arc<RecordingMerger>,
    pub node: usize,
}

/// Build a node on the shared log and peer set. Each node gets its own sled
/// tree; the process-wide temp sled db is initialized on first use.
pub async fn new_test_node(
    log: &Arc<LoopbackLog>,
    peers: &Arc<LoopbackPeers>,
    node_id: NodeId,
    enabled: bool,
) -> Result<GroupTestContext> {
    let temp_dir = tempfile::tempdir().map_err(ErrorCode::from)?;
    common_group0_sled_store::init_temp_sled_db(temp_dir);

    let mut config = GroupConfig::empty();
    config.id = node_id;
    config.broadcast_address = format!("127.0.0.1:{}", 28004 + node_id);
    config.no_sync = true;
    config.sled_tree_prefix = format!("ut-group0-{}-{}-", node_id, GlobalSequence::next());

    let schema = RecordingMerger::new();

    let node = log.reserve().await;
    let handle = Arc::new(log.handle(node));

    let group0 = Group0::try_new(
        config.clone(),
        handle,
        schema.clone(),
        peers.clone(),
        enabled,
    )?;

    log.register(node, group0.state_machine()).await;
    peers.register(node_id, group0.state_machine());

    Ok(GroupTestContext {
        config,
        group0,
        schema,
        node,
    })
}

/// A schema mutation the tests move around.
pub fn sample_mutation(stmt: impl Into<String>) -> SchemaMutation {
    SchemaMutation {
        table: "system_schema.tables".to_string(),
        payload: stmt.into().into_bytes(),
        timestamp: 0,
    }
}
