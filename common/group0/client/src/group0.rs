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

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use common_base::tokio;
use common_base::tokio::sync::Mutex;
use common_base::tokio::sync::OwnedMutexGuard;
use common_exception::ErrorCode;
use common_exception::Result;
use common_group0_store::GroupConfig;
use common_group0_store::StateMachine;
use common_group0_types::Command;
use common_group0_types::GroupChange;
use common_group0_types::KvQuery;
use common_group0_types::KvResult;
use common_group0_types::SchemaMutation;
use common_group0_types::StateId;
use common_tracing::tracing;
use lazy_static::lazy_static;

use crate::AbortSignal;
use crate::Guard;
use crate::GroupStateMachine;
use crate::LogError;
use crate::MigrationPeer;
use crate::ReplicatedLog;
use crate::SchemaMerger;

/// Pending query results are kept for remote commands too; cap the map so
/// they cannot grow it without bound.
const QUERY_RESULT_CAP: usize = 1024;

lazy_static! {
    /// Tree names with a live coordinator, to refuse a second coordinator
    /// over the same state.
    static ref COORDINATORS: StdMutex<HashSet<String>> = StdMutex::new(HashSet::new());
}

pub(crate) struct GroupInner {
    pub config: GroupConfig,
    pub log: Arc<dyn ReplicatedLog>,
    pub sm: StateMachine,
    pub schema: Arc<dyn SchemaMerger>,
    pub peers: Arc<dyn MigrationPeer>,

    /// Serializes local proposers; held for a whole proposal.
    pub operation_lock: Arc<Mutex<()>>,

    /// Mutual exclusion between guard issuance, command application and
    /// snapshot installation.
    pub apply_lock: Arc<Mutex<()>>,

    /// Side channel: query results of applied commands, by state id.
    pub results: StdMutex<BTreeMap<StateId, KvResult>>,

    /// False selects the legacy path: guards carry no locks and no observed
    /// state.
    pub enabled: bool,

    tree_name: String,
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        let mut reg = COORDINATORS.lock().unwrap();
        reg.remove(&self.tree_name);
    }
}

impl GroupInner {
    pub fn put_query_result(&self, state_id: StateId, result: KvResult) {
        let mut m = self.results.lock().unwrap();
        m.insert(state_id, result);
        while m.len() > QUERY_RESULT_CAP {
            let oldest = *m.keys().next().unwrap();
            m.remove(&oldest);
        }
    }
}

/// The per-node group-0 coordinator.
///
/// One long-lived instance per node owns the operation and apply locks, the
/// result side channel and the state machine; proposers and the log's apply
/// path both go through it. At most one instance may exist per state-machine
/// tree.
#[derive(Clone)]
pub struct Group0 {
    pub(crate) inner: Arc<GroupInner>,
}

impl Group0 {
    pub fn try_new(
        config: GroupConfig,
        log: Arc<dyn ReplicatedLog>,
        schema: Arc<dyn SchemaMerger>,
        peers: Arc<dyn MigrationPeer>,
        enabled: bool,
    ) -> Result<Group0> {
        let tree_name = StateMachine::tree_name(&config);

        {
            let mut reg = COORDINATORS.lock().unwrap();
            if !reg.insert(tree_name.clone()) {
                return Err(ErrorCode::NotCoordinator(format!(
                    "another group-0 coordinator already serves: {}",
                    tree_name
                )));
            }
        }

        let sm = StateMachine::open(&config)?;

        Ok(Group0 {
            inner: Arc::new(GroupInner {
                config,
                log,
                sm,
                schema,
                peers,
                operation_lock: Arc::new(Mutex::new(())),
                apply_lock: Arc::new(Mutex::new(())),
                results: StdMutex::new(BTreeMap::new()),
                enabled,
                tree_name,
            }),
        })
    }

    /// The handle the replicated log drives: apply and snapshot transfer.
    pub fn state_machine(&self) -> GroupStateMachine {
        GroupStateMachine::new(self.inner.clone())
    }

    /// Start one guarded operation.
    ///
    /// Takes the operation lock, runs a read barrier so local state reflects
    /// everything committed so far, then takes the apply lock and snapshots
    /// `history.last()`. The apply lock must come after the barrier: the
    /// barrier itself needs the applier to make progress.
    #[tracing::instrument(level = "debug", skip(self, abort))]
    pub async fn start_operation(&self, abort: &AbortSignal) -> Result<Guard> {
        if !self.inner.enabled {
            let new_state_id = StateId::new_after(StateId::zero());
            return Ok(Guard::unlocked(new_state_id));
        }

        let operation_permit =
            Self::acquire(self.inner.operation_lock.clone(), abort, "operation lock").await?;

        self.inner
            .log
            .read_barrier(abort)
            .await
            .map_err(Self::surface_log_error)?;

        let apply_permit =
            Self::acquire(self.inner.apply_lock.clone(), abort, "apply lock").await?;

        let observed = self.inner.sm.history_last()?;
        let new_state_id = StateId::new_after(observed);

        tracing::debug!(
            "group0 guard issued: observed {}, new {}",
            observed,
            new_state_id
        );

        Ok(Guard::locked(
            observed,
            new_state_id,
            operation_permit,
            apply_permit,
        ))
    }

    /// Build a command carrying a schema mutation batch under a guard.
    ///
    /// Every mutation is re-stamped with the guard's write timestamp so the
    /// batch commits with the timestamps of its state id.
    pub fn prepare_schema_command(
        &self,
        mutations: Vec<SchemaMutation>,
        guard: &Guard,
        description: impl Into<String>,
    ) -> Command {
        let ts = guard.write_timestamp();
        let mutations = mutations
            .into_iter()
            .map(|m| m.with_timestamp(ts))
            .collect();

        Command {
            change: GroupChange::SchemaBatch(mutations),
            history_append: StateMachine::history_append_mutation(
                guard.new_state_id(),
                description,
                self.inner.config.history_gc_after(),
            ),
            prev_state_id: Some(guard.observed_state_id()),
            new_state_id: guard.new_state_id(),
            creator_addr: self.inner.config.broadcast_address.clone(),
            creator_node_id: self.inner.config.id,
        }
    }

    /// Build an unguarded k/v command.
    ///
    /// The query is its own concurrency control (a conditional update
    /// carries its condition), so the command applies unconditionally:
    /// `prev_state_id` is absent.
    pub fn prepare_kv_command(&self, query: KvQuery) -> Result<Command> {
        let last = self.inner.sm.history_last()?;
        let new_state_id = StateId::new_after(last);

        Ok(Command {
            change: GroupChange::KvQuery(query),
            history_append: StateMachine::history_append_mutation(
                new_state_id,
                "kv query",
                self.inner.config.history_gc_after(),
            ),
            prev_state_id: None,
            new_state_id,
            creator_addr: self.inner.config.broadcast_address.clone(),
            creator_node_id: self.inner.config.id,
        })
    }

    /// Submit a guarded command and wait until it is applied locally.
    ///
    /// The guard's apply lock is released first so this node's applier can
    /// run this and prior commands; the operation lock is released when the
    /// guard is dropped, on every exit path. After the log reports success
    /// the history decides the outcome: the command either appended its
    /// state id or lost the race and became a no-op.
    #[tracing::instrument(level = "debug", skip_all, fields(new_state_id=%cmd.new_state_id))]
    pub async fn add_entry(&self, cmd: Command, mut guard: Guard, abort: &AbortSignal) -> Result<()> {
        let entry = cmd.to_bytes()?;

        guard.release_apply_lock();

        self.submit_with_retry(entry, abort).await?;

        if self.inner.sm.history_contains(&cmd.new_state_id)? {
            tracing::debug!("group0 command confirmed: {}", cmd.new_state_id);
            Ok(())
        } else {
            Err(ErrorCode::ConcurrentModification(format!(
                "command {} became a no-op: another command applied first",
                cmd.new_state_id
            )))
        }
    }

    /// Submit a command built without a guard. Safe only for operations that
    /// are globally idempotent; no locks or barriers are taken.
    #[tracing::instrument(level = "debug", skip_all, fields(new_state_id=%cmd.new_state_id))]
    pub async fn add_entry_unguarded(&self, cmd: &Command, abort: &AbortSignal) -> Result<()> {
        if cmd.prev_state_id.is_some() {
            return Err(ErrorCode::BadArguments(
                "unguarded submission requires a command without prev_state_id",
            ));
        }

        let entry = cmd.to_bytes()?;
        self.submit_with_retry(entry, abort).await?;

        if self.inner.sm.history_contains(&cmd.new_state_id)? {
            Ok(())
        } else {
            Err(ErrorCode::ConcurrentModification(format!(
                "command {} became a no-op: another command applied first",
                cmd.new_state_id
            )))
        }
    }

    /// Fetch the locally stored result of an applied k/v command.
    ///
    /// Returns None when the command has not applied here, or applied as a
    /// no-op.
    pub fn take_query_result(&self, new_state_id: StateId) -> Option<KvResult> {
        let mut m = self.inner.results.lock().unwrap();
        m.remove(&new_state_id)
    }

    async fn submit_with_retry(&self, entry: Vec<u8>, abort: &AbortSignal) -> Result<()> {
        loop {
            if abort.is_aborted() {
                return Err(ErrorCode::AbortedOperation("group0 submission aborted"));
            }

            let res = self.inner.log.add_entry(entry.clone(), abort).await;

            match res {
                Ok(()) => return Ok(()),
                Err(LogError::DroppedEntry) => {
                    tracing::debug!("log dropped the entry; retrying");
                    continue;
                }
                Err(LogError::CommitStatusUnknown) => {
                    tracing::debug!("commit status unknown; retrying");
                    continue;
                }
                Err(e) => return Err(Self::surface_log_error(e)),
            }
        }
    }

    fn surface_log_error(e: LogError) -> ErrorCode {
        match e {
            LogError::Aborted => ErrorCode::AbortedOperation("group0 operation aborted"),
            LogError::NotALeader => ErrorCode::Internal(
                "log refused the entry as non-leader while leader forwarding is enabled",
            ),
            e => ErrorCode::GroupLogError(e.to_string()),
        }
    }

    async fn acquire(
        lock: Arc<Mutex<()>>,
        abort: &AbortSignal,
        what: &str,
    ) -> Result<OwnedMutexGuard<()>> {
        tokio::select! {
            permit = lock.lock_owned() => Ok(permit),
            _ = abort.wait() => Err(ErrorCode::AbortedOperation(format!(
                "aborted while waiting for the {}", what
            ))),
        }
    }
}
