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

use std::sync::Arc;

use common_exception::Result;
use common_group0_types::Command;
use common_group0_types::GroupChange;
use common_group0_types::GroupSnapshot;
use common_tracing::tracing;

use crate::group0::GroupInner;

/// The face of group 0 the replicated log drives: applies committed entries
/// and installs remote snapshots.
///
/// Shares the apply lock with guard issuance on the same node, so a guard
/// never observes partially applied state.
#[derive(Clone)]
pub struct GroupStateMachine {
    inner: Arc<GroupInner>,
}

impl GroupStateMachine {
    pub(crate) fn new(inner: Arc<GroupInner>) -> GroupStateMachine {
        GroupStateMachine { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<GroupInner> {
        &self.inner
    }

    /// Apply a batch of committed entries, in log order.
    ///
    /// A decode failure surfaces and stops the batch: an unknown command tag
    /// means this node is too old to understand the log.
    #[tracing::instrument(level = "debug", skip_all, fields(entries=entries.len()))]
    pub async fn apply(&self, entries: Vec<Vec<u8>>) -> Result<()> {
        for entry in entries {
            let cmd = Command::from_bytes(&entry)?;
            self.apply_command(cmd).await?;
        }
        Ok(())
    }

    async fn apply_command(&self, cmd: Command) -> Result<()> {
        // One command per lock scope; never held across commands.
        let _apply_permit = self.inner.apply_lock.clone().lock_owned().await;

        if let Some(prev) = cmd.prev_state_id {
            let last = self.inner.sm.history_last()?;
            if last != prev {
                tracing::info!(
                    "skip group0 command {}: prev state id {} does not match history last {}",
                    cmd.new_state_id,
                    prev,
                    last
                );
                return Ok(());
            }
        }

        match &cmd.change {
            GroupChange::SchemaBatch(mutations) => {
                self.inner
                    .schema
                    .merge_schema_from(&cmd.creator_addr, mutations)
                    .await?;
            }
            GroupChange::KvQuery(query) => {
                let res = self
                    .inner
                    .sm
                    .apply_kv_query(query, &cmd.new_state_id)
                    .await?;
                self.inner.put_query_result(cmd.new_state_id, res);
            }
        }

        // The history append is the last write. A crash before this point
        // re-admits the command on restart: the prev-state-id check still
        // matches and both payload kinds re-apply idempotently.
        self.inner.sm.apply_history_mutation(&cmd.history_append).await?;

        tracing::info!("applied group0 command: {}", cmd.new_state_id);
        Ok(())
    }

    /// Serve the group-0 part of a schema pull: the full schema plus the one
    /// history mutation capturing this node's current last state.
    pub async fn group0_snapshot(&self) -> Result<GroupSnapshot> {
        let _apply_permit = self.inner.apply_lock.clone().lock_owned().await;

        let schema = self.inner.schema.schema_mutations().await?;

        let history = self
            .inner
            .sm
            .history()
            .last()?
            .map(|(state_id, row)| common_group0_types::HistoryMutation { state_id, row });

        Ok(GroupSnapshot {
            schema: Some(schema),
            history,
        })
    }
}
