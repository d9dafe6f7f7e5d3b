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
use common_exception::ErrorCode;
use common_exception::Result;
use common_group0_types::GroupSnapshot;
use common_group0_types::NodeId;
use common_tracing::tracing;

use crate::GroupStateMachine;

/// The consumed face of the messaging layer: the migration-request RPC that
/// pulls schema mutations, piggybacking the group-0 history mutation.
#[async_trait]
pub trait MigrationPeer: Send + Sync {
    async fn pull_group0_snapshot(&self, from: NodeId) -> Result<GroupSnapshot>;
}

impl GroupStateMachine {
    /// Catch up from a remote snapshot instead of replaying the log.
    ///
    /// Pulls schema plus the peer's last history state and installs both
    /// under the apply lock, history last. Installing may leapfrog the log:
    /// older entries applied afterwards fail their prev-state-id check and
    /// become no-ops. Log-layer snapshot take/load/drop stay structural
    /// no-ops, since the state lives in the persistent tables.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn transfer_snapshot(&self, origin: NodeId) -> Result<()> {
        let snap = self.inner().peers.pull_group0_snapshot(origin).await?;

        // A peer that speaks the group-0 protocol must speak canonical
        // mutations.
        let schema = snap.schema.ok_or_else(|| {
            ErrorCode::Internal(format!(
                "snapshot transfer from node {}: peer sent no canonical schema mutations",
                origin
            ))
        })?;

        let _apply_permit = self.inner().apply_lock.clone().lock_owned().await;

        self.inner()
            .schema
            .merge_schema_from(&origin.to_string(), &schema)
            .await?;

        // An empty remote history means there is no last state to record.
        if let Some(history) = snap.history {
            self.inner().sm.apply_history_mutation(&history).await?;
            tracing::info!(
                "group0 snapshot installed from node {}: history last {}",
                origin,
                history.state_id
            );
        } else {
            tracing::info!("group0 snapshot installed from node {}: empty history", origin);
        }

        Ok(())
    }
}
