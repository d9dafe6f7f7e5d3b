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

use std::time::Duration;

use common_exception::ErrorCode;
use common_exception::Result;
use common_exception::ToErrorCode;
use common_group0_sled_store::get_sled_db;
use common_group0_sled_store::sled;
use common_group0_sled_store::AsKeySpace;
use common_group0_sled_store::SledTree;
use common_group0_types::HistoryMutation;
use common_group0_types::HistoryRow;
use common_group0_types::KvQuery;
use common_group0_types::KvResult;
use common_group0_types::StateId;
use common_tracing::tracing;

use crate::config::GroupConfig;
use crate::key_spaces::History;
use crate::key_spaces::KvRow;
use crate::key_spaces::KvStore;

const TREE_STATE_MACHINE: &str = "state_machine";

/// The persistent half of the group-0 state machine: the history chain and
/// the strongly consistent k/v table, both key spaces of one sled tree.
///
/// Everything here runs with the apply lock already held by the caller; this
/// type itself holds no locks.
#[derive(Debug)]
pub struct StateMachine {
    /// The dedicated sled db storing everything about a state machine.
    _db: sled::Db,

    pub sm_tree: SledTree,
}

impl StateMachine {
    pub fn tree_name(config: &GroupConfig) -> String {
        config.tree_name(TREE_STATE_MACHINE)
    }

    #[tracing::instrument(level = "debug", skip(config), fields(config_id=config.config_id.as_str()))]
    pub fn clean(config: &GroupConfig) -> Result<()> {
        let tree_name = StateMachine::tree_name(config);

        let db = get_sled_db();

        // it blocks and slow
        db.drop_tree(tree_name)
            .map_err_to_code(ErrorCode::GroupStoreDamaged, || "drop prev state machine")?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(config), fields(config_id=%config.config_id, prefix=%config.sled_tree_prefix))]
    pub fn open(config: &GroupConfig) -> Result<StateMachine> {
        let db = get_sled_db();

        let tree_name = StateMachine::tree_name(config);
        let sm_tree = SledTree::open(&db, &tree_name, config.is_sync())?;

        Ok(StateMachine { _db: db, sm_tree })
    }

    /// Build the pending history write for a freshly generated state id.
    ///
    /// Nothing is persisted here: the mutation travels inside the command and
    /// is applied as the last write of the apply step.
    pub fn history_append_mutation(
        state_id: StateId,
        description: impl Into<String>,
        gc_after: Duration,
    ) -> HistoryMutation {
        HistoryMutation {
            state_id,
            row: HistoryRow {
                description: description.into(),
                gc_after_secs: gc_after.as_secs(),
            },
        }
    }

    /// The state id of the most recent history entry, or zero if empty.
    ///
    /// This is what "current state" means to a proposer; it reflects every
    /// command applied on this node so far.
    pub fn history_last(&self) -> Result<StateId> {
        let last = self.history().last()?;
        Ok(last.map(|(id, _row)| id).unwrap_or_else(StateId::zero))
    }

    pub fn history_contains(&self, state_id: &StateId) -> Result<bool> {
        self.history().contains_key(state_id)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn apply_history_mutation(&self, m: &HistoryMutation) -> Result<()> {
        self.history().insert(&m.state_id, &m.row).await?;
        tracing::debug!("applied history append: {}", m.state_id);
        Ok(())
    }

    /// Reclaim history entries whose `gc_after` has elapsed at `now_micros`.
    /// The newest entry is pinned whatever its age. Returns how many entries
    /// were removed.
    pub async fn history_gc(&self, now_micros: u64) -> Result<usize> {
        let history = self.history();

        let mut ids = history.range_keys()?;

        // Pin the newest entry.
        ids.pop();

        let mut removed = 0;
        for id in ids {
            let row = match history.get(&id)? {
                None => continue,
                Some(x) => x,
            };

            let expire = id
                .micros()
                .saturating_add(row.gc_after_secs.saturating_mul(1_000_000));
            if expire <= now_micros {
                history.remove(&id).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("group0 history gc removed {} entries", removed);
        }

        Ok(removed)
    }

    /// Execute one k/v query, with write timestamps derived from the
    /// command's state id.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn apply_kv_query(&self, query: &KvQuery, new_state_id: &StateId) -> Result<KvResult> {
        let kvs = self.kvs();

        match query {
            KvQuery::Select { key } => {
                let row = kvs.get(key)?;
                Ok(KvResult::Select {
                    value: row.map(|r| r.value),
                })
            }

            KvQuery::Update {
                key,
                new_value,
                value_condition,
            } => {
                let prev = kvs.get(key)?;

                match value_condition {
                    None => {
                        self.kv_update(key, new_value, prev.as_ref(), new_state_id)
                            .await?;
                        Ok(KvResult::None)
                    }
                    Some(want) => {
                        // An absent partition never matches a set condition.
                        let applied = match prev {
                            None => false,
                            Some(ref row) => &row.value == want,
                        };

                        if applied {
                            self.kv_update(key, new_value, prev.as_ref(), new_state_id)
                                .await?;
                        }

                        Ok(KvResult::ConditionalUpdate {
                            applied,
                            previous_value: prev.map(|r| r.value),
                        })
                    }
                }
            }
        }
    }

    /// Upsert one k/v cell. The write timestamp is the state-id timestamp,
    /// bumped past the existing cell's timestamp if the clock would not move.
    async fn kv_update(
        &self,
        key: &[u8],
        new_value: &[u8],
        prev: Option<&KvRow>,
        new_state_id: &StateId,
    ) -> Result<()> {
        let ts = match prev {
            None => new_state_id.write_timestamp(),
            Some(row) => std::cmp::max(row.timestamp + 1, new_state_id.write_timestamp()),
        };

        let row = KvRow {
            value: new_value.to_vec(),
            timestamp: ts,
        };

        self.kvs().insert(&key.to_vec(), &row).await?;
        tracing::debug!("applied kv update, ts: {}", ts);
        Ok(())
    }

    /// Local read of a k/v cell, for callers that already hold the apply
    /// lock or do not need linearized reads.
    pub fn kv_get(&self, key: &[u8]) -> Result<Option<KvRow>> {
        self.kvs().get(&key.to_vec())
    }
}

/// Key space support
impl StateMachine {
    pub fn history(&self) -> AsKeySpace<History> {
        self.sm_tree.key_space()
    }

    /// The strongly consistent kv table. One value per key.
    pub fn kvs(&self) -> AsKeySpace<KvStore> {
        self.sm_tree.key_space()
    }
}
