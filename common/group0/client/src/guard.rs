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

use common_base::tokio::sync::OwnedMutexGuard;
use common_group0_types::StateId;

/// The token one proposer holds for the duration of one group-0 operation.
///
/// Owns the per-node operation and apply locks plus the pair of state ids
/// the operation is built on. Dropping the guard releases whatever locks it
/// still holds; the submission engine releases the apply lock early so that
/// this node can apply its own command.
#[derive(Debug)]
pub struct Guard {
    observed_state_id: StateId,
    new_state_id: StateId,

    operation_permit: Option<OwnedMutexGuard<()>>,
    apply_permit: Option<OwnedMutexGuard<()>>,
}

impl Guard {
    pub(crate) fn locked(
        observed_state_id: StateId,
        new_state_id: StateId,
        operation_permit: OwnedMutexGuard<()>,
        apply_permit: OwnedMutexGuard<()>,
    ) -> Guard {
        Guard {
            observed_state_id,
            new_state_id,
            operation_permit: Some(operation_permit),
            apply_permit: Some(apply_permit),
        }
    }

    /// The legacy-path guard: no locks, zero observed id.
    pub(crate) fn unlocked(new_state_id: StateId) -> Guard {
        Guard {
            observed_state_id: StateId::zero(),
            new_state_id,
            operation_permit: None,
            apply_permit: None,
        }
    }

    /// `history.last()` as observed when the guard was issued.
    pub fn observed_state_id(&self) -> StateId {
        self.observed_state_id
    }

    /// The pre-allocated id the operation will commit under.
    pub fn new_state_id(&self) -> StateId {
        self.new_state_id
    }

    /// The write timestamp for every mutation built under this guard.
    pub fn write_timestamp(&self) -> i64 {
        self.new_state_id.write_timestamp()
    }

    pub fn holds_locks(&self) -> bool {
        self.operation_permit.is_some() || self.apply_permit.is_some()
    }

    /// Let this node's applier run; called right before log submission.
    pub(crate) fn release_apply_lock(&mut self) {
        self.apply_permit.take();
    }
}
