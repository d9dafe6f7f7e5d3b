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

use serde::Deserialize;
use serde::Serialize;

/// A strongly consistent k/v operation carried through the log as a command
/// payload. Keys and values are opaque byte strings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum KvQuery {
    Select {
        key: Vec<u8>,
    },
    Update {
        key: Vec<u8>,
        new_value: Vec<u8>,
        /// When present, the update applies only if the current value equals
        /// this one. An absent partition never matches.
        value_condition: Option<Vec<u8>>,
    },
}

/// Outcome of one applied `KvQuery`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum KvResult {
    /// Unconditional update; nothing to report.
    None,
    Select {
        value: Option<Vec<u8>>,
    },
    ConditionalUpdate {
        applied: bool,
        previous_value: Option<Vec<u8>>,
    },
}
