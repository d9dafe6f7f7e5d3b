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

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use common_exception::ErrorCode;
use common_exception::Result;
use common_group0_sled_store::sled;
use common_group0_sled_store::SledOrderedSerde;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

/// Identifier of one successfully applied group-0 command.
///
/// 128 bits: a microsecond timestamp in the order significant half and a
/// random tail. The derived ordering is the total order the history is
/// recorded in; the embedded timestamp doubles as the write timestamp of any
/// mutation the command carries.
#[derive(
    Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct StateId {
    micros: u64,
    tail: u64,
}

impl StateId {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.micros == 0 && self.tail == 0
    }

    /// Generate a fresh id strictly greater than `prev`.
    ///
    /// The embedded timestamp is `max(now, prev.micros() + 1)`, which keeps
    /// the chain strictly increasing even when the wall clock stalls within a
    /// microsecond or moves backwards.
    pub fn new_after(prev: StateId) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        StateId {
            micros: std::cmp::max(now, prev.micros + 1),
            tail: rand::thread_rng().gen(),
        }
    }

    pub fn from_parts(micros: u64, tail: u64) -> Self {
        StateId { micros, tail }
    }

    pub fn micros(&self) -> u64 {
        self.micros
    }

    /// The write timestamp for mutations carried by a command bearing this id.
    pub fn write_timestamp(&self) -> i64 {
        self.micros as i64
    }

    pub fn to_uuid(&self) -> uuid::Uuid {
        let n = ((self.micros as u128) << 64) | self.tail as u128;
        uuid::Uuid::from_u128(n)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_uuid().to_hyphenated())
    }
}

/// Sled key encoding: 16 big-endian bytes, so that the sled key order is the
/// state-id order and `last()` on the history key space is the newest entry.
impl SledOrderedSerde for StateId {
    fn ser(&self) -> Result<sled::IVec> {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.micros.to_be_bytes());
        buf[8..].copy_from_slice(&self.tail.to_be_bytes());
        Ok(sled::IVec::from(&buf[..]))
    }

    fn de<V: AsRef<[u8]>>(v: V) -> Result<Self> {
        let b = v.as_ref();
        if b.len() != 16 {
            return Err(ErrorCode::GroupStoreDamaged("invalid state-id key bytes"));
        }

        let mut micros = [0u8; 8];
        let mut tail = [0u8; 8];
        micros.copy_from_slice(&b[..8]);
        tail.copy_from_slice(&b[8..]);

        Ok(StateId {
            micros: u64::from_be_bytes(micros),
            tail: u64::from_be_bytes(tail),
        })
    }
}
