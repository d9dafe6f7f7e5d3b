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

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Process-wide increasing sequence, mainly for unique resource names in
/// tests, e.g. sled tree names.
pub struct GlobalSequence;

impl GlobalSequence {
    pub fn next() -> usize {
        static GLOBAL_SEQ: AtomicUsize = AtomicUsize::new(0);
        GLOBAL_SEQ.fetch_add(1, Ordering::SeqCst)
    }
}

/// Process-wide unique name.
pub struct GlobalUniqName;

impl GlobalUniqName {
    pub fn unique() -> String {
        let uuid = uuid::Uuid::new_v4();
        uuid.to_simple().to_string()
    }
}
