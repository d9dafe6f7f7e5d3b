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

use std::fmt::Debug;

use crate::SledOrderedSerde;
use crate::SledSerde;

/// Defines a key space in a `SledTree`.
///
/// A key space is distinguished by a unique prefix byte, which is preserved
/// when encoding keys so that a whole key space occupies one contiguous
/// range of the tree and keeps its key order.
pub trait SledKeySpace {
    const PREFIX: u8;
    const NAME: &'static str;

    type K: SledOrderedSerde + Debug;
    type V: SledSerde + Debug;
}
