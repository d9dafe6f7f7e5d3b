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
use common_exception::Result;
use common_group0_types::SchemaMutation;

/// The consumed face of the schema-merge engine.
#[async_trait]
pub trait SchemaMerger: Send + Sync {
    /// Merge canonical schema mutations produced at `origin` into the local
    /// schema tables.
    async fn merge_schema_from(&self, origin: &str, mutations: &[SchemaMutation]) -> Result<()>;

    /// Canonical mutations describing the whole current schema; the serving
    /// side of a snapshot pull.
    async fn schema_mutations(&self) -> Result<Vec<SchemaMutation>>;
}
