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

use common_group0_types::NodeId;
use serde::Deserialize;
use serde::Serialize;
use structopt::StructOpt;
use structopt_toml::StructOptToml;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(about = "Group-0 coordination config")]
pub struct GroupConfig {
    /// Identify a config. Only used in logs and tree names.
    #[structopt(long, default_value = "")]
    pub config_id: String,

    /// The node id. Only used when this node is not initialized.
    #[structopt(long, default_value = "0")]
    pub id: NodeId,

    /// The address other nodes reach this node at; recorded as the origin of
    /// mutations this node proposes.
    #[structopt(long, default_value = "127.0.0.1:28004")]
    pub broadcast_address: String,

    /// Dir to store group-0 tables.
    #[structopt(long, default_value = "./_group0")]
    pub group_dir: String,

    /// Do not fsync after every write. Trades durability for test speed.
    #[structopt(long)]
    pub no_sync: bool,

    /// How long an applied history entry stays before it may be reclaimed.
    /// The newest entry is never reclaimed.
    #[structopt(long, default_value = "86400")]
    pub history_gc_seconds: u64,

    /// Prefix of sled tree names; mainly for unit tests to give every case
    /// its own tree.
    #[structopt(long, default_value = "")]
    pub sled_tree_prefix: String,
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig::empty()
    }
}

impl GroupConfig {
    /// Build config from empty command line arguments, i.e. all defaults.
    pub fn empty() -> Self {
        <Self as StructOpt>::from_iter(&Vec::<&'static str>::new())
    }

    pub fn is_sync(&self) -> bool {
        !self.no_sync
    }

    pub fn history_gc_after(&self) -> Duration {
        Duration::from_secs(self.history_gc_seconds)
    }

    pub fn tree_name(&self, name: impl std::fmt::Display) -> String {
        format!("{}{}", self.sled_tree_prefix, name)
    }
}
