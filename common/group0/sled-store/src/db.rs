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
use std::sync::Mutex;

use lazy_static::lazy_static;
use tempfile::TempDir;

struct GlobalSledDb {
    /// Keeps the temp dir alive for the whole process when initialized for
    /// unit tests.
    _temp_dir: Option<TempDir>,
    db: sled::Db,
}

impl GlobalSledDb {
    fn new_temp(temp_dir: TempDir) -> Self {
        let path = temp_dir.path().to_str().unwrap().to_string();

        GlobalSledDb {
            _temp_dir: Some(temp_dir),
            db: sled::open(path).expect("open global sled::Db"),
        }
    }

    fn new(path: String) -> Self {
        GlobalSledDb {
            _temp_dir: None,
            db: sled::open(path).expect("open global sled::Db"),
        }
    }
}

lazy_static! {
    static ref GLOBAL_SLED: Arc<Mutex<Option<GlobalSledDb>>> = Arc::new(Mutex::new(None));
}

/// Initialize the process-wide sled::Db backed by a temp dir, for testing.
/// The second and following calls have no effect.
pub fn init_temp_sled_db(temp_dir: TempDir) {
    let mut g = GLOBAL_SLED.as_ref().lock().unwrap();
    if g.is_none() {
        *g = Some(GlobalSledDb::new_temp(temp_dir));
    }
}

/// Initialize the process-wide sled::Db at `path`.
/// The second and following calls have no effect.
pub fn init_sled_db(path: String) {
    let mut g = GLOBAL_SLED.as_ref().lock().unwrap();
    if g.is_none() {
        *g = Some(GlobalSledDb::new(path));
    }
}

/// A sled::Db has to be a process-wide singleton, per sled doc.
pub fn get_sled_db() -> sled::Db {
    let guard = GLOBAL_SLED.as_ref().lock().unwrap();
    let glb = guard
        .as_ref()
        .expect("init_sled_db() or init_temp_sled_db() has to be called before get_sled_db()");
    glb.db.clone()
}
