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

use std::marker::PhantomData;

use common_exception::ErrorCode;
use common_exception::Result;
use common_exception::ToErrorCode;
use common_tracing::tracing;

use crate::SledKeySpace;
use crate::SledOrderedSerde;
use crate::SledSerde;

/// One sled::Tree with typed key-space views.
///
/// Write methods are async: when `sync` is on, every write flushes before
/// returning, which a caller must await.
#[derive(Debug, Clone)]
pub struct SledTree {
    pub name: String,

    /// Whether to fsync after every write.
    sync: bool,

    pub tree: sled::Tree,
}

impl SledTree {
    pub fn open(db: &sled::Db, tree_name: impl AsRef<str>, sync: bool) -> Result<Self> {
        let name = tree_name.as_ref().to_string();
        let t = db
            .open_tree(&name)
            .map_err_to_code(ErrorCode::GroupStoreDamaged, || {
                format!("open tree: {}", &name)
            })?;

        tracing::debug!("SledTree opened tree: {}", name);

        Ok(SledTree {
            name,
            sync,
            tree: t,
        })
    }

    /// A borrowed view of one key space.
    pub fn key_space<KS: SledKeySpace>(&self) -> AsKeySpace<KS> {
        AsKeySpace::<KS> {
            inner: self,
            phantom: PhantomData,
        }
    }

    async fn flush(&self) -> Result<()> {
        if self.sync {
            self.tree
                .flush_async()
                .await
                .map_err_to_code(ErrorCode::GroupStoreDamaged, || "flush sled tree")?;
        }
        Ok(())
    }
}

/// A `SledTree` view bound to key space `KS`: a map of `KS::K` to `KS::V`,
/// isolated from every other key space of the same tree.
pub struct AsKeySpace<'a, KS: SledKeySpace> {
    inner: &'a SledTree,
    phantom: PhantomData<KS>,
}

impl<'a, KS: SledKeySpace> AsKeySpace<'a, KS> {
    fn encode_key(key: &KS::K) -> Result<sled::IVec> {
        let b = SledOrderedSerde::ser(key)?;
        let mut buf = Vec::with_capacity(1 + b.len());
        buf.push(KS::PREFIX);
        buf.extend_from_slice(b.as_ref());
        Ok(buf.into())
    }

    fn decode_key(raw: &[u8]) -> Result<KS::K> {
        <KS::K as SledOrderedSerde>::de(&raw[1..])
    }

    /// The whole range of keys in this key space.
    fn space_range() -> (Vec<u8>, Vec<u8>) {
        (vec![KS::PREFIX], vec![KS::PREFIX + 1])
    }

    pub fn get(&self, key: &KS::K) -> Result<Option<KS::V>> {
        let k = Self::encode_key(key)?;
        let got = self
            .inner
            .tree
            .get(k)
            .map_err_to_code(ErrorCode::GroupStoreDamaged, || {
                format!("get: {}:{:?}", KS::NAME, key)
            })?;

        match got {
            None => Ok(None),
            Some(v) => Ok(Some(KS::V::de(v)?)),
        }
    }

    pub fn contains_key(&self, key: &KS::K) -> Result<bool> {
        let got = self.get(key)?;
        Ok(got.is_some())
    }

    pub async fn insert(&self, key: &KS::K, value: &KS::V) -> Result<Option<KS::V>> {
        let k = Self::encode_key(key)?;
        let v = value.ser()?;

        let prev = self
            .inner
            .tree
            .insert(k, v)
            .map_err_to_code(ErrorCode::GroupStoreDamaged, || {
                format!("insert: {}:{:?}", KS::NAME, key)
            })?;

        self.inner.flush().await?;

        match prev {
            None => Ok(None),
            Some(p) => Ok(Some(KS::V::de(p)?)),
        }
    }

    pub async fn remove(&self, key: &KS::K) -> Result<Option<KS::V>> {
        let k = Self::encode_key(key)?;
        let prev = self
            .inner
            .tree
            .remove(k)
            .map_err_to_code(ErrorCode::GroupStoreDamaged, || {
                format!("remove: {}:{:?}", KS::NAME, key)
            })?;

        self.inner.flush().await?;

        match prev {
            None => Ok(None),
            Some(p) => Ok(Some(KS::V::de(p)?)),
        }
    }

    /// The greatest key and its value, by key order.
    pub fn last(&self) -> Result<Option<(KS::K, KS::V)>> {
        let (start, end) = Self::space_range();
        let kv = self
            .inner
            .tree
            .range(start..end)
            .next_back()
            .transpose()
            .map_err_to_code(ErrorCode::GroupStoreDamaged, || {
                format!("last of: {}", KS::NAME)
            })?;

        match kv {
            None => Ok(None),
            Some((k, v)) => Ok(Some((Self::decode_key(&k)?, KS::V::de(v)?))),
        }
    }

    pub fn range_kvs(&self) -> Result<Vec<(KS::K, KS::V)>> {
        let (start, end) = Self::space_range();

        let mut res = vec![];
        for kv in self.inner.tree.range(start..end) {
            let (k, v) = kv.map_err_to_code(ErrorCode::GroupStoreDamaged, || {
                format!("range of: {}", KS::NAME)
            })?;
            res.push((Self::decode_key(&k)?, KS::V::de(v)?));
        }

        Ok(res)
    }

    pub fn range_keys(&self) -> Result<Vec<KS::K>> {
        let kvs = self.range_kvs()?;
        Ok(kvs.into_iter().map(|(k, _v)| k).collect())
    }
}
