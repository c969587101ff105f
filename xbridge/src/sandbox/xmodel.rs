// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::sandbox::{RWSet, VersionedData};
use crate::Error;

/// Read access to committed chain state.
pub trait XMReader: Send + Sync {
    /// Returns the committed value of `key`, if any.
    fn get(&self, bucket: &str, key: &[u8])
        -> Result<Option<VersionedData>, Error>;

    /// Returns the committed entries with keys in `[start, end)`, in key
    /// order. An empty `end` selects up to the end of the bucket.
    fn select(
        &self,
        bucket: &str,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<VersionedData>, Error>;
}

/// Bounds of `[start, end)` within `bucket`.
pub(crate) fn range_bounds(
    bucket: &str,
    start: &[u8],
    end: &[u8],
) -> Option<(Bound<(String, Vec<u8>)>, Bound<(String, Vec<u8>)>)> {
    if !end.is_empty() && start >= end {
        return None;
    }

    let lower = Bound::Included((bucket.to_owned(), start.to_vec()));
    let upper = if end.is_empty() {
        // the first key of the next bucket in order
        let mut next = bucket.to_owned();
        next.push('\0');
        Bound::Excluded((next, Vec::new()))
    } else {
        Bound::Excluded((bucket.to_owned(), end.to_vec()))
    };

    Some((lower, upper))
}

/// An ordered, in-memory committed store.
#[derive(Debug, Default)]
pub struct MemXModel {
    tree: RwLock<BTreeMap<(String, Vec<u8>), VersionedData>>,
}

impl MemXModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, data: VersionedData) {
        let key = (data.pure.bucket.clone(), data.pure.key.clone());
        self.tree.write().insert(key, data);
    }

    /// Applies a write set, as committed by the transaction `txid`.
    pub fn commit(&self, rwset: &RWSet, txid: &[u8]) {
        let mut tree = self.tree.write();

        for (offset, w) in rwset.wset.iter().enumerate() {
            let key = (w.bucket.clone(), w.key.clone());
            match &w.value {
                Some(_) => {
                    tree.insert(
                        key,
                        VersionedData {
                            pure: w.clone(),
                            ref_txid: txid.to_vec(),
                            ref_offset: offset as u32,
                        },
                    );
                }
                None => {
                    tree.remove(&key);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }
}

impl XMReader for MemXModel {
    fn get(
        &self,
        bucket: &str,
        key: &[u8],
    ) -> Result<Option<VersionedData>, Error> {
        let key = (bucket.to_owned(), key.to_vec());
        Ok(self.tree.read().get(&key).cloned())
    }

    fn select(
        &self,
        bucket: &str,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<VersionedData>, Error> {
        let Some(bounds) = range_bounds(bucket, start, end) else {
            return Ok(Vec::new());
        };

        let tree = self.tree.read();
        Ok(tree.range(bounds).map(|(_, v)| v.clone()).collect())
    }
}

impl From<&RWSet> for MemXModel {
    /// A store holding exactly what `rwset` read.
    fn from(rwset: &RWSet) -> Self {
        let model = MemXModel::new();
        for r in &rwset.rset {
            if r.pure.value.is_some() {
                model.put(r.clone());
            }
        }
        model
    }
}
