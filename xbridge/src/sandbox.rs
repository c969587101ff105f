// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Per-transaction state isolation.
//!
//! A [`StateSandbox`] sits on top of committed state and captures every read
//! and write a transaction makes, so they can later be validated and
//! committed as a single [`RWSet`].

mod xmodel;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use xmodel::{MemXModel, XMReader};

use crate::Error;

/// Bucket whose writes are carried by the transaction but never read back.
pub const TRANSIENT_BUCKET: &str = "$transient";

/// Key in [`TRANSIENT_BUCKET`] under which events are flushed.
pub const CONTRACT_EVENT_KEY: &[u8] = b"contractEvent";

/// A written key. A value of `None` marks a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PureData {
    pub bucket: String,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl PureData {
    pub fn new<B, K>(bucket: B, key: K, value: Option<Vec<u8>>) -> Self
    where
        B: Into<String>,
        K: Into<Vec<u8>>,
    {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            value,
        }
    }
}

/// A read key, along with the transaction output that last wrote it.
///
/// Reads of absent keys are recorded with no value and an empty txid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedData {
    pub pure: PureData,
    pub ref_txid: Vec<u8>,
    pub ref_offset: u32,
}

impl VersionedData {
    fn absent(bucket: &str, key: &[u8]) -> Self {
        Self {
            pure: PureData::new(bucket, key, None),
            ref_txid: Vec::new(),
            ref_offset: 0,
        }
    }
}

/// The reads and writes of a transaction, both ordered by bucket and key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RWSet {
    pub rset: Vec<VersionedData>,
    pub wset: Vec<PureData>,
}

/// A movement of the native token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub amount: u128,
}

/// Native token movements, kept apart from key-value writes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UtxoRWSet {
    pub transfers: Vec<Transfer>,
}

/// An event emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub contract: String,
    pub name: String,
    #[serde(with = "hex")]
    pub body: Vec<u8>,
}

type BucketKey = (String, Vec<u8>);

struct SandboxInner {
    reader: Arc<dyn XMReader>,
    reads: BTreeMap<BucketKey, VersionedData>,
    writes: BTreeMap<BucketKey, Option<Vec<u8>>>,
    transfers: Vec<Transfer>,
    events: Vec<ContractEvent>,
}

impl SandboxInner {
    // Reads through to committed state, recording the version read.
    fn read(
        &mut self,
        bucket: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let bk = (bucket.to_owned(), key.to_vec());
        if let Some(data) = self.reads.get(&bk) {
            return Ok(data.pure.value.clone());
        }

        let data = self
            .reader
            .get(bucket, key)?
            .unwrap_or_else(|| VersionedData::absent(bucket, key));
        let value = data.pure.value.clone();
        self.reads.insert(bk, data);

        Ok(value)
    }

    fn get(
        &mut self,
        bucket: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let bk = (bucket.to_owned(), key.to_vec());
        if let Some(value) = self.writes.get(&bk) {
            return Ok(value.clone());
        }
        self.read(bucket, key)
    }

    fn write(
        &mut self,
        bucket: &str,
        key: &[u8],
        value: Option<Vec<u8>>,
    ) -> Result<(), Error> {
        if bucket != TRANSIENT_BUCKET {
            // a write depends on the version it overwrites
            self.get(bucket, key)?;
        }
        self.writes.insert((bucket.to_owned(), key.to_vec()), value);
        Ok(())
    }
}

/// Captures the reads and writes of one transaction over committed state.
///
/// Cloning the sandbox gives another handle to the same state, which is how
/// nested contract calls share their caller's view.
#[derive(Clone)]
pub struct StateSandbox {
    inner: Arc<Mutex<SandboxInner>>,
}

impl StateSandbox {
    pub fn new(reader: Arc<dyn XMReader>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SandboxInner {
                reader,
                reads: BTreeMap::new(),
                writes: BTreeMap::new(),
                transfers: Vec::new(),
                events: Vec::new(),
            })),
        }
    }

    /// Returns the current value of `key`, as seen by this transaction.
    pub fn get(
        &self,
        bucket: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        self.inner.lock().get(bucket, key)
    }

    /// Returns the entries with keys in `[start, end)`, in key order.
    ///
    /// Writes made by this transaction take precedence over committed state,
    /// and deleted keys are left out. Every committed entry visited is
    /// recorded as read.
    pub fn select(
        &self,
        bucket: &str,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut inner = self.inner.lock();

        let Some(bounds) = xmodel::range_bounds(bucket, start, end) else {
            return Ok(Vec::new());
        };

        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        for data in inner.reader.select(bucket, start, end)? {
            let bk = (bucket.to_owned(), data.pure.key.clone());
            let read = inner.reads.entry(bk).or_insert(data);
            merged.insert(read.pure.key.clone(), read.pure.value.clone());
        }
        for ((_, key), data) in inner.reads.range(bounds.clone()) {
            merged.insert(key.clone(), data.pure.value.clone());
        }
        for ((_, key), value) in inner.writes.range(bounds) {
            merged.insert(key.clone(), value.clone());
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    pub fn put(
        &self,
        bucket: &str,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), Error> {
        self.inner.lock().write(bucket, key, Some(value))
    }

    /// Marks `key` as deleted.
    pub fn del(&self, bucket: &str, key: &[u8]) -> Result<(), Error> {
        self.inner.lock().write(bucket, key, None)
    }

    /// Records a movement of `amount` native tokens. Zero amounts are
    /// ignored.
    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: u128,
    ) -> Result<(), Error> {
        if amount == 0 {
            return Ok(());
        }
        self.inner.lock().transfers.push(Transfer {
            from: from.to_owned(),
            to: to.to_owned(),
            amount,
        });
        Ok(())
    }

    pub fn add_event(&self, event: ContractEvent) {
        self.inner.lock().events.push(event);
    }

    pub fn events(&self) -> Vec<ContractEvent> {
        self.inner.lock().events.clone()
    }

    pub fn rwset(&self) -> RWSet {
        let inner = self.inner.lock();

        RWSet {
            rset: inner.reads.values().cloned().collect(),
            wset: inner
                .writes
                .iter()
                .map(|((bucket, key), value)| {
                    PureData::new(bucket.clone(), key.clone(), value.clone())
                })
                .collect(),
        }
    }

    pub fn utxo_rwset(&self) -> UtxoRWSet {
        UtxoRWSet {
            transfers: self.inner.lock().transfers.clone(),
        }
    }

    /// Writes the emitted events into [`TRANSIENT_BUCKET`], so they travel
    /// with the write set.
    pub fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.events.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(&inner.events)
            .map_err(|err| Error::Serialization(err.to_string().into()))?;
        inner.write(TRANSIENT_BUCKET, CONTRACT_EVENT_KEY, Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed() -> Arc<MemXModel> {
        let model = MemXModel::new();
        for (key, value) in [("k1", "v1"), ("k2", "v2"), ("k4", "v4")] {
            model.put(VersionedData {
                pure: PureData::new("b", key, Some(value.into())),
                ref_txid: b"tx0".to_vec(),
                ref_offset: 0,
            });
        }
        Arc::new(model)
    }

    #[test]
    fn reads_are_versioned() -> Result<(), Error> {
        let sandbox = StateSandbox::new(committed());

        assert_eq!(sandbox.get("b", b"k1")?, Some(b"v1".to_vec()));
        assert_eq!(sandbox.get("b", b"missing")?, None);

        let rwset = sandbox.rwset();
        assert!(rwset.wset.is_empty());
        assert_eq!(rwset.rset.len(), 2);
        assert_eq!(rwset.rset[0].pure.key, b"k1");
        assert_eq!(rwset.rset[0].ref_txid, b"tx0");
        assert_eq!(rwset.rset[1].pure.key, b"missing");
        assert!(rwset.rset[1].ref_txid.is_empty());

        Ok(())
    }

    #[test]
    fn writes_shadow_committed_state() -> Result<(), Error> {
        let sandbox = StateSandbox::new(committed());

        sandbox.put("b", b"k1", b"new".to_vec())?;
        sandbox.del("b", b"k2")?;

        assert_eq!(sandbox.get("b", b"k1")?, Some(b"new".to_vec()));
        assert_eq!(sandbox.get("b", b"k2")?, None);

        let rwset = sandbox.rwset();
        // writes force a read of the overwritten version
        assert_eq!(rwset.rset.len(), 2);
        assert_eq!(
            rwset.wset,
            vec![
                PureData::new("b", "k1", Some(b"new".to_vec())),
                PureData::new("b", "k2", None),
            ]
        );

        Ok(())
    }

    #[test]
    fn select_merges_three_ways() -> Result<(), Error> {
        let sandbox = StateSandbox::new(committed());

        sandbox.put("b", b"k3", b"v3".to_vec())?;
        sandbox.del("b", b"k4")?;
        sandbox.put("b", b"k1", b"v1'".to_vec())?;
        sandbox.put("other", b"k2", b"x".to_vec())?;

        let entries = sandbox.select("b", b"", b"")?;
        assert_eq!(
            entries,
            vec![
                (b"k1".to_vec(), b"v1'".to_vec()),
                (b"k2".to_vec(), b"v2".to_vec()),
                (b"k3".to_vec(), b"v3".to_vec()),
            ]
        );

        let entries = sandbox.select("b", b"k2", b"k4")?;
        assert_eq!(entries.len(), 2);

        Ok(())
    }

    #[test]
    fn transient_writes_are_not_read() -> Result<(), Error> {
        let sandbox = StateSandbox::new(committed());

        sandbox.add_event(ContractEvent {
            contract: "counter".into(),
            name: "increase".into(),
            body: b"1".to_vec(),
        });
        sandbox.flush()?;

        let rwset = sandbox.rwset();
        assert!(rwset.rset.is_empty());
        assert_eq!(rwset.wset.len(), 1);
        assert_eq!(rwset.wset[0].bucket, TRANSIENT_BUCKET);
        assert_eq!(rwset.wset[0].key, CONTRACT_EVENT_KEY);

        Ok(())
    }

    #[test]
    fn transfers_are_kept_apart() -> Result<(), Error> {
        let sandbox = StateSandbox::new(committed());

        sandbox.transfer("alice", "bob", 10)?;
        sandbox.transfer("alice", "bob", 0)?;

        assert_eq!(sandbox.utxo_rwset().transfers.len(), 1);
        assert!(sandbox.rwset().wset.is_empty());

        Ok(())
    }
}
