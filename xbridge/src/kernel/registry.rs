// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use parking_lot::RwLock;
use xbridge_uplink::Response;

use crate::kernel::KContext;
use crate::Error;

/// A method of a kernel contract.
pub type KernMethod =
    Arc<dyn Fn(&mut dyn KContext) -> Result<Response, Error> + Send + Sync>;

type MethodKey = (String, String);

/// Named kernel methods, plus shortcuts aliasing a bare method name to a
/// method of a specific contract.
#[derive(Default)]
pub struct KernRegistry {
    methods: RwLock<BTreeMap<MethodKey, KernMethod>>,
    shortcuts: RwLock<BTreeMap<String, MethodKey>>,
}

impl Debug for KernRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernRegistry")
            .field("methods", &self.methods.read().keys())
            .field("shortcuts", &*self.shortcuts.read())
            .finish()
    }
}

impl KernRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method` as `contract.name`.
    ///
    /// # Panics
    /// Panics if `contract.name` is already registered.
    pub fn register_kern_method<F>(&self, contract: &str, name: &str, method: F)
    where
        F: Fn(&mut dyn KContext) -> Result<Response, Error>
            + Send
            + Sync
            + 'static,
    {
        let key = (contract.to_owned(), name.to_owned());
        let mut methods = self.methods.write();
        if methods.contains_key(&key) {
            panic!("kernel method {contract}.{name} exists");
        }
        methods.insert(key, Arc::new(method));
    }

    /// Makes `old_method` resolve to `contract.method` when no method of
    /// that name is registered for the contract being called.
    pub fn register_shortcut(
        &self,
        old_method: &str,
        contract: &str,
        method: &str,
    ) {
        self.shortcuts.write().insert(
            old_method.to_owned(),
            (contract.to_owned(), method.to_owned()),
        );
    }

    /// Looks up `contract.method`, falling back to the shortcuts.
    pub fn get_kern_method(
        &self,
        contract: &str,
        method: &str,
    ) -> Result<KernMethod, Error> {
        let methods = self.methods.read();

        let key = (contract.to_owned(), method.to_owned());
        if let Some(m) = methods.get(&key) {
            return Ok(m.clone());
        }

        self.shortcuts
            .read()
            .get(method)
            .and_then(|key| methods.get(key))
            .cloned()
            .ok_or_else(|| Error::KernelMethodNotFound {
                contract: contract.to_owned(),
                method: method.to_owned(),
            })
    }
}
