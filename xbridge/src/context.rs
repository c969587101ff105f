// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use parking_lot::Mutex;
use xbridge_uplink::{Args, Response};

use crate::sandbox::{ContractEvent, StateSandbox};
use crate::{Limits, XBridge};

/// What a caller asks for when creating a context.
#[derive(Clone)]
pub struct ContextConfig {
    pub state: StateSandbox,

    pub initiator: String,
    pub auth_require: Vec<String>,
    /// The calling contract, empty for a top-level call.
    pub caller: String,

    pub module: String,
    pub contract_name: String,

    pub resource_limits: Limits,

    /// Whether the `initialize` method may be invoked.
    pub can_initialize: bool,

    /// Native tokens moved to the contract along with the call.
    pub transfer_amount: u128,

    /// Contracts already on the call stack. `None` for a top-level call.
    pub contract_set: Option<IndexSet<String>>,

    /// Whether contract code may be read from the sandbox rather than
    /// committed state.
    pub contract_code_from_cache: bool,
}

impl ContextConfig {
    /// A configuration for calling `contract_name` in `module`, with every
    /// other field empty and zero limits.
    pub fn new<M, N>(state: StateSandbox, module: M, contract_name: N) -> Self
    where
        M: Into<String>,
        N: Into<String>,
    {
        Self {
            state,
            initiator: String::new(),
            auth_require: Vec::new(),
            caller: String::new(),
            module: module.into(),
            contract_name: contract_name.into(),
            resource_limits: Limits::default(),
            can_initialize: false,
            transfer_amount: 0,
            contract_set: None,
            contract_code_from_cache: false,
        }
    }
}

/// Per-invocation state, bound to exactly one instance.
pub struct Context {
    pub id: u64,

    pub module: String,
    pub contract_name: String,
    pub method: String,
    pub args: Args,

    pub initiator: String,
    pub caller: String,
    pub auth_require: Vec<String>,

    pub resource_limits: Limits,
    pub can_initialize: bool,
    /// Always contains `contract_name`.
    pub contract_set: IndexSet<String>,
    pub transfer_amount: u128,
    pub chain_name: String,

    pub state: StateSandbox,

    pub output: Option<Response>,
    pub events: Vec<ContractEvent>,

    bridge: XBridge,
}

impl Context {
    pub(crate) fn new(id: u64, cfg: ContextConfig, bridge: XBridge) -> Self {
        let mut contract_set = cfg.contract_set.unwrap_or_default();
        contract_set.insert(cfg.contract_name.clone());

        Self {
            id,
            module: cfg.module,
            contract_name: cfg.contract_name,
            method: String::new(),
            args: Args::new(),
            initiator: cfg.initiator,
            caller: cfg.caller,
            auth_require: cfg.auth_require,
            resource_limits: cfg.resource_limits,
            can_initialize: cfg.can_initialize,
            contract_set,
            transfer_amount: cfg.transfer_amount,
            chain_name: bridge.chain_name().to_owned(),
            state: cfg.state,
            output: None,
            events: Vec::new(),
            bridge,
        }
    }

    /// The bridge that created this context.
    pub fn bridge(&self) -> &XBridge {
        &self.bridge
    }
}

/// What is kept about a live context, for correlating syscalls and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub module: String,
    pub contract_name: String,
}

/// Hands out context ids and tracks which contexts are live.
#[derive(Debug, Default)]
pub struct ContextManager {
    next_id: AtomicU64,
    contexts: Mutex<HashMap<u64, ContextInfo>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new context and returns its id.
    pub fn make_context(&self, info: ContextInfo) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.contexts.lock().insert(id, info);
        id
    }

    pub fn context(&self, id: u64) -> Option<ContextInfo> {
        self.contexts.lock().get(&id).cloned()
    }

    pub fn destroy_context(&self, id: u64) {
        self.contexts.lock().remove(&id);
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let ctxmgr = ContextManager::new();
        let info = ContextInfo {
            module: "native".into(),
            contract_name: "counter".into(),
        };

        let a = ctxmgr.make_context(info.clone());
        let b = ctxmgr.make_context(info.clone());
        assert_ne!(a, b);
        assert_eq!(ctxmgr.len(), 2);
        assert_eq!(ctxmgr.context(a), Some(info));

        ctxmgr.destroy_context(a);
        assert!(ctxmgr.context(a).is_none());
        assert_eq!(ctxmgr.len(), 1);
    }
}
