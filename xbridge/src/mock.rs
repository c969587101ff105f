// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! A self-contained chain for exercising contracts in tests.

use std::path::Path;
use std::sync::Arc;

use rand::RngCore;
use tempfile::TempDir;

use crate::config::ContractConfig;
use crate::sandbox::{MemXModel, PureData, StateSandbox, VersionedData};
use crate::util::ACCOUNT_BUCKET;
use crate::{
    Args, ChainCore, ContextConfig, ContractType, CreatorRegistry, Descriptor,
    Error, Manager, ManagerConfig, Response, CONTRACT_KERNEL, MAX_LIMITS,
};

/// The account contracts are deployed under.
pub const CONTRACT_ACCOUNT: &str = "XC1111111111111111@xuper";

/// A chain that grants every permission.
#[derive(Debug, Default)]
pub struct FakeChainCore;

impl ChainCore for FakeChainCore {
    fn verify_contract_permission(
        &self,
        _initiator: &str,
        _auth_require: &[String],
        _contract: &str,
        _method: &str,
    ) -> Result<bool, Error> {
        Ok(true)
    }

    fn verify_contract_owner_permission(
        &self,
        _contract: &str,
        _auth_require: &[String],
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// A [`Manager`] over in-memory state, with [`CONTRACT_ACCOUNT`] already
/// created. Every successful call is committed.
pub struct TestHelper {
    manager: Manager,
    state: Arc<MemXModel>,
    basedir: TempDir,
}

impl TestHelper {
    pub fn new() -> Result<Self, Error> {
        Self::with_config(ContractConfig::default())
    }

    pub fn with_config(config: ContractConfig) -> Result<Self, Error> {
        Self::with_core(config, Arc::new(FakeChainCore))
    }

    pub fn with_core(
        config: ContractConfig,
        core: Arc<dyn ChainCore>,
    ) -> Result<Self, Error> {
        Self::with_creators(config, core, &CreatorRegistry::with_builtin())
    }

    /// A helper whose drivers are picked from `creators`.
    pub fn with_creators(
        config: ContractConfig,
        core: Arc<dyn ChainCore>,
        creators: &CreatorRegistry,
    ) -> Result<Self, Error> {
        let basedir = tempfile::tempdir()?;

        let state = Arc::new(MemXModel::new());
        state.put(VersionedData {
            pure: PureData::new(
                ACCOUNT_BUCKET,
                CONTRACT_ACCOUNT,
                Some(b"true".to_vec()),
            ),
            ref_txid: b"txid".to_vec(),
            ref_offset: 0,
        });

        let manager = Manager::with_creators(
            ManagerConfig {
                basedir: basedir.path().to_path_buf(),
                chain_name: "xuper".into(),
                core,
                reader: state.clone(),
                config,
            },
            creators,
        )?;

        Ok(Self {
            manager,
            state,
            basedir,
        })
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// The committed state.
    pub fn state(&self) -> &Arc<MemXModel> {
        &self.state
    }

    pub fn basedir(&self) -> &Path {
        self.basedir.path()
    }

    /// A sandbox over the committed state.
    pub fn sandbox(&self) -> StateSandbox {
        self.manager.new_state_sandbox(self.state.clone())
    }

    /// Commits everything `state` wrote, under a random transaction id.
    pub fn commit(&self, state: &StateSandbox) -> Result<(), Error> {
        state.flush()?;

        let mut txid = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut txid);
        self.state.commit(&state.rwset(), &txid);

        Ok(())
    }

    /// Deploys `code` as contract `name` of type `module`, running on
    /// `runtime`.
    pub fn deploy(
        &self,
        module: ContractType,
        runtime: &str,
        name: &str,
        code: &[u8],
        init_args: &Args,
    ) -> Result<Response, Error> {
        let init_args: serde_json::Map<String, serde_json::Value> = init_args
            .iter()
            .map(|(k, v)| {
                let v = match std::str::from_utf8(v) {
                    Ok(s) => serde_json::Value::from(s),
                    Err(_) => serde_json::Value::from(v.clone()),
                };
                (k.clone(), v)
            })
            .collect();
        let init_args = serde_json::to_vec(&init_args)
            .map_err(|err| Error::Serialization(err.to_string().into()))?;

        let desc = Descriptor::new(runtime, module.as_str());

        let mut args = Args::new();
        args.insert("account_name".into(), CONTRACT_ACCOUNT.into());
        args.insert("contract_name".into(), name.into());
        args.insert("contract_code".into(), code.to_vec());
        args.insert("contract_desc".into(), desc.to_bytes()?);
        args.insert("init_args".into(), init_args);

        self.invoke(
            ContractType::Kernel.as_str(),
            CONTRACT_KERNEL,
            "deployContract",
            args,
        )
    }

    /// Replaces the code of contract `name`.
    pub fn upgrade(&self, name: &str, code: &[u8]) -> Result<Response, Error> {
        let mut args = Args::new();
        args.insert("contract_name".into(), name.into());
        args.insert("contract_code".into(), code.to_vec());

        self.invoke(
            ContractType::Kernel.as_str(),
            CONTRACT_KERNEL,
            "upgradeContract",
            args,
        )
    }

    /// Calls `method` of `contract` in a transaction of its own.
    pub fn invoke(
        &self,
        module: &str,
        contract: &str,
        method: &str,
        args: Args,
    ) -> Result<Response, Error> {
        let state = self.sandbox();

        let mut ctx = self.manager.new_context(ContextConfig {
            initiator: CONTRACT_ACCOUNT.into(),
            resource_limits: MAX_LIMITS,
            ..ContextConfig::new(state.clone(), module, contract)
        })?;
        let response = ctx.invoke(method, args)?;
        ctx.release();

        self.commit(&state)?;
        Ok(response)
    }
}
