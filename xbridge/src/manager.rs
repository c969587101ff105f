// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use xbridge_uplink::Response;

use crate::bridge::{VmContext, WeakXBridge, XBridgeConfig};
use crate::config::ContractConfig;
use crate::contract_manager::contract_name_arg;
use crate::kernel::{KContext, KernRegistry};
use crate::registry::CreatorRegistry;
use crate::sandbox::{StateSandbox, XMReader};
use crate::util::{
    account_contract_key, valid_contract_name, ACCOUNT2CONTRACT_BUCKET,
    ACCOUNT_BUCKET, ACCOUNT_CONTRACT_VALUE, CONTRACT2ACCOUNT_BUCKET,
};
use crate::{ContextConfig, Error, XBridge};

/// The kernel contract managing deployed contracts.
pub const CONTRACT_KERNEL: &str = "$contract";

/// What the host needs from the chain it runs on.
pub trait ChainCore: Send + Sync {
    /// Whether `auth_require` may call `method` of `contract`. Asked for
    /// every call a contract makes into another.
    fn verify_contract_permission(
        &self,
        initiator: &str,
        auth_require: &[String],
        contract: &str,
        method: &str,
    ) -> Result<bool, Error>;

    /// Fails unless `auth_require` satisfies the owner of `contract`.
    fn verify_contract_owner_permission(
        &self,
        contract: &str,
        auth_require: &[String],
    ) -> Result<(), Error>;
}

/// Configuration of a [`Manager`].
pub struct ManagerConfig {
    /// Must be an absolute path.
    pub basedir: PathBuf,
    pub chain_name: String,
    pub core: Arc<dyn ChainCore>,
    /// Committed chain state.
    pub reader: Arc<dyn XMReader>,
    pub config: ContractConfig,
}

/// The entry point for running contracts on a chain.
///
/// Owns the [`XBridge`] and the kernel registry, and registers the kernel
/// methods that deploy and upgrade contracts.
pub struct Manager {
    bridge: XBridge,
    kregistry: Arc<KernRegistry>,
    core: Arc<dyn ChainCore>,
}

impl Manager {
    /// Creates a manager with the drivers shipped with this crate.
    pub fn new(cfg: ManagerConfig) -> Result<Self, Error> {
        Self::with_creators(cfg, &CreatorRegistry::with_builtin())
    }

    /// Creates a manager choosing drivers from `creators`.
    pub fn with_creators(
        cfg: ManagerConfig,
        creators: &CreatorRegistry,
    ) -> Result<Self, Error> {
        if !cfg.basedir.is_absolute() {
            return Err(Error::Config(
                format!(
                    "base dir of contract manager must be absolute, got {}",
                    cfg.basedir.display()
                )
                .into(),
            ));
        }
        if cfg.chain_name.is_empty() {
            return Err(Error::Config("chain name is empty".into()));
        }
        cfg.config.validate()?;

        let kregistry = Arc::new(KernRegistry::new());
        let bridge = XBridge::new(
            XBridgeConfig {
                basedir: cfg.basedir,
                chain_name: cfg.chain_name,
                reader: cfg.reader,
                config: cfg.config,
                kern_registry: kregistry.clone(),
                core: cfg.core.clone(),
            },
            creators,
        )?;

        let weak = bridge.downgrade();
        let core = cfg.core.clone();
        kregistry.register_kern_method(
            CONTRACT_KERNEL,
            "deployContract",
            move |ctx: &mut dyn KContext| deploy_contract(&weak, ctx),
        );

        let weak = bridge.downgrade();
        kregistry.register_kern_method(
            CONTRACT_KERNEL,
            "upgradeContract",
            move |ctx: &mut dyn KContext| {
                upgrade_contract(&weak, core.as_ref(), ctx)
            },
        );

        kregistry.register_shortcut("Deploy", CONTRACT_KERNEL, "deployContract");
        kregistry.register_shortcut(
            "Upgrade",
            CONTRACT_KERNEL,
            "upgradeContract",
        );

        info!("contract manager started for chain {}", bridge.chain_name());

        Ok(Self {
            bridge,
            kregistry,
            core: cfg.core,
        })
    }

    /// Creates a context for calling a contract.
    pub fn new_context(&self, cfg: ContextConfig) -> Result<VmContext, Error> {
        self.bridge.new_context(cfg)
    }

    /// A fresh sandbox over `reader`, for one transaction.
    pub fn new_state_sandbox(&self, reader: Arc<dyn XMReader>) -> StateSandbox {
        StateSandbox::new(reader)
    }

    pub fn kern_registry(&self) -> &Arc<KernRegistry> {
        &self.kregistry
    }

    pub fn bridge(&self) -> &XBridge {
        &self.bridge
    }

    pub fn core(&self) -> &Arc<dyn ChainCore> {
        &self.core
    }
}

fn live(weak: &WeakXBridge) -> Result<XBridge, Error> {
    weak.upgrade()
        .ok_or_else(|| Error::Config("contract manager is shut down".into()))
}

fn deploy_contract(
    weak: &WeakXBridge,
    ctx: &mut dyn KContext,
) -> Result<Response, Error> {
    let bridge = live(weak)?;

    let account = ctx
        .args()
        .get("account_name")
        .ok_or(Error::MissingArgument("account_name"))?;
    let account = String::from_utf8_lossy(account).into_owned();
    let contract = contract_name_arg(ctx.args())?;

    valid_contract_name(&contract)?;

    if ctx.get(ACCOUNT_BUCKET, account.as_bytes())?.is_none() {
        return Err(Error::AccountNotFound(account));
    }

    let (response, used) = bridge.deploy_contract(&*ctx)?;
    ctx.add_resource_used(used);

    ctx.put(
        CONTRACT2ACCOUNT_BUCKET,
        contract.as_bytes(),
        account.clone().into_bytes(),
    )?;
    ctx.put(
        ACCOUNT2CONTRACT_BUCKET,
        account_contract_key(&account, &contract).as_bytes(),
        ACCOUNT_CONTRACT_VALUE.into(),
    )?;

    Ok(response)
}

fn upgrade_contract(
    weak: &WeakXBridge,
    core: &dyn ChainCore,
    ctx: &mut dyn KContext,
) -> Result<Response, Error> {
    let bridge = live(weak)?;

    let contract = contract_name_arg(ctx.args())?;
    core.verify_contract_owner_permission(&contract, ctx.auth_require())?;

    let (response, used) = bridge.upgrade_contract(&*ctx)?;
    ctx.add_resource_used(used);

    Ok(response)
}
