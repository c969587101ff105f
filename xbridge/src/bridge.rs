// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tracing::{debug, info, trace};
use xbridge_uplink::{Args, Response, STATUS_ERROR};

use crate::code_provider::{
    ContractCodeProvider, DescProvider, ReaderCodeProvider,
    SandboxCodeProvider,
};
use crate::config::ContractConfig;
use crate::context::{ContextInfo, ContextManager};
use crate::instance::{Instance, InstanceCreator, InstanceCreatorConfig};
use crate::kernel::KernRegistry;
use crate::manager::ChainCore;
use crate::registry::CreatorRegistry;
use crate::sandbox::XMReader;
use crate::syscall::SyscallService;
use crate::{
    Context, ContextConfig, ContractType, Descriptor, Error, Limits,
};

/// The method run once, when a contract is deployed.
pub const INIT_METHOD: &str = "initialize";

/// Everything needed to bring up an [`XBridge`].
pub struct XBridgeConfig {
    /// Drivers keep their files under `<basedir>/<driver name>`.
    pub basedir: PathBuf,
    pub chain_name: String,
    /// Committed chain state.
    pub reader: Arc<dyn XMReader>,
    pub config: ContractConfig,
    pub kern_registry: Arc<KernRegistry>,
    /// Decides which cross-contract calls are allowed.
    pub core: Arc<dyn ChainCore>,
}

struct XBridgeInner {
    ctxmgr: Arc<ContextManager>,
    syscall: SyscallService,
    creators: BTreeMap<ContractType, Box<dyn InstanceCreator>>,
    reader: Arc<dyn XMReader>,
    core: Arc<dyn ChainCore>,
    config: ContractConfig,
    chain_name: String,
}

/// Creates contexts for contract calls, dispatching each to the driver of
/// its contract type.
///
/// Cloning an `XBridge` gives another handle to the same bridge.
#[derive(Clone)]
pub struct XBridge {
    inner: Arc<XBridgeInner>,
}

impl Debug for XBridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("XBridge")
            .field("chain_name", &self.inner.chain_name)
            .field("creators", &self.inner.creators.keys())
            .field("contexts", &self.inner.ctxmgr.len())
            .finish()
    }
}

impl XBridge {
    /// Opens the configured driver of every enabled contract type.
    ///
    /// Types that are disabled are skipped, and contracts of those types
    /// cannot be called.
    pub fn new(
        cfg: XBridgeConfig,
        registry: &CreatorRegistry,
    ) -> Result<Self, Error> {
        let ctxmgr = Arc::new(ContextManager::new());
        let syscall = SyscallService::new(ctxmgr.clone());

        let mut creators = BTreeMap::new();
        for tp in ContractType::ALL {
            let Some(vm_config) = cfg.config.vm_config(tp, &cfg.kern_registry)
            else {
                debug!("contract type {tp} disabled");
                continue;
            };

            let driver = vm_config.driver_name().to_owned();
            let creator_config = InstanceCreatorConfig {
                basedir: cfg.basedir.join(&driver),
                syscall: syscall.clone(),
                vm_config,
            };

            let creator = registry.open(tp, &driver, &creator_config)?;
            info!("opened driver {driver} for contract type {tp}");
            creators.insert(tp, creator);
        }

        Ok(Self {
            inner: Arc::new(XBridgeInner {
                ctxmgr,
                syscall,
                creators,
                reader: cfg.reader,
                core: cfg.core,
                config: cfg.config,
                chain_name: cfg.chain_name,
            }),
        })
    }

    pub fn chain_name(&self) -> &str {
        &self.inner.chain_name
    }

    pub fn config(&self) -> &ContractConfig {
        &self.inner.config
    }

    pub fn context_manager(&self) -> &ContextManager {
        &self.inner.ctxmgr
    }

    pub fn syscall_service(&self) -> &SyscallService {
        &self.inner.syscall
    }

    /// Returns true if a driver was opened for `tp`.
    pub fn has_creator(&self, tp: ContractType) -> bool {
        self.inner.creators.contains_key(&tp)
    }

    pub(crate) fn creator(
        &self,
        tp: ContractType,
    ) -> Result<&dyn InstanceCreator, Error> {
        self.inner
            .creators
            .get(&tp)
            .map(AsRef::as_ref)
            .ok_or(Error::DriverDisabled(tp))
    }

    pub fn downgrade(&self) -> WeakXBridge {
        WeakXBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a context without an instance.
    pub(crate) fn make_context(&self, cfg: ContextConfig) -> Context {
        let id = self.inner.ctxmgr.make_context(ContextInfo {
            module: cfg.module.clone(),
            contract_name: cfg.contract_name.clone(),
        });
        Context::new(id, cfg, self.clone())
    }

    pub(crate) fn destroy_context(&self, id: u64) {
        self.inner.ctxmgr.destroy_context(id);
    }

    /// Creates a context for calling a contract, along with its instance.
    pub fn new_context(&self, cfg: ContextConfig) -> Result<VmContext, Error> {
        let desc = if cfg.module == ContractType::Kernel.as_str() {
            Descriptor::new("", cfg.module.clone())
        } else {
            SandboxCodeProvider::new(cfg.state.clone())
                .get_contract_code_desc(&cfg.contract_name)?
        };

        let tp = desc.contract_type()?;
        let creator = self.creator(tp)?;

        let from_cache = cfg.contract_code_from_cache;
        let ctx = self.make_context(cfg);

        // code being deployed is only visible through the sandbox
        let instance = if from_cache {
            let cp = SandboxCodeProvider::new(ctx.state.clone());
            creator.create_instance(&ctx, &cp)
        } else {
            let cp = DescProvider::new(
                ReaderCodeProvider::new(self.inner.reader.clone()),
                desc,
            );
            creator.create_instance(&ctx, &cp)
        };

        match instance {
            Ok(instance) => {
                trace!(
                    "context {} created for {}.{}",
                    ctx.id,
                    ctx.module,
                    ctx.contract_name
                );
                Ok(VmContext::new(ctx, instance))
            }
            Err(err) => {
                self.destroy_context(ctx.id);
                Err(err)
            }
        }
    }

    /// Calls `method` of `contract` on behalf of the contract running in
    /// `caller`, sharing its sandbox.
    ///
    /// The call is refused before anything runs if `contract` is already on
    /// the caller's call stack, or if the chain does not permit it. Returns
    /// the response along with the resources the callee used.
    pub fn contract_call(
        &self,
        caller: &Context,
        caller_used: Limits,
        module: &str,
        contract: &str,
        method: &str,
        args: Args,
    ) -> Result<(Response, Limits), Error> {
        if caller.contract_set.contains(contract) {
            return Err(Error::RecursiveCall(contract.to_owned()));
        }

        let allowed = self.inner.core.verify_contract_permission(
            &caller.initiator,
            &caller.auth_require,
            contract,
            method,
        )?;
        if !allowed {
            let msg = format!(
                "{} may not call {contract}.{method}",
                caller.contract_name
            );
            return Err(Error::PermissionDenied(msg.into()));
        }

        let mut contract_set = caller.contract_set.clone();
        contract_set.insert(contract.to_owned());

        let mut limits = caller.resource_limits;
        limits.sub(caller_used);

        let cfg = ContextConfig {
            initiator: caller.initiator.clone(),
            auth_require: caller.auth_require.clone(),
            caller: caller.contract_name.clone(),
            resource_limits: limits,
            contract_set: Some(contract_set),
            ..ContextConfig::new(caller.state.clone(), module, contract)
        };

        let mut ctx = self.new_context(cfg)?;
        let response = ctx.invoke(method, args)?;
        let used = ctx.resource_used();
        ctx.release();

        Ok((response, used))
    }
}

/// A handle to an [`XBridge`] that does not keep it alive.
#[derive(Clone)]
pub struct WeakXBridge {
    inner: Weak<XBridgeInner>,
}

impl WeakXBridge {
    pub fn upgrade(&self) -> Option<XBridge> {
        self.inner.upgrade().map(|inner| XBridge { inner })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Ready,
    Invoked,
    Released,
}

/// A context paired with its instance, ready to be invoked once.
///
/// Dropping a `VmContext` releases it.
pub struct VmContext {
    ctx: Context,
    instance: Box<dyn Instance>,
    state: ContextState,
}

impl VmContext {
    fn new(ctx: Context, instance: Box<dyn Instance>) -> Self {
        Self {
            ctx,
            instance,
            state: ContextState::Ready,
        }
    }

    pub fn id(&self) -> u64 {
        self.ctx.id
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Runs `method` with `args`.
    ///
    /// A context may only be invoked once. The call fails if the instance
    /// used more resources than the context allows, or produced no output.
    pub fn invoke(
        &mut self,
        method: &str,
        args: Args,
    ) -> Result<Response, Error> {
        if self.state != ContextState::Ready {
            return Err(Error::ContextInvoked(self.ctx.id));
        }
        if method == INIT_METHOD && !self.ctx.can_initialize {
            return Err(Error::InitializeNotAllowed(method.to_owned()));
        }
        self.state = ContextState::Invoked;

        self.ctx.method = method.to_owned();
        self.ctx.args = args;

        self.instance.exec(&mut self.ctx)?;

        if self
            .instance
            .resource_used()
            .exceed(&self.ctx.resource_limits)
        {
            return Err(Error::ResourceExceeded);
        }

        self.ctx.output.clone().ok_or_else(|| Error::ContractError {
            status: STATUS_ERROR,
            message: "internal error".into(),
        })
    }

    pub fn resource_used(&self) -> Limits {
        self.instance.resource_used()
    }

    /// Releases the instance and forgets the context.
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.state == ContextState::Released {
            return;
        }
        self.instance.release();
        self.ctx.bridge().destroy_context(self.ctx.id);
        self.state = ContextState::Released;
        trace!("context {} released", self.ctx.id);
    }
}

impl Drop for VmContext {
    fn drop(&mut self) {
        self.do_release();
    }
}
