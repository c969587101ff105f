// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fs;
use std::sync::Arc;

use tracing::{trace, warn};
use xbridge_uplink::Invoke;

use crate::code_provider::ContractCodeProvider;
use crate::config::VmConfig;
use crate::instance::{Instance, InstanceCreator, InstanceCreatorConfig};
use crate::native::{channel, ContractProcess, DefaultLauncher, ProcessManager};
use crate::syscall::SyscallService;
use crate::{Context, Error, Limits};

/// Opens the native driver, keeping contract binaries under the configured
/// base directory.
pub fn new_native_creator(
    config: &InstanceCreatorConfig,
) -> Result<Box<dyn InstanceCreator>, Error> {
    let VmConfig::Native(native) = &config.vm_config else {
        return Err(Error::Config(
            format!(
                "native driver opened with {} config",
                config.vm_config.driver_name()
            )
            .into(),
        ));
    };

    fs::create_dir_all(&config.basedir)?;

    let pm = ProcessManager::new(
        config.basedir.clone(),
        Box::new(DefaultLauncher::new(native.clone())),
        native.stop_timeout(),
    );
    Ok(Box::new(NativeCreator::new(pm, config.syscall.clone())))
}

/// Creates instances backed by contract processes.
pub struct NativeCreator {
    pm: ProcessManager,
    syscall: SyscallService,
}

impl NativeCreator {
    pub fn new(pm: ProcessManager, syscall: SyscallService) -> Self {
        Self { pm, syscall }
    }

    pub fn process_manager(&self) -> &ProcessManager {
        &self.pm
    }
}

impl InstanceCreator for NativeCreator {
    fn create_instance(
        &self,
        ctx: &Context,
        cp: &dyn ContractCodeProvider,
    ) -> Result<Box<dyn Instance>, Error> {
        let process = self.pm.get_process(&ctx.contract_name, cp)?;
        Ok(Box::new(NativeInstance {
            process,
            syscall: self.syscall.clone(),
            used: Limits::default(),
        }))
    }

    fn remove_cache(&self, name: &str) {
        self.pm.remove(name);
    }
}

struct NativeInstance {
    process: Arc<ContractProcess>,
    syscall: SyscallService,
    used: Limits,
}

impl Instance for NativeInstance {
    fn exec(&mut self, ctx: &mut Context) -> Result<(), Error> {
        let invoke = Invoke {
            ctx_id: ctx.id,
            contract: ctx.contract_name.clone(),
            method: ctx.method.clone(),
            args: ctx.args.clone(),
            initiator: ctx.initiator.clone(),
            caller: ctx.caller.clone(),
            auth_require: ctx.auth_require.clone(),
            transfer_amount: ctx.transfer_amount,
        };
        trace!("invoking {}.{} in context {}", ctx.contract_name, ctx.method, ctx.id);

        let syscall = &self.syscall;
        let used = &mut self.used;
        let response = self.process.with_stream(|stream| {
            channel::invoke(stream, invoke, |call| {
                syscall.dispatch(ctx, used, call)
            })
        })?;

        ctx.output = Some(response);
        Ok(())
    }

    fn resource_used(&self) -> Limits {
        self.used
    }

    fn release(&mut self) {}

    fn abort(&mut self, msg: &str) {
        warn!("aborting contract {}: {msg}", self.process.name());
        self.process.reset_connection();
    }
}
