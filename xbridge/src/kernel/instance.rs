// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use tracing::trace;

use crate::code_provider::ContractCodeProvider;
use crate::config::VmConfig;
use crate::instance::{Instance, InstanceCreator, InstanceCreatorConfig};
use crate::kernel::{KContext, KernRegistry, KernelContext};
use crate::{Context, Error, Limits};

/// Opens the kernel driver. The configuration must carry the registry the
/// methods are resolved from.
pub fn new_kernel_creator(
    config: &InstanceCreatorConfig,
) -> Result<Box<dyn InstanceCreator>, Error> {
    match &config.vm_config {
        VmConfig::Kernel(_, registry) => Ok(Box::new(KernelCreator {
            registry: registry.clone(),
        })),
        other => Err(Error::Config(
            format!("kernel driver opened with {} config", other.driver_name())
                .into(),
        )),
    }
}

/// Creates instances that run registered kernel methods.
pub struct KernelCreator {
    registry: Arc<KernRegistry>,
}

impl InstanceCreator for KernelCreator {
    fn create_instance(
        &self,
        _ctx: &Context,
        _cp: &dyn ContractCodeProvider,
    ) -> Result<Box<dyn Instance>, Error> {
        Ok(Box::new(KernelInstance {
            registry: self.registry.clone(),
            used: Limits::default(),
        }))
    }

    fn remove_cache(&self, _name: &str) {}
}

struct KernelInstance {
    registry: Arc<KernRegistry>,
    used: Limits,
}

impl Instance for KernelInstance {
    fn exec(&mut self, ctx: &mut Context) -> Result<(), Error> {
        // the method is only known once the context is invoked
        let method =
            self.registry.get_kern_method(&ctx.contract_name, &ctx.method)?;
        trace!("running kernel method {}.{}", ctx.contract_name, ctx.method);

        let response = {
            let mut kctx = KernelContext::new(ctx, &mut self.used);
            method(&mut kctx as &mut dyn KContext)?
        };
        ctx.output = Some(response);

        Ok(())
    }

    fn resource_used(&self) -> Limits {
        self.used
    }

    fn release(&mut self) {}

    fn abort(&mut self, _msg: &str) {}
}
