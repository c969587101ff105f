// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::path::PathBuf;

use crate::code_provider::ContractCodeProvider;
use crate::config::VmConfig;
use crate::syscall::SyscallService;
use crate::{Context, Error, Limits};

/// A running contract execution unit, paired with exactly one [`Context`].
pub trait Instance: Send {
    /// Runs `ctx.method` with `ctx.args`, leaving the result in
    /// `ctx.output`.
    fn exec(&mut self, ctx: &mut Context) -> Result<(), Error>;

    /// Resources consumed so far.
    fn resource_used(&self) -> Limits;

    fn release(&mut self);

    fn abort(&mut self, msg: &str);
}

/// Produces instances for one contract runtime.
pub trait InstanceCreator: Send + Sync {
    fn create_instance(
        &self,
        ctx: &Context,
        cp: &dyn ContractCodeProvider,
    ) -> Result<Box<dyn Instance>, Error>;

    /// Drops anything cached for the contract `name`.
    fn remove_cache(&self, name: &str);
}

/// What a driver is given when it is opened.
#[derive(Clone)]
pub struct InstanceCreatorConfig {
    /// Directory the driver may keep its files in.
    pub basedir: PathBuf,
    pub syscall: SyscallService,
    pub vm_config: VmConfig,
}
