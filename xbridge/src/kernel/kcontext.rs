// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use xbridge_uplink::{Args, Response};

use crate::sandbox::{ContractEvent, RWSet, StateSandbox};
use crate::{Context, Error, Limits};

/// What a kernel method sees of the call it serves.
pub trait KContext {
    fn args(&self) -> &Args;
    fn initiator(&self) -> &str;
    fn caller(&self) -> &str;
    fn auth_require(&self) -> &[String];
    /// The kernel contract being called.
    fn contract_name(&self) -> &str;

    /// The sandbox of the transaction.
    fn state(&self) -> &StateSandbox;

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.state().get(bucket, key)
    }

    fn select(
        &self,
        bucket: &str,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        self.state().select(bucket, start, end)
    }

    fn put(&self, bucket: &str, key: &[u8], value: Vec<u8>) -> Result<(), Error> {
        self.state().put(bucket, key, value)
    }

    fn del(&self, bucket: &str, key: &[u8]) -> Result<(), Error> {
        self.state().del(bucket, key)
    }

    fn transfer(&self, from: &str, to: &str, amount: u128) -> Result<(), Error> {
        self.state().transfer(from, to, amount)
    }

    fn rwset(&self) -> RWSet {
        self.state().rwset()
    }

    fn add_event(&mut self, event: ContractEvent);

    /// Charges `delta` to the call.
    fn add_resource_used(&mut self, delta: Limits);

    /// What the call is allowed to use.
    fn resource_limit(&self) -> Limits;

    /// Calls another contract within the same transaction.
    fn call(
        &mut self,
        module: &str,
        contract: &str,
        method: &str,
        args: Args,
    ) -> Result<Response, Error>;
}

/// A [`KContext`] over a live [`Context`], charging the kernel instance's
/// usage counter.
pub struct KernelContext<'a> {
    ctx: &'a mut Context,
    used: &'a mut Limits,
}

impl<'a> KernelContext<'a> {
    pub fn new(ctx: &'a mut Context, used: &'a mut Limits) -> Self {
        Self { ctx, used }
    }
}

impl KContext for KernelContext<'_> {
    fn args(&self) -> &Args {
        &self.ctx.args
    }

    fn initiator(&self) -> &str {
        &self.ctx.initiator
    }

    fn caller(&self) -> &str {
        &self.ctx.caller
    }

    fn auth_require(&self) -> &[String] {
        &self.ctx.auth_require
    }

    fn contract_name(&self) -> &str {
        &self.ctx.contract_name
    }

    fn state(&self) -> &StateSandbox {
        &self.ctx.state
    }

    fn add_event(&mut self, event: ContractEvent) {
        self.ctx.state.add_event(event.clone());
        self.ctx.events.push(event);
    }

    fn add_resource_used(&mut self, delta: Limits) {
        self.used.add(delta);
    }

    fn resource_limit(&self) -> Limits {
        self.ctx.resource_limits
    }

    fn call(
        &mut self,
        module: &str,
        contract: &str,
        method: &str,
        args: Args,
    ) -> Result<Response, Error> {
        let (response, used) = self.ctx.bridge().contract_call(
            self.ctx, *self.used, module, contract, method, args,
        )?;
        self.used.add(used);
        Ok(response)
    }
}
