// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use tracing::{debug, info};
use xbridge_uplink::{Entry, Response, Syscall, SyscallReply};

use crate::context::ContextManager;
use crate::sandbox::ContractEvent;
use crate::{Context, Error, Limits};

/// Serves the requests running contracts make back into the chain.
///
/// Object keys live in a bucket named after the contract making the
/// request. Writes and events are charged to the disk dimension of `used`.
#[derive(Debug, Clone)]
pub struct SyscallService {
    ctxmgr: Arc<ContextManager>,
}

impl SyscallService {
    pub fn new(ctxmgr: Arc<ContextManager>) -> Self {
        Self { ctxmgr }
    }

    /// Handles one syscall made by the contract running in `ctx`.
    ///
    /// Failures are reported to the contract in the reply rather than
    /// aborting the call.
    pub fn dispatch(
        &self,
        ctx: &mut Context,
        used: &mut Limits,
        call: Syscall,
    ) -> SyscallReply {
        if self.ctxmgr.context(ctx.id).is_none() {
            return SyscallReply::Error(format!("context {} not found", ctx.id));
        }

        match self.handle(ctx, used, call) {
            Ok(reply) => reply,
            Err(err) => {
                debug!("syscall from context {} failed: {err}", ctx.id);
                SyscallReply::Error(err.to_string())
            }
        }
    }

    fn handle(
        &self,
        ctx: &mut Context,
        used: &mut Limits,
        call: Syscall,
    ) -> Result<SyscallReply, Error> {
        let bucket = ctx.contract_name.clone();

        match call {
            Syscall::GetObject { key } => {
                let value = ctx.state.get(&bucket, &key)?;
                Ok(SyscallReply::Value(value))
            }
            Syscall::PutObject { key, value } => {
                charge_disk(used, key.len() + value.len());
                ctx.state.put(&bucket, &key, value)?;
                Ok(SyscallReply::Done)
            }
            Syscall::DeleteObject { key } => {
                charge_disk(used, key.len());
                ctx.state.del(&bucket, &key)?;
                Ok(SyscallReply::Done)
            }
            Syscall::Select { start, end } => {
                let entries = ctx
                    .state
                    .select(&bucket, &start, &end)?
                    .into_iter()
                    .map(|(key, value)| Entry { key, value })
                    .collect();
                Ok(SyscallReply::Entries(entries))
            }
            Syscall::Transfer { to, amount } => {
                ctx.state.transfer(&ctx.contract_name, &to, amount)?;
                Ok(SyscallReply::Done)
            }
            Syscall::EmitEvent { name, body } => {
                charge_disk(used, name.len() + body.len());
                let event = ContractEvent {
                    contract: ctx.contract_name.clone(),
                    name,
                    body,
                };
                ctx.state.add_event(event.clone());
                ctx.events.push(event);
                Ok(SyscallReply::Done)
            }
            Syscall::Call {
                module,
                contract,
                method,
                args,
            } => {
                let result = ctx.bridge().contract_call(
                    ctx, *used, &module, &contract, &method, args,
                );
                match result {
                    Ok((response, callee_used)) => {
                        used.add(callee_used);
                        Ok(SyscallReply::Response(response))
                    }
                    Err(Error::ContractError { status, message }) => {
                        Ok(SyscallReply::Response(Response::error_with_status(
                            status, message,
                        )))
                    }
                    Err(err) => Err(err),
                }
            }
            Syscall::Log { entry } => {
                info!(
                    ctxid = ctx.id,
                    contract = %ctx.contract_name,
                    "{entry}"
                );
                Ok(SyscallReply::Done)
            }
        }
    }
}

fn charge_disk(used: &mut Limits, bytes: usize) {
    used.disk = used.disk.saturating_add(bytes as i64);
}
