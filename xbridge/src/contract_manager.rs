// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use xbridge_uplink::{Args, Response};

use crate::bridge::INIT_METHOD;
use crate::code_provider::{ContractCodeProvider, SandboxCodeProvider};
use crate::descriptor::{
    abi_key, code_desc_key, code_key, double_sha256, CONTRACT_BUCKET,
};
use crate::kernel::KContext;
use crate::{
    ContextConfig, ContractType, Descriptor, Error, Limits, XBridge,
    MAX_LIMITS,
};

fn required<'a>(args: &'a Args, name: &'static str) -> Result<&'a [u8], Error> {
    args.get(name)
        .map(Vec::as_slice)
        .ok_or(Error::MissingArgument(name))
}

pub(crate) fn contract_name_arg(args: &Args) -> Result<String, Error> {
    let raw = required(args, "contract_name")?;
    String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidContractName {
        name: String::from_utf8_lossy(raw).into_owned(),
        reason: "not valid utf-8".into(),
    })
}

/// A value of the `init_args` map: either text, taken as its UTF-8 bytes,
/// or a list of bytes.
#[derive(Deserialize)]
#[serde(untagged)]
enum InitArg {
    Text(String),
    Bytes(Vec<u8>),
}

/// Parses the JSON object passed to `initialize` on deploy.
pub fn parse_init_args(buf: &[u8]) -> Result<Args, Error> {
    let raw: BTreeMap<String, InitArg> = serde_json::from_slice(buf)
        .map_err(|err| Error::InvalidInitArgs(Arc::new(err)))?;

    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                InitArg::Text(s) => s.into_bytes(),
                InitArg::Bytes(b) => b,
            };
            (k, v)
        })
        .collect())
}

impl XBridge {
    /// Deploys a contract within the transaction of `kctx` and runs its
    /// `initialize` method.
    ///
    /// Expects `contract_name`, `contract_code`, `contract_desc` and
    /// `init_args` among the arguments, and `contract_abi` for EVM
    /// contracts. Returns the response of `initialize` and the resources it
    /// used.
    pub fn deploy_contract(
        &self,
        kctx: &dyn KContext,
    ) -> Result<(Response, Limits), Error> {
        let args = kctx.args();
        let name = contract_name_arg(args)?;
        let state = kctx.state().clone();

        match SandboxCodeProvider::new(state.clone()).get_contract_code_desc(&name)
        {
            Ok(_) => return Err(Error::ContractExists(name)),
            Err(Error::ContractNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let code = required(args, "contract_code")?.to_vec();
        let init_args = parse_init_args(required(args, "init_args")?)?;

        let mut desc = Descriptor::from_bytes(required(args, "contract_desc")?)?;
        desc.digest = double_sha256(&code);

        let tp = desc.contract_type()?;
        let creator = self.creator(tp)?;

        state.put(CONTRACT_BUCKET, &code_desc_key(&name), desc.to_bytes()?)?;
        state.put(CONTRACT_BUCKET, &code_key(&name), code)?;
        if tp == ContractType::Evm {
            if let Some(abi) = args.get("contract_abi") {
                state.put(CONTRACT_BUCKET, &abi_key(&name), abi.clone())?;
            }
        }

        // make sure the code loads before running anything
        let trial = self.make_context(ContextConfig {
            resource_limits: kctx.resource_limit(),
            ..ContextConfig::new(state.clone(), tp.as_str(), name.clone())
        });
        let loaded = creator
            .create_instance(&trial, &SandboxCodeProvider::new(state.clone()));
        self.destroy_context(trial.id);
        match loaded {
            Ok(mut instance) => instance.release(),
            Err(err) => {
                warn!("contract {name} failed to load: {err}");
                creator.remove_cache(&name);
                return Err(err);
            }
        }

        let init_cfg = ContextConfig {
            initiator: kctx.initiator().to_owned(),
            auth_require: kctx.auth_require().to_vec(),
            resource_limits: kctx.resource_limit(),
            can_initialize: true,
            contract_code_from_cache: true,
            ..ContextConfig::new(state, tp.as_str(), name.clone())
        };

        match self.init_contract(init_cfg, init_args) {
            Ok((response, used)) => {
                info!("deployed {tp} contract {name}");
                Ok((response, used))
            }
            Err(err) => {
                if !err.is_contract_error() {
                    creator.remove_cache(&name);
                }
                Err(err)
            }
        }
    }

    fn init_contract(
        &self,
        cfg: ContextConfig,
        args: Args,
    ) -> Result<(Response, Limits), Error> {
        let mut ctx = self.new_context(cfg)?;
        let response = ctx.invoke(INIT_METHOD, args)?;
        let used = ctx.resource_used();
        ctx.release();
        Ok((response, used))
    }

    /// Replaces the code of an existing contract within the transaction of
    /// `kctx`, keeping its type and runtime.
    ///
    /// `initialize` is not run again. The returned limits charge the bytes
    /// written by the transaction so far to disk.
    pub fn upgrade_contract(
        &self,
        kctx: &dyn KContext,
    ) -> Result<(Response, Limits), Error> {
        if !self.config().enable_upgrade {
            return Err(Error::UpgradeDisabled);
        }

        let args = kctx.args();
        let name = contract_name_arg(args)?;
        let state = kctx.state().clone();

        let cp = SandboxCodeProvider::new(state.clone());
        let mut desc = cp.get_contract_code_desc(&name)?;

        let code = required(args, "contract_code")?.to_vec();
        desc.digest = double_sha256(&code);

        let tp = desc.contract_type()?;
        let creator = self.creator(tp)?;

        state.put(CONTRACT_BUCKET, &code_desc_key(&name), desc.to_bytes()?)?;
        state.put(CONTRACT_BUCKET, &code_key(&name), code)?;

        let trial = self.make_context(ContextConfig {
            resource_limits: MAX_LIMITS,
            ..ContextConfig::new(state.clone(), tp.as_str(), name.clone())
        });
        let loaded = creator.create_instance(&trial, &cp);
        self.destroy_context(trial.id);
        loaded?.release();

        let disk = state
            .rwset()
            .wset
            .iter()
            .map(|w| w.key.len() + w.value.as_ref().map_or(0, Vec::len))
            .sum::<usize>() as i64;

        info!("upgraded {tp} contract {name}");
        Ok((
            Response::ok("upgrade success"),
            Limits {
                disk,
                ..Limits::default()
            },
        ))
    }
}
