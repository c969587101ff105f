// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! A host for smart contracts of several runtimes.
//!
//! Each contract call runs in a [`Context`], created by the [`XBridge`]
//! through the driver registered for the contract's [`ContractType`]. The
//! context reads and writes chain state through a [`StateSandbox`], and is
//! metered against its [`Limits`].
//!
//! The [`Manager`] is what a chain embeds: it owns the bridge, the kernel
//! contracts, and deploys and upgrades contracts.
//!
//! Native contracts are standalone binaries, run as processes on the host or
//! in docker containers. They are written against `xbridge-uplink`.

mod bridge;
mod code_provider;
mod context;
mod contract_manager;
mod descriptor;
mod error;
mod instance;
mod limits;
mod manager;
mod registry;
mod syscall;

pub mod config;
pub mod kernel;
pub mod mock;
pub mod native;
pub mod sandbox;
pub mod util;

pub use bridge::{VmContext, WeakXBridge, XBridge, XBridgeConfig, INIT_METHOD};
pub use code_provider::{
    ContractCodeProvider, DescProvider, ReaderCodeProvider, SandboxCodeProvider,
};
pub use context::{Context, ContextConfig, ContextInfo, ContextManager};
pub use contract_manager::parse_init_args;
pub use descriptor::{
    abi_key, code_desc_key, code_key, double_sha256, ContractType, Descriptor,
    CONTRACT_BUCKET,
};
pub use error::Error;
pub use instance::{Instance, InstanceCreator, InstanceCreatorConfig};
pub use kernel::{KContext, KernRegistry};
pub use limits::{
    GasPrice, Limits, ResourceLimit, ResourceType, MAX_LIMITS,
};
pub use manager::{ChainCore, Manager, ManagerConfig, CONTRACT_KERNEL};
pub use registry::{CreatorRegistry, NewInstanceCreatorFunc};
pub use sandbox::{StateSandbox, XMReader};
pub use syscall::SyscallService;

// re-exports

pub use xbridge_uplink::{Args, Response};
