// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Native contracts: standalone binaries run as host processes or docker
//! containers.
//!
//! One process is kept per deployed version of a contract and reused across
//! calls. The host talks to it over the channel in [`xbridge_uplink`],
//! serving its syscalls while a call is in flight.

mod channel;
mod docker;
mod host;
mod instance;
mod process;
mod process_manager;

pub use docker::DockerProcess;
pub use host::HostProcess;
pub use instance::{new_native_creator, NativeCreator};
pub use process::{
    ContractProcess, DefaultLauncher, Launcher, Process, ProcessSpec,
    ProcessState,
};
pub use process_manager::ProcessManager;
