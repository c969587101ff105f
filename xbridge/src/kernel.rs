// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Contracts implemented by the host itself.
//!
//! Kernel methods are plain Rust functions registered under a contract and
//! method name. They run against a [`KContext`], which gives them the
//! calling context's sandbox, arguments and resource accounting.

mod instance;
mod kcontext;
mod registry;

pub use instance::{new_kernel_creator, KernelCreator};
pub use kcontext::{KContext, KernelContext};
pub use registry::{KernMethod, KernRegistry};
