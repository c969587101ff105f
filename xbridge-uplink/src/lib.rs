// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Types shared between the `xbridge` host and the native contracts it runs.
//!
//! A native contract is a standalone binary. It listens on the address given
//! in [`ENV_CODE_ADDR`], answers [`Request`]s from the host, and reaches back
//! into chain state by issuing [`Syscall`]s over the same connection. The
//! [`serve`] function drives that loop for contract authors.

mod types;
pub use types::*;

mod error;
pub use error::*;

mod wire;
pub use wire::*;

mod serve;
pub use serve::*;

/// Environment variable holding the number of seconds a native contract
/// waits for the host before exiting.
pub const ENV_PING_TIMEOUT: &str = "XCHAIN_PING_TIMEOUT";

/// Environment variable holding the address a native contract listens on.
pub const ENV_CODE_ADDR: &str = "XCHAIN_CODE_ADDR";

/// Default value of [`ENV_PING_TIMEOUT`], in seconds.
pub const PING_TIMEOUT_SECS: u64 = 3;

/// The largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
