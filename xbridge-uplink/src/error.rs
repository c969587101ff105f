// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::borrow::Cow;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while talking over a contract channel.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Invalid code address: {0}")]
    InvalidAddr(Cow<'static, str>),
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("Connection closed")]
    Closed,
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Io(Arc<io::Error>),
    #[error(transparent)]
    Json(Arc<serde_json::Error>),
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),
    #[error("Syscall failed: {0}")]
    Syscall(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}
