// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::borrow::Cow;
use std::sync::Arc;

use thiserror::Error;

use crate::ContractType;

/// The error type returned by the contract host.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Account {0} does not exist")]
    AccountNotFound(String),
    #[error("Channel error: {0}")]
    Channel(#[from] xbridge_uplink::Error),
    #[error("Config error: {0}")]
    Config(Cow<'static, str>),
    #[error("Context already invoked: {0}")]
    ContextInvoked(u64),
    #[error("Contract error status:{status} message:{message}")]
    ContractError { status: i32, message: String },
    #[error("Contract {0} already exists")]
    ContractExists(String),
    #[error("Contract {0} does not exist")]
    ContractNotFound(String),
    #[error("Docker error: {0}")]
    Docker(Cow<'static, str>),
    #[error("Driver {driver} for contract type {tp} is not registered")]
    DriverNotFound { tp: ContractType, driver: String },
    #[error("No driver enabled for contract type {0}")]
    DriverDisabled(ContractType),
    #[error(transparent)]
    Infallible(std::convert::Infallible),
    #[error("Invalid contract method {0}")]
    InitializeNotAllowed(String),
    #[error("Invalid contract name {name}: {reason}")]
    InvalidContractName {
        name: String,
        reason: Cow<'static, str>,
    },
    #[error("Invalid init args: {0}")]
    InvalidInitArgs(Arc<serde_json::Error>),
    #[error(transparent)]
    Io(Arc<std::io::Error>),
    #[error("Kernel method {contract}.{method} not found")]
    KernelMethodNotFound { contract: String, method: String },
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Permission denied: {0}")]
    PermissionDenied(Cow<'static, str>),
    #[error("Process error: {0}")]
    Process(Cow<'static, str>),
    #[error("Recursive call to contract {0}")]
    RecursiveCall(String),
    #[error("Resource exceeds")]
    ResourceExceeded,
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),
    #[error("Unknown contract type {0}")]
    UnknownContractType(String),
    #[error("Contract upgrade disabled")]
    UpgradeDisabled,
    #[error("ValidationError")]
    ValidationError,
}

impl Error {
    /// Returns true if the contract ran and reported a failure itself, as
    /// opposed to the host failing to run it.
    pub fn is_contract_error(&self) -> bool {
        matches!(self, Self::ContractError { .. })
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        Self::Infallible(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl<A, B> From<rkyv::validation::CheckArchiveError<A, B>> for Error {
    fn from(_e: rkyv::validation::CheckArchiveError<A, B>) -> Self {
        Error::ValidationError
    }
}
