// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use crate::descriptor::{abi_key, code_desc_key, code_key, CONTRACT_BUCKET};
use crate::sandbox::{StateSandbox, XMReader};
use crate::{Descriptor, Error};

/// Source of deployed contract code.
///
/// The `*_from_cache` variants may return code that is written but not yet
/// committed. They default to the plain lookups.
pub trait ContractCodeProvider {
    fn get_contract_code_desc(&self, name: &str) -> Result<Descriptor, Error>;
    fn get_contract_code(&self, name: &str) -> Result<Vec<u8>, Error>;
    fn get_contract_abi(&self, name: &str) -> Result<Vec<u8>, Error>;

    fn get_contract_code_desc_from_cache(
        &self,
        name: &str,
    ) -> Result<Descriptor, Error> {
        self.get_contract_code_desc(name)
    }

    fn get_contract_code_from_cache(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.get_contract_code(name)
    }
}

fn not_found(name: &str) -> Error {
    Error::ContractNotFound(name.to_owned())
}

/// Reads contract code through a transaction's sandbox, so code deployed
/// earlier in the same transaction is visible.
pub struct SandboxCodeProvider {
    state: StateSandbox,
}

impl SandboxCodeProvider {
    pub fn new(state: StateSandbox) -> Self {
        Self { state }
    }
}

impl ContractCodeProvider for SandboxCodeProvider {
    fn get_contract_code_desc(&self, name: &str) -> Result<Descriptor, Error> {
        let bytes = self
            .state
            .get(CONTRACT_BUCKET, &code_desc_key(name))?
            .ok_or_else(|| not_found(name))?;
        Descriptor::from_bytes(&bytes)
    }

    fn get_contract_code(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.state
            .get(CONTRACT_BUCKET, &code_key(name))?
            .ok_or_else(|| not_found(name))
    }

    fn get_contract_abi(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.state
            .get(CONTRACT_BUCKET, &abi_key(name))?
            .ok_or_else(|| not_found(name))
    }
}

/// Reads contract code from committed state only.
pub struct ReaderCodeProvider {
    reader: Arc<dyn XMReader>,
}

impl ReaderCodeProvider {
    pub fn new(reader: Arc<dyn XMReader>) -> Self {
        Self { reader }
    }

    fn read(&self, name: &str, key: &[u8]) -> Result<Vec<u8>, Error> {
        self.reader
            .get(CONTRACT_BUCKET, key)?
            .and_then(|data| data.pure.value)
            .ok_or_else(|| not_found(name))
    }
}

impl ContractCodeProvider for ReaderCodeProvider {
    fn get_contract_code_desc(&self, name: &str) -> Result<Descriptor, Error> {
        let bytes = self.read(name, &code_desc_key(name))?;
        Descriptor::from_bytes(&bytes)
    }

    fn get_contract_code(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.read(name, &code_key(name))
    }

    fn get_contract_abi(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.read(name, &abi_key(name))
    }
}

/// Pins the descriptor of a contract resolved earlier, delegating code
/// lookups to `inner`.
pub struct DescProvider<P> {
    inner: P,
    desc: Descriptor,
}

impl<P> DescProvider<P> {
    pub fn new(inner: P, desc: Descriptor) -> Self {
        Self { inner, desc }
    }
}

impl<P: ContractCodeProvider> ContractCodeProvider for DescProvider<P> {
    fn get_contract_code_desc(&self, _name: &str) -> Result<Descriptor, Error> {
        Ok(self.desc.clone())
    }

    fn get_contract_code(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.inner.get_contract_code(name)
    }

    fn get_contract_abi(&self, name: &str) -> Result<Vec<u8>, Error> {
        self.inner.get_contract_abi(name)
    }
}
