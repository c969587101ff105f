// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bytecheck::CheckBytes;
use rkyv::{AlignedVec, Archive, Deserialize, Infallible, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Bucket holding contract code and descriptors.
pub const CONTRACT_BUCKET: &str = "contract";

/// The runtime family a contract executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContractType {
    Wasm,
    Native,
    Evm,
    Kernel,
}

impl ContractType {
    /// Every contract type, in the order drivers are opened.
    pub const ALL: [ContractType; 4] = [
        ContractType::Wasm,
        ContractType::Native,
        ContractType::Evm,
        ContractType::Kernel,
    ];

    /// The module name contexts use to address this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wasm => "wasm",
            Self::Native => "native",
            Self::Evm => "evm",
            Self::Kernel => "xkernel",
        }
    }

    /// The name of the driver used when the configuration names none.
    pub fn default_driver(&self) -> &'static str {
        match self {
            Self::Wasm => "xvm",
            Self::Native => "native",
            Self::Evm => "evm",
            Self::Kernel => "default",
        }
    }
}

impl Display for ContractType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "wasm" => Ok(Self::Wasm),
            "native" => Ok(Self::Native),
            "evm" => Ok(Self::Evm),
            "xkernel" => Ok(Self::Kernel),
            other => Err(Error::UnknownContractType(other.to_owned())),
        }
    }
}

/// Persisted metadata of a deployed contract.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Archive, Serialize, Deserialize,
)]
#[archive_attr(derive(CheckBytes))]
pub struct Descriptor {
    /// Language runtime of the code, such as `go`, `c` or `java`.
    pub runtime: String,
    pub contract_type: String,
    /// Double SHA-256 of the contract code.
    pub digest: Vec<u8>,
}

impl Descriptor {
    pub fn new<R, T>(runtime: R, contract_type: T) -> Self
    where
        R: Into<String>,
        T: Into<String>,
    {
        Self {
            runtime: runtime.into(),
            contract_type: contract_type.into(),
            digest: Vec::new(),
        }
    }

    pub fn contract_type(&self) -> Result<ContractType, Error> {
        self.contract_type.parse()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let bytes = rkyv::to_bytes::<_, 256>(self)
            .map_err(|err| Error::Serialization(err.to_string().into()))?;
        Ok(bytes.into_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        // archived data must be aligned before it can be checked
        let mut aligned = AlignedVec::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = rkyv::check_archived_root::<Self>(&aligned[..])?;
        let desc = archived.deserialize(&mut Infallible)?;

        Ok(desc)
    }
}

/// Computes `sha256(sha256(code))`.
pub fn double_sha256(code: &[u8]) -> Vec<u8> {
    let first = Sha256::digest(code);
    Sha256::digest(first).to_vec()
}

pub fn code_desc_key(name: &str) -> Vec<u8> {
    format!("{name}.desc").into_bytes()
}

pub fn code_key(name: &str) -> Vec<u8> {
    format!("{name}.code").into_bytes()
}

pub fn abi_key(name: &str) -> Vec<u8> {
    format!("{name}.abi").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_type_names() -> Result<(), Error> {
        assert_eq!("".parse::<ContractType>()?, ContractType::Wasm);
        assert_eq!("wasm".parse::<ContractType>()?, ContractType::Wasm);
        assert_eq!("native".parse::<ContractType>()?, ContractType::Native);
        assert_eq!("evm".parse::<ContractType>()?, ContractType::Evm);
        assert_eq!("xkernel".parse::<ContractType>()?, ContractType::Kernel);
        assert!(matches!(
            "lua".parse::<ContractType>(),
            Err(Error::UnknownContractType(_))
        ));

        for tp in ContractType::ALL {
            assert_eq!(tp.as_str().parse::<ContractType>()?, tp);
        }

        Ok(())
    }

    #[test]
    fn descriptor_bytes() -> Result<(), Error> {
        let mut desc = Descriptor::new("go", "native");
        desc.digest = double_sha256(b"\x7fELF");

        let bytes = desc.to_bytes()?;
        assert_eq!(Descriptor::from_bytes(&bytes)?, desc);

        assert!(Descriptor::from_bytes(&[0xff; 3]).is_err());

        Ok(())
    }

    #[test]
    fn digest_is_double_sha256() {
        let once = Sha256::digest(b"code");
        let twice = Sha256::digest(once);
        assert_eq!(double_sha256(b"code"), twice.to_vec());
        assert_eq!(double_sha256(b"code").len(), 32);
    }

    #[test]
    fn storage_keys() {
        assert_eq!(code_desc_key("counter"), b"counter.desc");
        assert_eq!(code_key("counter"), b"counter.code");
        assert_eq!(abi_key("counter"), b"counter.abi");
    }
}
