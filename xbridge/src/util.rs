// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::OnceLock;

use regex::Regex;

use crate::Error;

/// Bucket mapping account names to account metadata.
pub const ACCOUNT_BUCKET: &str = "XCAccount";
/// Bucket mapping contract names to their owning account.
pub const CONTRACT2ACCOUNT_BUCKET: &str = "XCContract2Account";
/// Bucket listing the contracts an account owns.
pub const ACCOUNT2CONTRACT_BUCKET: &str = "XCAccount2Contract";
/// Value stored for every entry of [`ACCOUNT2CONTRACT_BUCKET`].
pub const ACCOUNT_CONTRACT_VALUE: &str = "true";
const ACL_SEPARATOR: &str = "\x01";

const CONTRACT_NAME_MIN: usize = 4;
const CONTRACT_NAME_MAX: usize = 16;

// Names taken by system buckets and built-in contracts.
const RESERVED_NAMES: [&str; 10] = [
    "XCContract2Account",
    "XCAccount2Contract",
    "contract",
    "governToken",
    "proposal",
    "timer",
    "XToken",
    "XCAccount",
    "XCAK2Account",
    "XCContract",
];

fn contract_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_.]+[0-9a-zA-Z_]$")
            .expect("contract name pattern is valid")
    })
}

/// Checks that `name` may be used for a newly deployed contract.
pub fn valid_contract_name(name: &str) -> Result<(), Error> {
    let invalid = |reason: String| Error::InvalidContractName {
        name: name.to_owned(),
        reason: reason.into(),
    };

    let len = name.len();
    if !(CONTRACT_NAME_MIN..=CONTRACT_NAME_MAX).contains(&len) {
        return Err(invalid(format!(
            "length expect [{CONTRACT_NAME_MIN}~{CONTRACT_NAME_MAX}], actual: {len}"
        )));
    }
    if !contract_name_regex().is_match(name) {
        return Err(invalid("does not fit the rule of contract name".into()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(invalid("name is reserved".into()));
    }

    Ok(())
}

/// The key recording that `account` owns `contract`.
pub fn account_contract_key(account: &str, contract: &str) -> String {
    format!("{account}{ACL_SEPARATOR}{contract}")
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)\s*([kKmMgGtTpP]?)[iI]?[bB]?$")
            .expect("size pattern is valid")
    })
}

/// Parses a human-readable memory size such as `512m` or `1.5GB` into
/// bytes. Units are binary, so `1k` is 1024 bytes.
pub fn ram_in_bytes(size: &str) -> Result<i64, Error> {
    let invalid = || Error::Config(format!("invalid size: '{size}'").into());

    let caps = size_regex().captures(size.trim()).ok_or_else(invalid)?;
    let value: f64 = caps[1].parse().map_err(|_| invalid())?;

    let unit = caps.get(2).map_or("", |m| m.as_str());
    let shift = match unit.to_ascii_lowercase().as_str() {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        _ => 50,
    };

    Ok((value * (1u64 << shift) as f64) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_names() {
        for name in ["counter", "_abc", "a.b.c_d", "features", "abcdefghijklmnop"]
        {
            assert!(valid_contract_name(name).is_ok(), "{name} is valid");
        }

        for name in [
            "abc",
            "abcdefghijklmnopq",
            "1abc",
            "abc.",
            "ab-cd",
            "héllo",
            "contract",
            "XCAccount",
            "governToken",
        ] {
            assert!(valid_contract_name(name).is_err(), "{name} is invalid");
        }
    }

    #[test]
    fn account_contract_keys() {
        assert_eq!(
            account_contract_key("XC1111111111111111@xuper", "counter"),
            "XC1111111111111111@xuper\x01counter"
        );
    }

    #[test]
    fn memory_sizes() -> Result<(), Error> {
        assert_eq!(ram_in_bytes("32")?, 32);
        assert_eq!(ram_in_bytes("32b")?, 32);
        assert_eq!(ram_in_bytes("1k")?, 1024);
        assert_eq!(ram_in_bytes("512m")?, 512 * 1024 * 1024);
        assert_eq!(ram_in_bytes("1G")?, 1024 * 1024 * 1024);
        assert_eq!(ram_in_bytes("1GiB")?, 1024 * 1024 * 1024);
        assert_eq!(ram_in_bytes("1.5 kb")?, 1536);

        assert!(ram_in_bytes("").is_err());
        assert!(ram_in_bytes("lots").is_err());
        assert!(ram_in_bytes("-1m").is_err());

        Ok(())
    }
}
