// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fs;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use xbridge::mock::TestHelper;
use xbridge::sandbox::{Transfer, XMReader, CONTRACT_EVENT_KEY, TRANSIENT_BUCKET};
use xbridge::{Args, ContextConfig, ContractType, Error, MAX_LIMITS};

const NATIVE: &str = "native";

fn features_code() -> Result<Vec<u8>, Error> {
    Ok(fs::read(env!("CARGO_BIN_EXE_features"))?)
}

fn args(pairs: &[(&str, &str)]) -> Args {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

fn deploy_features(helper: &TestHelper, name: &str) -> Result<(), Error> {
    let response = helper.deploy(
        ContractType::Native,
        "c",
        name,
        &features_code()?,
        &Args::new(),
    )?;
    assert!(!response.has_error(), "{response:?}");
    Ok(())
}

#[test]
fn self_call_fails() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    deploy_features(&helper, "features")?;

    let response = helper.invoke(NATIVE, "features", "Invoke", Args::new())?;
    assert!(response.has_error(), "{response:?}");
    assert!(response.status >= 400);

    Ok(())
}

#[test]
fn cross_contract_call_sees_caller() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    deploy_features(&helper, "features")?;
    deploy_features(&helper, "features2")?;

    let response = helper.invoke(
        NATIVE,
        "features",
        "Invoke",
        args(&[("contract", "features2"), ("method", "Caller")]),
    )?;
    assert!(!response.has_error(), "{response:?}");
    assert_eq!(response.body, b"features");

    // called directly, there is no calling contract
    let response = helper.invoke(NATIVE, "features2", "Caller", Args::new())?;
    assert_eq!(response.body, b"");

    Ok(())
}

#[test]
fn transfers_are_recorded() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    deploy_features(&helper, "features")?;

    let state = helper.sandbox();
    let mut ctx = helper.manager().new_context(ContextConfig {
        resource_limits: MAX_LIMITS,
        ..ContextConfig::new(state.clone(), NATIVE, "features")
    })?;
    let response = ctx.invoke(
        "Transfer",
        args(&[("to", "bob"), ("amount", "10")]),
    )?;
    assert!(!response.has_error(), "{response:?}");
    ctx.release();

    assert_eq!(
        state.utxo_rwset().transfers,
        vec![Transfer {
            from: "features".into(),
            to: "bob".into(),
            amount: 10,
        }]
    );

    Ok(())
}

#[test]
fn events_travel_with_the_write_set() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    deploy_features(&helper, "features")?;

    let state = helper.sandbox();
    let mut ctx = helper.manager().new_context(ContextConfig {
        resource_limits: MAX_LIMITS,
        ..ContextConfig::new(state.clone(), NATIVE, "features")
    })?;
    ctx.invoke("Event", args(&[("name", "minted"), ("body", "42")]))?;

    let events = &ctx.context().events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].contract, "features");
    assert_eq!(events[0].name, "minted");
    assert_eq!(events[0].body, b"42");
    // name and body are charged as disk
    assert_eq!(ctx.resource_used().disk, 8);
    ctx.release();

    helper.commit(&state)?;
    let stored = helper
        .state()
        .get(TRANSIENT_BUCKET, CONTRACT_EVENT_KEY)?
        .and_then(|data| data.pure.value)
        .expect("events should be committed");
    let stored: serde_json::Value = serde_json::from_slice(&stored)
        .map_err(|err| Error::Serialization(err.to_string().into()))?;
    assert_eq!(stored[0]["name"], "minted");

    Ok(())
}

#[test]
fn logging_from_contract() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    deploy_features(&helper, "features")?;

    let response = helper.invoke(NATIVE, "features", "Logging", Args::new())?;
    assert_eq!(response.body, b"ok");

    Ok(())
}

#[test]
fn upgrade_replaces_code() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    let counter = fs::read(env!("CARGO_BIN_EXE_counter"))?;
    helper.deploy(
        ContractType::Native,
        "c",
        "upgraded",
        &counter,
        &args(&[("creator", "alice")]),
    )?;

    let response = helper.invoke(NATIVE, "upgraded", "Caller", Args::new())?;
    assert!(response.has_error(), "counter has no Caller method");

    let response = helper.upgrade("upgraded", &features_code()?)?;
    assert_eq!(response.body, b"upgrade success");

    let response = helper.invoke(NATIVE, "upgraded", "Logging", Args::new())?;
    assert!(!response.has_error(), "{response:?}");

    // state written before the upgrade is kept
    let creator = helper
        .state()
        .get("upgraded", b"creator")?
        .and_then(|data| data.pure.value);
    assert_eq!(creator, Some(b"alice".to_vec()));

    Ok(())
}

#[test]
fn upgrade_needs_existing_contract() -> Result<(), Error> {
    let helper = TestHelper::new()?;

    let result = helper.upgrade("missing", &features_code()?);
    assert!(matches!(result, Err(Error::ContractNotFound(_))));

    Ok(())
}

#[test]
fn upgrade_can_be_disabled() -> Result<(), Error> {
    let mut config = xbridge::config::ContractConfig::default();
    config.enable_upgrade = false;
    let helper = TestHelper::with_config(config)?;
    deploy_features(&helper, "features")?;

    let result = helper.upgrade("features", &features_code()?);
    assert!(matches!(result, Err(Error::UpgradeDisabled)));

    Ok(())
}

#[test]
fn opposite_cross_calls_run_in_parallel() -> Result<(), Error> {
    let helper = Arc::new(TestHelper::new()?);
    deploy_features(&helper, "feat_a")?;
    deploy_features(&helper, "feat_b")?;

    for _ in 0..3 {
        let barrier = Arc::new(Barrier::new(2));
        let (tx, rx) = mpsc::channel();

        for (from, to) in [("feat_a", "feat_b"), ("feat_b", "feat_a")] {
            let helper = helper.clone();
            let barrier = barrier.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                barrier.wait();
                let result = helper.invoke(
                    NATIVE,
                    from,
                    "Invoke",
                    args(&[("contract", to), ("method", "Caller")]),
                );
                let _ = tx.send((from, result));
            });
        }

        for _ in 0..2 {
            let (from, result) = rx
                .recv_timeout(Duration::from_secs(30))
                .expect("cross calls should finish");
            let response = result?;
            assert!(!response.has_error(), "{response:?}");
            assert_eq!(response.body, from.as_bytes());
        }
    }

    Ok(())
}

#[test]
fn contract_can_upgrade_itself() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    deploy_features(&helper, "features")?;

    let counter = fs::read(env!("CARGO_BIN_EXE_counter"))?;
    let mut ctx = helper.manager().new_context(ContextConfig {
        resource_limits: MAX_LIMITS,
        ..ContextConfig::new(helper.sandbox(), NATIVE, "features")
    })?;

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut call = Args::new();
        call.insert("module".into(), b"xkernel".to_vec());
        call.insert("contract".into(), b"$contract".to_vec());
        call.insert("method".into(), b"upgradeContract".to_vec());
        call.insert("contract_name".into(), b"features".to_vec());
        call.insert("contract_code".into(), counter);
        let _ = tx.send(ctx.invoke("Invoke", call));
    });

    // the running process is replaced under the call, which may fail, but
    // must not hang
    let _ = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("self upgrade should finish");

    Ok(())
}
