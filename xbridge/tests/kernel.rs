// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::sync::Arc;

use xbridge::config::ContractConfig;
use xbridge::mock::TestHelper;
use xbridge::sandbox::XMReader;
use xbridge::{
    Args, ChainCore, ContextConfig, ContractType, Error, KContext, Limits,
    Response, MAX_LIMITS,
};

const KERNEL: &str = "xkernel";

fn greet(ctx: &mut dyn KContext) -> Result<Response, Error> {
    let name = ctx.args().get("name").cloned().unwrap_or_default();
    ctx.put("$greeter", b"last", name.clone())?;

    let mut body = b"hello ".to_vec();
    body.extend(name);
    Ok(Response::ok(body))
}

#[test]
fn kernel_method_writes_state() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    helper
        .manager()
        .kern_registry()
        .register_kern_method("$greeter", "greet", greet);

    let mut args = Args::new();
    args.insert("name".into(), b"alice".to_vec());

    let response = helper.invoke(KERNEL, "$greeter", "greet", args)?;
    assert_eq!(response.body, b"hello alice");

    let last = helper
        .state()
        .get("$greeter", b"last")?
        .and_then(|data| data.pure.value);
    assert_eq!(last, Some(b"alice".to_vec()));

    Ok(())
}

#[test]
fn unknown_kernel_method() -> Result<(), Error> {
    let helper = TestHelper::new()?;

    let result = helper.invoke(KERNEL, "$greeter", "greet", Args::new());
    assert!(matches!(result, Err(Error::KernelMethodNotFound { .. })));

    Ok(())
}

#[test]
fn recursive_kernel_call_is_rejected() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    helper.manager().kern_registry().register_kern_method(
        "$loop",
        "again",
        |ctx: &mut dyn KContext| ctx.call(KERNEL, "$loop", "again", Args::new()),
    );

    let result = helper.invoke(KERNEL, "$loop", "again", Args::new());
    assert!(matches!(result, Err(Error::RecursiveCall(name)) if name == "$loop"));

    Ok(())
}

#[test]
fn nested_kernel_call_sees_caller() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    let registry = helper.manager().kern_registry();

    registry.register_kern_method("$inner", "who", |ctx: &mut dyn KContext| {
        Ok(Response::ok(ctx.caller()))
    });
    registry.register_kern_method("$outer", "ask", |ctx: &mut dyn KContext| {
        ctx.add_resource_used(Limits {
            cpu: 7,
            ..Limits::default()
        });
        ctx.call(KERNEL, "$inner", "who", Args::new())
    });

    let response = helper.invoke(KERNEL, "$outer", "ask", Args::new())?;
    assert_eq!(response.body, b"$outer");

    Ok(())
}

#[test]
fn usage_above_limits_fails() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    helper.manager().kern_registry().register_kern_method(
        "$hungry",
        "eat",
        |ctx: &mut dyn KContext| {
            ctx.add_resource_used(Limits {
                disk: 100,
                ..Limits::default()
            });
            Ok(Response::ok("ate"))
        },
    );

    let state = helper.sandbox();
    let mut ctx = helper.manager().new_context(ContextConfig {
        resource_limits: Limits {
            disk: 99,
            ..MAX_LIMITS
        },
        ..ContextConfig::new(state.clone(), KERNEL, "$hungry")
    })?;

    assert!(matches!(
        ctx.invoke("eat", Args::new()),
        Err(Error::ResourceExceeded)
    ));
    assert_eq!(ctx.resource_used().disk, 100);

    Ok(())
}

#[test]
fn context_is_invoked_once() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    helper
        .manager()
        .kern_registry()
        .register_kern_method("$greeter", "greet", greet);

    let manager = helper.manager();
    let ctxmgr = manager.bridge().context_manager();

    let mut ctx = manager.new_context(ContextConfig {
        resource_limits: MAX_LIMITS,
        ..ContextConfig::new(helper.sandbox(), KERNEL, "$greeter")
    })?;
    assert_eq!(ctxmgr.len(), 1);
    assert!(ctxmgr.context(ctx.id()).is_some());
    assert_eq!(ctx.context().contract_set.len(), 1);
    assert_eq!(ctx.context().chain_name, "xuper");

    ctx.invoke("greet", Args::new())?;
    assert!(matches!(
        ctx.invoke("greet", Args::new()),
        Err(Error::ContextInvoked(_))
    ));

    ctx.release();
    assert!(ctxmgr.is_empty());

    Ok(())
}

#[test]
fn dropped_context_is_released() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    let manager = helper.manager();

    {
        let _ctx = manager.new_context(ContextConfig::new(
            helper.sandbox(),
            KERNEL,
            "$greeter",
        ))?;
        assert_eq!(manager.bridge().context_manager().len(), 1);
    }
    assert!(manager.bridge().context_manager().is_empty());

    Ok(())
}

#[test]
fn initialize_needs_permission() -> Result<(), Error> {
    let helper = TestHelper::new()?;
    helper.manager().kern_registry().register_kern_method(
        "$greeter",
        "initialize",
        greet,
    );

    let mut ctx = helper.manager().new_context(ContextConfig {
        resource_limits: MAX_LIMITS,
        ..ContextConfig::new(helper.sandbox(), KERNEL, "$greeter")
    })?;
    assert!(matches!(
        ctx.invoke("initialize", Args::new()),
        Err(Error::InitializeNotAllowed(_))
    ));

    let mut ctx = helper.manager().new_context(ContextConfig {
        resource_limits: MAX_LIMITS,
        can_initialize: true,
        ..ContextConfig::new(helper.sandbox(), KERNEL, "$greeter")
    })?;
    ctx.invoke("initialize", Args::new())?;

    Ok(())
}

#[test]
fn disabled_type_has_no_driver() -> Result<(), Error> {
    let mut config = ContractConfig::default();
    config.xkernel.enable = false;
    let helper = TestHelper::with_config(config)?;

    let bridge = helper.manager().bridge();
    assert!(!bridge.has_creator(ContractType::Kernel));
    assert!(!bridge.has_creator(ContractType::Wasm));
    assert!(bridge.has_creator(ContractType::Native));

    let result = helper.manager().new_context(ContextConfig::new(
        helper.sandbox(),
        KERNEL,
        "$contract",
    ));
    assert!(matches!(
        result,
        Err(Error::DriverDisabled(ContractType::Kernel))
    ));
    assert!(bridge.context_manager().is_empty());

    Ok(())
}

#[test]
fn missing_contract_has_no_context() -> Result<(), Error> {
    let helper = TestHelper::new()?;

    let result = helper.manager().new_context(ContextConfig::new(
        helper.sandbox(),
        "native",
        "nowhere",
    ));
    assert!(matches!(result, Err(Error::ContractNotFound(_))));

    Ok(())
}

/// Lets nobody call into `$secret`.
struct GuardedCore;

impl ChainCore for GuardedCore {
    fn verify_contract_permission(
        &self,
        _initiator: &str,
        _auth_require: &[String],
        contract: &str,
        _method: &str,
    ) -> Result<bool, Error> {
        Ok(contract != "$secret")
    }

    fn verify_contract_owner_permission(
        &self,
        _contract: &str,
        _auth_require: &[String],
    ) -> Result<(), Error> {
        Ok(())
    }
}

#[test]
fn cross_call_needs_permission() -> Result<(), Error> {
    let helper =
        TestHelper::with_core(ContractConfig::default(), Arc::new(GuardedCore))?;
    let registry = helper.manager().kern_registry();

    registry.register_kern_method("$secret", "peek", |_: &mut dyn KContext| {
        Ok(Response::ok("secret"))
    });
    registry.register_kern_method("$outer", "peek", |ctx: &mut dyn KContext| {
        ctx.call(KERNEL, "$secret", "peek", Args::new())
    });

    let result = helper.invoke(KERNEL, "$outer", "peek", Args::new());
    assert!(matches!(result, Err(Error::PermissionDenied(_))));

    // only calls made by a contract are checked
    let response = helper.invoke(KERNEL, "$secret", "peek", Args::new())?;
    assert_eq!(response.body, b"secret");

    Ok(())
}
