// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Native contract exercising the syscalls available to contracts.

use xbridge_uplink::{serve, Args, CallContext, Error, Response};

fn arg_string(ctx: &CallContext<'_>, name: &str) -> Option<String> {
    ctx.arg(name)
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
}

/// Writes a line into the host log.
fn logging(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    ctx.log("log from contract")?;
    Ok(Response::ok("ok"))
}

/// Moves `amount` to `to`.
fn transfer(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    let (Some(to), Some(amount)) = (arg_string(ctx, "to"), arg_string(ctx, "amount"))
    else {
        return Ok(Response::error("missing to or amount"));
    };
    let Ok(amount) = amount.parse::<u128>() else {
        return Ok(Response::error("bad amount"));
    };

    ctx.transfer(&to, amount)?;
    Ok(Response::ok("ok"))
}

/// Calls `method` of `contract` in `module`, defaulting to this contract's
/// `Logging`. Every other argument is passed along.
fn invoke(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    let module = arg_string(ctx, "module").unwrap_or_else(|| "native".into());
    let contract = arg_string(ctx, "contract")
        .unwrap_or_else(|| ctx.contract().to_owned());
    let method = arg_string(ctx, "method").unwrap_or_else(|| "Logging".into());

    let args: Args = ctx
        .args()
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "module" | "contract" | "method"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ctx.call(&module, &contract, &method, args)
}

/// Returns the contract or account that called this one.
fn caller(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    Ok(Response::ok(ctx.caller()))
}

/// Emits an event named after the `name` argument.
fn event(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    let name = arg_string(ctx, "name").unwrap_or_else(|| "event".into());
    let body = ctx.arg("body").map(<[u8]>::to_vec).unwrap_or_default();
    ctx.emit_event(&name, &body)?;
    Ok(Response::ok("ok"))
}

fn main() -> Result<(), Error> {
    serve(|ctx| {
        let result = match ctx.method() {
            "initialize" => Ok(Response::ok("ok")),
            "Logging" => logging(ctx),
            "Transfer" => transfer(ctx),
            "Invoke" => invoke(ctx),
            "Caller" => caller(ctx),
            "Event" => event(ctx),
            method => Ok(Response::error(format!("unknown method {method}"))),
        };
        result.unwrap_or_else(|err| Response::error(err.to_string()))
    })
}
