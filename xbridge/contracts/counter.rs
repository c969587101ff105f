// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Native contract keeping named counters that can be read and incremented
//! by one count.

use xbridge_uplink::{serve, CallContext, Error, Response};

fn read(ctx: &mut CallContext<'_>, key: &[u8]) -> Result<u64, Error> {
    match ctx.get_object(key)? {
        Some(raw) => String::from_utf8_lossy(&raw)
            .parse()
            .map_err(|_| Error::Protocol("counter is not a number".into())),
        None => Ok(0),
    }
}

fn initialize(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    let Some(creator) = ctx.arg("creator").map(<[u8]>::to_vec) else {
        return Ok(Response::error("missing creator"));
    };
    ctx.put_object(b"creator", &creator)?;
    Ok(Response::ok("ok"))
}

fn increase(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    let Some(key) = ctx.arg("key").map(<[u8]>::to_vec) else {
        return Ok(Response::error("missing key"));
    };

    let value = read(ctx, &key)? + 1;
    ctx.put_object(&key, value.to_string().as_bytes())?;
    ctx.log(format!("increased {} to {value}", String::from_utf8_lossy(&key)))?;

    Ok(Response::ok(value.to_string()))
}

fn get(ctx: &mut CallContext<'_>) -> Result<Response, Error> {
    let Some(key) = ctx.arg("key").map(<[u8]>::to_vec) else {
        return Ok(Response::error("missing key"));
    };
    let value = read(ctx, &key)?;
    Ok(Response::ok(value.to_string()))
}

fn main() -> Result<(), Error> {
    serve(|ctx| {
        let result = match ctx.method() {
            "initialize" => initialize(ctx),
            "Increase" => increase(ctx),
            "Get" => get(ctx),
            method => Ok(Response::error(format!("unknown method {method}"))),
        };
        result.unwrap_or_else(|err| Response::error(err.to_string()))
    })
}
