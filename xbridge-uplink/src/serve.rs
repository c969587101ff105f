// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::env;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    read_frame, write_frame, Args, CodeAddr, Entry, Error, Invoke, Message,
    Request, Response, Stream, Syscall, SyscallReply, ENV_CODE_ADDR,
    ENV_PING_TIMEOUT, PING_TIMEOUT_SECS,
};

/// The view a native contract has of the call it is serving.
pub struct CallContext<'a> {
    stream: &'a mut Stream,
    invoke: Invoke,
}

impl<'a> CallContext<'a> {
    pub fn method(&self) -> &str {
        &self.invoke.method
    }

    pub fn args(&self) -> &Args {
        &self.invoke.args
    }

    /// Returns the argument with the given `name`, if passed.
    pub fn arg(&self, name: &str) -> Option<&[u8]> {
        self.invoke.args.get(name).map(Vec::as_slice)
    }

    pub fn contract(&self) -> &str {
        &self.invoke.contract
    }

    pub fn initiator(&self) -> &str {
        &self.invoke.initiator
    }

    pub fn caller(&self) -> &str {
        &self.invoke.caller
    }

    pub fn auth_require(&self) -> &[String] {
        &self.invoke.auth_require
    }

    pub fn transfer_amount(&self) -> u128 {
        self.invoke.transfer_amount
    }

    pub fn get_object(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.syscall(Syscall::GetObject { key: key.to_vec() })? {
            SyscallReply::Value(value) => Ok(value),
            reply => Err(unexpected(reply)),
        }
    }

    pub fn put_object(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.syscall(Syscall::PutObject {
            key: key.to_vec(),
            value: value.to_vec(),
        })
        .and_then(expect_done)
    }

    pub fn delete_object(&mut self, key: &[u8]) -> Result<(), Error> {
        self.syscall(Syscall::DeleteObject { key: key.to_vec() })
            .and_then(expect_done)
    }

    /// Returns the entries with keys in `[start, end)`, in key order.
    pub fn select(
        &mut self,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<Entry>, Error> {
        match self.syscall(Syscall::Select {
            start: start.to_vec(),
            end: end.to_vec(),
        })? {
            SyscallReply::Entries(entries) => Ok(entries),
            reply => Err(unexpected(reply)),
        }
    }

    /// Moves `amount` of the native token from this contract to `to`.
    pub fn transfer(&mut self, to: &str, amount: u128) -> Result<(), Error> {
        self.syscall(Syscall::Transfer {
            to: to.to_owned(),
            amount,
        })
        .and_then(expect_done)
    }

    pub fn emit_event(&mut self, name: &str, body: &[u8]) -> Result<(), Error> {
        self.syscall(Syscall::EmitEvent {
            name: name.to_owned(),
            body: body.to_vec(),
        })
        .and_then(expect_done)
    }

    /// Calls `method` on another contract within the same transaction.
    pub fn call(
        &mut self,
        module: &str,
        contract: &str,
        method: &str,
        args: Args,
    ) -> Result<Response, Error> {
        match self.syscall(Syscall::Call {
            module: module.to_owned(),
            contract: contract.to_owned(),
            method: method.to_owned(),
            args,
        })? {
            SyscallReply::Response(response) => Ok(response),
            reply => Err(unexpected(reply)),
        }
    }

    /// Writes a line into the host's log, tagged with this call.
    pub fn log<S: Into<String>>(&mut self, entry: S) -> Result<(), Error> {
        self.syscall(Syscall::Log {
            entry: entry.into(),
        })
        .and_then(expect_done)
    }

    fn syscall(&mut self, call: Syscall) -> Result<SyscallReply, Error> {
        write_frame(&mut *self.stream, &Message::Syscall(call))?;
        match read_frame(&mut *self.stream)? {
            Request::SyscallReply(SyscallReply::Error(msg)) => {
                Err(Error::Syscall(msg))
            }
            Request::SyscallReply(reply) => Ok(reply),
            Request::Invoke(_) => Err(Error::Protocol(
                "invoke received while a syscall was pending".into(),
            )),
        }
    }
}

fn expect_done(reply: SyscallReply) -> Result<(), Error> {
    match reply {
        SyscallReply::Done => Ok(()),
        reply => Err(unexpected(reply)),
    }
}

fn unexpected(reply: SyscallReply) -> Error {
    Error::Protocol(format!("unexpected syscall reply: {reply:?}").into())
}

/// Exits the process once no host connection has been open for `timeout`.
#[derive(Clone)]
struct Watchdog {
    // open connections, and since when there are none
    state: Arc<Mutex<(usize, Option<Instant>)>>,
}

impl Watchdog {
    fn spawn(timeout: Duration) -> Self {
        let watchdog = Self {
            state: Arc::new(Mutex::new((0, Some(Instant::now())))),
        };

        let w = watchdog.clone();
        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(100));
            let expired = match w.state.lock() {
                Ok(state) => state.1.map_or(false, |t| t.elapsed() > timeout),
                Err(_) => true,
            };
            if expired {
                tracing::info!("host went away, exiting");
                std::process::exit(0);
            }
        });

        watchdog
    }

    fn opened(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += 1;
            state.1 = None;
        }
    }

    fn closed(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.0 = state.0.saturating_sub(1);
            if state.0 == 0 {
                state.1 = Some(Instant::now());
            }
        }
    }
}

/// Answers invocations arriving on `stream` until the host closes it.
fn serve_connection<F>(mut stream: Stream, handler: &F)
where
    F: Fn(&mut CallContext<'_>) -> Response,
{
    loop {
        let invoke = match read_frame(&mut stream) {
            Ok(Request::Invoke(invoke)) => invoke,
            Ok(Request::SyscallReply(_)) => {
                tracing::warn!("syscall reply with no pending syscall");
                return;
            }
            Err(Error::Closed) => return,
            Err(err) => {
                tracing::warn!("reading request failed: {err}");
                return;
            }
        };

        let mut ctx = CallContext {
            stream: &mut stream,
            invoke,
        };
        let response = handler(&mut ctx);

        if let Err(err) = write_frame(&mut stream, &Message::Done(response)) {
            tracing::warn!("writing response failed: {err}");
            return;
        }
    }
}

/// Runs a contract, calling `handler` for every method invocation.
///
/// Each host connection is served on a thread of its own, so calls may run
/// concurrently. Returns only if the listening address cannot be used.
pub fn serve<F>(handler: F) -> Result<(), Error>
where
    F: Fn(&mut CallContext<'_>) -> Response + Send + Sync + 'static,
{
    let addr: CodeAddr = env::var(ENV_CODE_ADDR)
        .map_err(|_| Error::MissingEnv(ENV_CODE_ADDR))?
        .parse()?;
    let timeout = env::var(ENV_PING_TIMEOUT)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(PING_TIMEOUT_SECS);

    let listener = addr.bind()?;
    let watchdog = Watchdog::spawn(Duration::from_secs(timeout));
    let handler = Arc::new(handler);

    loop {
        let stream = listener.accept()?;
        watchdog.opened();

        let handler = handler.clone();
        let watchdog = watchdog.clone();
        thread::spawn(move || {
            serve_connection(stream, handler.as_ref());
            watchdog.closed();
        });
    }
}
