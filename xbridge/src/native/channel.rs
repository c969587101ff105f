// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::io::{Read, Write};

use xbridge_uplink::{
    read_frame, write_frame, Invoke, Message, Request, Response, Syscall,
    SyscallReply,
};

use crate::Error;

/// Sends `invoke` to a contract and serves its syscalls with `on_syscall`
/// until it is done.
pub(crate) fn invoke<S, F>(
    stream: &mut S,
    invoke: Invoke,
    mut on_syscall: F,
) -> Result<Response, Error>
where
    S: Read + Write,
    F: FnMut(Syscall) -> SyscallReply,
{
    write_frame(stream, &Request::Invoke(invoke))?;

    loop {
        match read_frame(stream)? {
            Message::Syscall(call) => {
                let reply = on_syscall(call);
                write_frame(stream, &Request::SyscallReply(reply))?;
            }
            Message::Done(response) => return Ok(response),
        }
    }
}
