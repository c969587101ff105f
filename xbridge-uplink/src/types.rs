// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Status of a successful call.
pub const STATUS_OK: i32 = 200;
/// Statuses at or above this value signal a failed call.
pub const STATUS_ERROR_THRESHOLD: i32 = 400;
/// Generic failure status.
pub const STATUS_ERROR: i32 = 500;

/// Named arguments passed to a contract method.
pub type Args = BTreeMap<String, Vec<u8>>;

/// The result of running a contract method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: i32,
    pub message: String,
    #[serde(with = "hex")]
    pub body: Vec<u8>,
}

impl Response {
    /// A successful response carrying `body`.
    pub fn ok<B: Into<Vec<u8>>>(body: B) -> Self {
        Self {
            status: STATUS_OK,
            message: String::new(),
            body: body.into(),
        }
    }

    /// A failed response with the generic error status.
    pub fn error<M: Into<String>>(message: M) -> Self {
        Self::error_with_status(STATUS_ERROR, message)
    }

    pub fn error_with_status<M: Into<String>>(status: i32, message: M) -> Self {
        Self {
            status,
            message: message.into(),
            body: Vec::new(),
        }
    }

    /// Returns true if the status signals a failed call.
    pub fn has_error(&self) -> bool {
        self.status >= STATUS_ERROR_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_threshold() {
        assert!(!Response::ok("x").has_error());
        assert!(Response::error("boom").has_error());
        assert!(Response::error_with_status(400, "bad").has_error());
        assert!(!Response::error_with_status(399, "redirect").has_error());
    }

    #[test]
    fn body_is_hex_on_the_wire() {
        let json = serde_json::to_string(&Response::ok(vec![0xde, 0xad]))
            .expect("serializing should succeed");
        assert!(json.contains("\"dead\""));
    }
}
