// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::net::TcpListener;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};
use xbridge_uplink::{CodeAddr, Stream};

use crate::config::NativeConfig;
use crate::native::{DockerProcess, HostProcess};
use crate::Error;

/// How long a freshly started contract has to start listening.
const READY_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_RETRY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Started,
    Stopped,
    Killed,
}

/// The lifecycle of something running a contract binary.
pub trait Process: Send {
    fn start(&mut self) -> Result<(), Error>;

    /// Asks the process to exit, forcing it once `timeout` has passed.
    ///
    /// Returns once the process is gone.
    fn stop(&mut self, timeout: Duration) -> Result<(), Error>;

    fn state(&self) -> ProcessState;

    /// Whether the process is still running. A process found to have exited
    /// moves to [`ProcessState::Stopped`].
    fn is_alive(&mut self) -> bool;

    /// Where the contract listens for the host.
    fn addr(&self) -> &CodeAddr;
}

/// What to run for a contract.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    /// Holds the binary, and is the working directory of the process.
    pub dir: PathBuf,
    pub binpath: PathBuf,
    /// The runtime named in the descriptor.
    pub runtime: String,
    /// Extra environment, on top of what every contract gets.
    pub envs: Vec<(String, String)>,
}

impl ProcessSpec {
    /// The program and arguments that run the contract.
    pub fn command(&self) -> (String, Vec<String>) {
        let bin = self.binpath.display().to_string();
        match self.runtime.as_str() {
            "java" => ("java".into(), vec!["-jar".into(), bin]),
            _ => (bin, Vec::new()),
        }
    }

    /// File extension of the binary for `runtime`.
    pub fn extension(runtime: &str) -> &'static str {
        match runtime {
            "java" => ".jar",
            _ => "",
        }
    }
}

/// Builds the [`Process`] for a contract.
pub trait Launcher: Send + Sync {
    fn launch(&self, spec: ProcessSpec) -> Result<Box<dyn Process>, Error>;
}

/// Runs contracts on the host, or in docker when that is enabled.
#[derive(Debug, Clone)]
pub struct DefaultLauncher {
    config: NativeConfig,
}

impl DefaultLauncher {
    pub fn new(config: NativeConfig) -> Self {
        Self { config }
    }
}

impl Launcher for DefaultLauncher {
    fn launch(&self, spec: ProcessSpec) -> Result<Box<dyn Process>, Error> {
        if self.config.docker.enable {
            let process = DockerProcess::new(spec, self.config.docker.clone())?;
            Ok(Box::new(process))
        } else {
            Ok(Box::new(HostProcess::new(spec)?))
        }
    }
}

/// A port on the loopback interface that was free a moment ago.
pub(crate) fn free_port() -> Result<u16, Error> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn connect(addr: &CodeAddr, timeout: Duration) -> Result<Stream, Error> {
    let deadline = Instant::now() + timeout;
    loop {
        match addr.connect() {
            Ok(stream) => return Ok(stream),
            Err(_) if Instant::now() < deadline => thread::sleep(CONNECT_RETRY),
            Err(err) => {
                return Err(Error::Process(
                    format!("contract at {addr} is not reachable: {err}").into(),
                ))
            }
        }
    }
}

/// A running version of a contract and the connections open to it.
///
/// Every call takes a connection out of the idle pool, or opens a new one,
/// and puts it back when done. No lock is held while a call runs.
pub struct ContractProcess {
    name: String,
    content_hash: String,
    addr: CodeAddr,
    stop_timeout: Duration,
    process: Mutex<Box<dyn Process>>,
    idle: Mutex<Vec<Stream>>,
}

impl ContractProcess {
    pub fn new(
        name: String,
        content_hash: String,
        process: Box<dyn Process>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            name,
            content_hash,
            addr: process.addr().clone(),
            stop_timeout,
            process: Mutex::new(process),
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn addr(&self) -> &CodeAddr {
        &self.addr
    }

    pub fn state(&self) -> ProcessState {
        self.process.lock().state()
    }

    /// Returns true while the process runs.
    pub fn is_alive(&self) -> bool {
        self.process.lock().is_alive()
    }

    /// Starts the process and waits until it accepts the host.
    pub fn start(&self) -> Result<(), Error> {
        self.process.lock().start()?;
        let stream = connect(&self.addr, READY_TIMEOUT)?;
        self.idle.lock().push(stream);
        debug!("contract {} ready at {}", self.name, self.addr);
        Ok(())
    }

    /// Stops the process. Failures are logged.
    pub fn stop(&self) {
        self.reset_connection();
        if let Err(err) = self.process.lock().stop(self.stop_timeout) {
            warn!("stopping contract {} failed: {err}", self.name);
        }
    }

    /// Closes the idle connections to the contract.
    pub fn reset_connection(&self) {
        let idle = std::mem::take(&mut *self.idle.lock());
        for stream in idle {
            let _ = stream.shutdown();
        }
    }

    /// Runs `f` over a connection to the contract.
    ///
    /// A connection that failed is closed instead of going back to the
    /// pool.
    pub fn with_stream<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Stream) -> Result<T, Error>,
    {
        let pooled = self.idle.lock().pop();
        let mut stream = match pooled {
            Some(stream) => stream,
            None => connect(&self.addr, READY_TIMEOUT)?,
        };

        let result = f(&mut stream);
        match &result {
            Err(Error::Channel(_)) | Err(Error::Io(_)) => {
                let _ = stream.shutdown();
            }
            _ => self.idle.lock().push(stream),
        }
        result
    }
}

impl Drop for ContractProcess {
    fn drop(&mut self) {
        if self.state() == ProcessState::Started {
            self.stop();
        }
    }
}
