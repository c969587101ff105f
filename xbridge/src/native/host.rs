// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use xbridge_uplink::{CodeAddr, ENV_CODE_ADDR, ENV_PING_TIMEOUT, PING_TIMEOUT_SECS};

use crate::native::{Process, ProcessSpec, ProcessState};
use crate::Error;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A contract binary running directly on the host, in its own session.
pub struct HostProcess {
    spec: ProcessSpec,
    addr: CodeAddr,
    child: Option<Child>,
    state: ProcessState,
}

impl HostProcess {
    pub fn new(spec: ProcessSpec) -> Result<Self, Error> {
        let addr = host_addr(&spec)?;
        Ok(Self {
            spec,
            addr,
            child: None,
            state: ProcessState::Created,
        })
    }

    /// The OS id of the process, while it runs.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

#[cfg(unix)]
fn host_addr(spec: &ProcessSpec) -> Result<CodeAddr, Error> {
    let mut sock = spec.binpath.clone();
    sock.set_extension("sock");
    Ok(CodeAddr::Unix(sock))
}

#[cfg(not(unix))]
fn host_addr(_spec: &ProcessSpec) -> Result<CodeAddr, Error> {
    let port = crate::native::process::free_port()?;
    Ok(CodeAddr::Tcp(format!("127.0.0.1:{port}")))
}

#[cfg(unix)]
fn new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: only calls the async-signal-safe setsid between fork and exec
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn new_session(_cmd: &mut Command) {}

/// Sends `signal` to the process group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // SAFETY: kill has no memory safety requirements
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret == -1 {
        debug!(
            "signal {signal} to group {pid}: {}",
            std::io::Error::last_os_error()
        );
    }
}

const SPAWN_ATTEMPTS: usize = 5;

// A binary that was just written may still be open in a child forked
// concurrently by another thread, until that child execs.
fn spawn(cmd: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 1;
    loop {
        match cmd.spawn() {
            #[cfg(unix)]
            Err(err)
                if err.raw_os_error() == Some(libc::ETXTBSY)
                    && attempt < SPAWN_ATTEMPTS =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(50));
            }
            result => return result,
        }
    }
}

impl Process for HostProcess {
    fn start(&mut self) -> Result<(), Error> {
        let (program, args) = self.spec.command();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.spec.dir)
            .env(ENV_PING_TIMEOUT, PING_TIMEOUT_SECS.to_string())
            .env(ENV_CODE_ADDR, self.addr.to_string())
            .envs(self.spec.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        new_session(&mut cmd);

        let child = spawn(&mut cmd).map_err(|err| {
            Error::Process(
                format!(
                    "spawning {} failed: {err}",
                    self.spec.binpath.display()
                )
                .into(),
            )
        })?;

        info!("started contract {} as pid {}", self.spec.name, child.id());
        self.child = Some(child);
        self.state = ProcessState::Started;

        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> Result<(), Error> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let pid = child.id();

        #[cfg(unix)]
        signal_group(pid, libc::SIGTERM);

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("contract {} exited: {status}", self.spec.name);
                    self.state = ProcessState::Stopped;
                    return Ok(());
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("polling pid {pid} failed: {err}");
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }

        warn!("killing contract {} (pid {pid})", self.spec.name);
        #[cfg(unix)]
        signal_group(pid, libc::SIGKILL);
        if let Err(err) = child.kill() {
            debug!("kill pid {pid}: {err}");
        }
        if let Err(err) = child.wait() {
            warn!("reaping pid {pid} failed: {err}");
        }
        self.state = ProcessState::Killed;

        Ok(())
    }

    fn state(&self) -> ProcessState {
        self.state
    }

    fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                let pid = child.id();
                info!("contract {} exited: {status}", self.spec.name);
                // leftovers of the session go with it
                #[cfg(unix)]
                signal_group(pid, libc::SIGKILL);
                self.child = None;
                self.state = ProcessState::Stopped;
                false
            }
            Err(err) => {
                warn!("polling contract {} failed: {err}", self.spec.name);
                true
            }
        }
    }

    fn addr(&self) -> &CodeAddr {
        &self.addr
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[test]
    fn stop_kills_what_ignores_term() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let spec = ProcessSpec {
            name: "stubborn".into(),
            dir: dir.path().to_path_buf(),
            binpath: PathBuf::from("/bin/sh"),
            runtime: String::new(),
            envs: Vec::new(),
        };

        let mut process = HostProcess::new(spec)?;
        // run the shell by hand to pass it a script
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "trap '' TERM; sleep 30"]);
        new_session(&mut cmd);
        let child = cmd.spawn()?;
        let pid = child.id();
        process.child = Some(child);
        process.state = ProcessState::Started;

        // give the shell time to install the trap
        thread::sleep(Duration::from_millis(200));

        let timeout = Duration::from_secs(1);
        let start = Instant::now();
        process.stop(timeout)?;
        let took = start.elapsed();

        assert!(took >= timeout);
        assert!(took < timeout + Duration::from_secs(2));
        assert_eq!(process.state(), ProcessState::Killed);
        assert!(!alive(pid));

        Ok(())
    }

    #[test]
    fn stop_is_quick_for_cooperative_processes() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let spec = ProcessSpec {
            name: "sleeper".into(),
            dir: dir.path().to_path_buf(),
            binpath: PathBuf::from("/bin/sleep"),
            runtime: String::new(),
            envs: Vec::new(),
        };

        let mut process = HostProcess::new(spec)?;
        let mut cmd = Command::new("/bin/sleep");
        cmd.arg("30");
        new_session(&mut cmd);
        process.child = Some(cmd.spawn()?);
        process.state = ProcessState::Started;

        process.stop(Duration::from_secs(5))?;
        assert_eq!(process.state(), ProcessState::Stopped);

        Ok(())
    }

    #[test]
    fn killed_process_is_not_alive() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let spec = ProcessSpec {
            name: "victim".into(),
            dir: dir.path().to_path_buf(),
            binpath: PathBuf::from("/bin/sleep"),
            runtime: String::new(),
            envs: Vec::new(),
        };

        let mut process = HostProcess::new(spec)?;
        let mut cmd = Command::new("/bin/sleep");
        cmd.arg("30");
        new_session(&mut cmd);
        let child = cmd.spawn()?;
        let pid = child.id();
        process.child = Some(child);
        process.state = ProcessState::Started;
        assert!(process.is_alive());

        unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
        let deadline = Instant::now() + Duration::from_secs(5);
        while process.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        assert!(!process.is_alive());
        assert_eq!(process.state(), ProcessState::Stopped);
        assert_eq!(process.pid(), None);

        Ok(())
    }
}
