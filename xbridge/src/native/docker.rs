// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::process::{Command, Output};
use std::time::Duration;

use tracing::{debug, info, warn};
use xbridge_uplink::{CodeAddr, ENV_CODE_ADDR, ENV_PING_TIMEOUT, PING_TIMEOUT_SECS};

use crate::config::NativeDockerConfig;
use crate::native::process::free_port;
use crate::native::{Process, ProcessSpec, ProcessState};
use crate::util::ram_in_bytes;
use crate::Error;

const CPU_PERIOD: i64 = 100_000;

/// A contract binary running in a docker container, driven through the
/// `docker` command line.
pub struct DockerProcess {
    spec: ProcessSpec,
    config: NativeDockerConfig,
    port: u16,
    addr: CodeAddr,
    container: Option<String>,
    state: ProcessState,
}

impl DockerProcess {
    pub fn new(
        spec: ProcessSpec,
        config: NativeDockerConfig,
    ) -> Result<Self, Error> {
        let port = free_port()?;
        Ok(Self {
            spec,
            config,
            port,
            addr: CodeAddr::Tcp(format!("127.0.0.1:{port}")),
            container: None,
            state: ProcessState::Created,
        })
    }

    /// The id of the running container.
    pub fn container_id(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Arguments of the `docker run` starting the contract.
    pub fn run_args(&self) -> Result<Vec<String>, Error> {
        let dir = self.spec.dir.display().to_string();

        let mut args = vec![
            "run".to_owned(),
            "--detach".to_owned(),
            "--rm".to_owned(),
            format!("--cpu-period={CPU_PERIOD}"),
        ];

        let quota = (self.config.cpus * CPU_PERIOD as f64) as i64;
        if quota > 0 {
            args.push(format!("--cpu-quota={quota}"));
        }
        if !self.config.memory.is_empty() {
            let bytes = ram_in_bytes(&self.config.memory)?;
            args.push(format!("--memory={bytes}"));
        }

        args.push(format!("--volume={dir}:{dir}"));
        args.push(format!("--workdir={dir}"));
        if let Some(user) = host_user() {
            args.push(format!("--user={user}"));
        }

        args.push(format!(
            "--env={ENV_PING_TIMEOUT}={PING_TIMEOUT_SECS}"
        ));
        for (k, v) in &self.spec.envs {
            args.push(format!("--env={k}={v}"));
        }

        if cfg!(target_os = "linux") {
            args.push("--network=host".to_owned());
        } else {
            let port = self.port;
            args.push(format!("--publish=127.0.0.1:{port}:{port}"));
        }
        // the host connects to `self.addr` on loopback
        args.push(format!(
            "--env={ENV_CODE_ADDR}=tcp://0.0.0.0:{}",
            self.port
        ));

        args.push(self.config.image_name.clone());
        let (program, program_args) = self.spec.command();
        args.push(program);
        args.extend(program_args);

        Ok(args)
    }
}

#[cfg(unix)]
fn host_user() -> Option<String> {
    // SAFETY: getuid and getgid always succeed
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    Some(format!("{uid}:{gid}"))
}

#[cfg(not(unix))]
fn host_user() -> Option<String> {
    None
}

fn docker<I, S>(args: I) -> Result<Output, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new("docker")
        .args(args)
        .output()
        .map_err(|err| Error::Docker(format!("running docker: {err}").into()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Docker(stderr.trim().to_owned().into()));
    }
    Ok(output)
}

impl Process for DockerProcess {
    fn start(&mut self) -> Result<(), Error> {
        let output = docker(self.run_args()?)?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_owned();

        info!("started contract {} in container {id}", self.spec.name);
        self.container = Some(id);
        self.state = ProcessState::Started;

        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> Result<(), Error> {
        let Some(id) = self.container.take() else {
            return Ok(());
        };

        let secs = timeout.as_secs().to_string();
        if let Err(err) = docker(["stop", "-t", &secs, &id]) {
            warn!("stopping container {id} failed: {err}");
        }
        // the container is removed on exit, so it may already be gone
        if let Err(err) = docker(["wait", &id]) {
            warn!("waiting for container {id} failed: {err}");
        }

        info!("stopped container {id} of contract {}", self.spec.name);
        self.state = ProcessState::Stopped;

        Ok(())
    }

    fn state(&self) -> ProcessState {
        self.state
    }

    fn is_alive(&mut self) -> bool {
        let Some(id) = &self.container else {
            return false;
        };

        match docker(["inspect", "--format={{.State.Running}}", id]) {
            Ok(output)
                if String::from_utf8_lossy(&output.stdout).trim() == "true" =>
            {
                true
            }
            result => {
                if let Err(err) = result {
                    debug!("inspecting container {id}: {err}");
                }
                info!("container {id} of contract {} exited", self.spec.name);
                self.container = None;
                self.state = ProcessState::Stopped;
                false
            }
        }
    }

    fn addr(&self) -> &CodeAddr {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn run_args_carry_limits_and_mounts() -> Result<(), Error> {
        let spec = ProcessSpec {
            name: "counter".into(),
            dir: PathBuf::from("/data/native/counter"),
            binpath: PathBuf::from("/data/native/counter/nativecode-a1b2c3"),
            runtime: "c".into(),
            envs: vec![("FOO".into(), "bar".into())],
        };
        let config = NativeDockerConfig {
            enable: true,
            image_name: "alpine".into(),
            cpus: 0.5,
            memory: "512m".into(),
        };

        let process = DockerProcess::new(spec, config)?;
        let args = process.run_args()?;

        assert!(args.contains(&"--cpu-period=100000".to_owned()));
        assert!(args.contains(&"--cpu-quota=50000".to_owned()));
        assert!(args.contains(&format!("--memory={}", 512 * 1024 * 1024)));
        assert!(args
            .contains(&"--volume=/data/native/counter:/data/native/counter".to_owned()));
        assert!(args.contains(&"--env=FOO=bar".to_owned()));
        assert!(args.contains(&"--rm".to_owned()));
        assert!(args.contains(&format!(
            "--env={ENV_CODE_ADDR}=tcp://0.0.0.0:{}",
            process.port
        )));

        let image = args.iter().position(|a| a == "alpine");
        assert_eq!(image, Some(args.len() - 2));
        assert_eq!(
            args.last().map(String::as_str),
            Some("/data/native/counter/nativecode-a1b2c3")
        );

        Ok(())
    }
}
