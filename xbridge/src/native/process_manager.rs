// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::code_provider::ContractCodeProvider;
use crate::native::{ContractProcess, Launcher, ProcessSpec};
use crate::{Descriptor, Error};

/// Identifies one deployed version of a contract.
pub fn content_hash(name: &str, digest: &[u8]) -> String {
    format!("{name}{}", hex::encode(digest))
}

#[derive(Default)]
struct ProcessTable {
    by_hash: HashMap<String, Arc<ContractProcess>>,
    /// The hash currently live for each contract name.
    by_name: HashMap<String, String>,
}

/// Keeps at most one process per contract, reusing it for as long as the
/// contract's code does not change.
pub struct ProcessManager {
    basedir: PathBuf,
    launcher: Box<dyn Launcher>,
    stop_timeout: Duration,
    table: Mutex<ProcessTable>,
}

impl ProcessManager {
    pub fn new<P: Into<PathBuf>>(
        basedir: P,
        launcher: Box<dyn Launcher>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            basedir: basedir.into(),
            launcher,
            stop_timeout,
            table: Mutex::new(ProcessTable::default()),
        }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Returns the process running the current code of `name`, starting it
    /// if necessary.
    pub fn get_process(
        &self,
        name: &str,
        cp: &dyn ContractCodeProvider,
    ) -> Result<Arc<ContractProcess>, Error> {
        let desc = cp.get_contract_code_desc(name)?;
        let hash = content_hash(name, &desc.digest);

        let found = self.table.lock().by_hash.get(&hash).cloned();
        if let Some(process) = found {
            if process.is_alive() {
                return Ok(process);
            }
            warn!("process of contract {name} died, starting a new one");
            self.evict(name, &process);
        }

        let code = cp.get_contract_code(name)?;
        self.make_process(name, &desc, &code, hash)
    }

    fn make_process(
        &self,
        name: &str,
        desc: &Descriptor,
        code: &[u8],
        hash: String,
    ) -> Result<Arc<ContractProcess>, Error> {
        let old = {
            let mut table = self.table.lock();
            match table.by_name.get(name) {
                Some(old_hash) if *old_hash != hash => {
                    let old_hash = old_hash.clone();
                    table.by_name.remove(name);
                    table.by_hash.remove(&old_hash)
                }
                _ => None,
            }
        };
        if let Some(old) = old {
            info!("stopping outdated process of contract {name}");
            old.stop();
        }

        let dir = self.basedir.join(name);
        fs::create_dir_all(&dir)?;

        let short = &desc.digest[..desc.digest.len().min(3)];
        let binpath = dir.join(format!(
            "nativecode-{}{}",
            hex::encode(short),
            ProcessSpec::extension(&desc.runtime)
        ));
        write_executable(&dir, &binpath, code)?;

        let process = self.launcher.launch(ProcessSpec {
            name: name.to_owned(),
            dir,
            binpath,
            runtime: desc.runtime.clone(),
            envs: Vec::new(),
        })?;
        let process = Arc::new(ContractProcess::new(
            name.to_owned(),
            hash.clone(),
            process,
            self.stop_timeout,
        ));

        if let Err(err) = process.start() {
            process.stop();
            return Err(err);
        }

        let existing = {
            let mut table = self.table.lock();
            match table.by_hash.get(&hash) {
                Some(existing) => Some(existing.clone()),
                None => {
                    table.by_name.insert(name.to_owned(), hash.clone());
                    table.by_hash.insert(hash, process.clone());
                    None
                }
            }
        };

        // someone else started the same version meanwhile
        if let Some(existing) = existing {
            debug!("discarding duplicate process of contract {name}");
            process.stop();
            return Ok(existing);
        }

        Ok(process)
    }

    // Forgets `process` if it is still the one registered for `name`.
    fn evict(&self, name: &str, process: &Arc<ContractProcess>) {
        {
            let mut table = self.table.lock();
            let hash = process.content_hash();
            let current = table.by_hash.get(hash);
            if current.is_some_and(|p| Arc::ptr_eq(p, process)) {
                table.by_hash.remove(hash);
                if table.by_name.get(name).map(String::as_str) == Some(hash) {
                    table.by_name.remove(name);
                }
            }
        }
        process.stop();
    }

    /// Stops and forgets the process of `name`, if any.
    pub fn remove(&self, name: &str) {
        let process = {
            let mut table = self.table.lock();
            table
                .by_name
                .remove(name)
                .and_then(|hash| table.by_hash.remove(&hash))
        };
        if let Some(process) = process {
            info!("removing process of contract {name}");
            process.stop();
        }
    }

    /// Number of processes being tracked.
    pub fn len(&self) -> usize {
        self.table.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().by_hash.is_empty()
    }
}

// Written aside and moved in place, so a binary being executed is never
// modified.
fn write_executable(dir: &Path, path: &Path, code: &[u8]) -> Result<(), Error> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(code)?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o755))?;
    }

    file.persist(path).map_err(|err| Error::from(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use xbridge_uplink::CodeAddr;

    use super::*;
    use crate::code_provider::SandboxCodeProvider;
    use crate::descriptor::{code_desc_key, code_key, CONTRACT_BUCKET};
    use crate::native::{Process, ProcessState};
    use crate::sandbox::{MemXModel, StateSandbox};

    #[derive(Default)]
    struct Counters {
        launched: AtomicUsize,
        stopped: AtomicUsize,
        /// Launch number of a process that died on its own.
        crashed: AtomicUsize,
    }

    struct FakeProcess {
        counters: Arc<Counters>,
        _listener: TcpListener,
        addr: CodeAddr,
        state: ProcessState,
        fail_start: bool,
        number: usize,
    }

    impl Process for FakeProcess {
        fn start(&mut self) -> Result<(), Error> {
            if self.fail_start {
                return Err(Error::Process("refusing to start".into()));
            }
            self.state = ProcessState::Started;
            Ok(())
        }

        fn stop(&mut self, _timeout: Duration) -> Result<(), Error> {
            if self.state == ProcessState::Started {
                self.counters.stopped.fetch_add(1, Ordering::SeqCst);
            }
            self.state = ProcessState::Stopped;
            Ok(())
        }

        fn state(&self) -> ProcessState {
            self.state
        }

        fn is_alive(&mut self) -> bool {
            self.state == ProcessState::Started
                && self.counters.crashed.load(Ordering::SeqCst) != self.number
        }

        fn addr(&self) -> &CodeAddr {
            &self.addr
        }
    }

    struct FakeLauncher {
        counters: Arc<Counters>,
        fail_start: bool,
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, spec: ProcessSpec) -> Result<Box<dyn Process>, Error> {
            assert!(spec.binpath.exists());
            let number =
                self.counters.launched.fetch_add(1, Ordering::SeqCst) + 1;

            // connections are queued by the kernel, no need to accept them
            let listener = TcpListener::bind("127.0.0.1:0")?;
            let addr = CodeAddr::Tcp(listener.local_addr()?.to_string());
            Ok(Box::new(FakeProcess {
                counters: self.counters.clone(),
                _listener: listener,
                addr,
                state: ProcessState::Created,
                fail_start: self.fail_start,
                number,
            }))
        }
    }

    fn deploy(state: &StateSandbox, name: &str, code: &[u8]) -> Result<(), Error> {
        let mut desc = Descriptor::new("c", "native");
        desc.digest = crate::descriptor::double_sha256(code);
        state.put(CONTRACT_BUCKET, &code_desc_key(name), desc.to_bytes()?)?;
        state.put(CONTRACT_BUCKET, &code_key(name), code.to_vec())?;
        Ok(())
    }

    fn manager(
        dir: &Path,
        fail_start: bool,
    ) -> (ProcessManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let launcher = FakeLauncher {
            counters: counters.clone(),
            fail_start,
        };
        let pm = ProcessManager::new(
            dir,
            Box::new(launcher),
            Duration::from_secs(1),
        );
        (pm, counters)
    }

    #[test]
    fn processes_are_reused_until_code_changes() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let (pm, counters) = manager(dir.path(), false);

        let state = StateSandbox::new(Arc::new(MemXModel::new()));
        let cp = SandboxCodeProvider::new(state.clone());

        deploy(&state, "counter", b"version one")?;
        let first = pm.get_process("counter", &cp)?;
        let again = pm.get_process("counter", &cp)?;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 0);

        deploy(&state, "counter", b"version two")?;
        let second = pm.get_process("counter", &cp)?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.content_hash(), second.content_hash());
        assert_eq!(counters.launched.load(Ordering::SeqCst), 2);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(pm.len(), 1);

        // both versions are on disk under their short digests
        let binaries = fs::read_dir(dir.path().join("counter"))?.count();
        assert_eq!(binaries, 2);

        pm.remove("counter");
        assert!(pm.is_empty());
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[test]
    fn failed_start_registers_nothing() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let (pm, counters) = manager(dir.path(), true);

        let state = StateSandbox::new(Arc::new(MemXModel::new()));
        let cp = SandboxCodeProvider::new(state.clone());
        deploy(&state, "counter", b"code")?;

        assert!(matches!(
            pm.get_process("counter", &cp),
            Err(Error::Process(_))
        ));
        assert!(pm.is_empty());

        // a retry starts from scratch
        assert!(pm.get_process("counter", &cp).is_err());
        assert_eq!(counters.launched.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[test]
    fn dead_process_is_replaced() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let (pm, counters) = manager(dir.path(), false);

        let state = StateSandbox::new(Arc::new(MemXModel::new()));
        let cp = SandboxCodeProvider::new(state.clone());
        deploy(&state, "counter", b"code")?;

        let first = pm.get_process("counter", &cp)?;
        counters.crashed.store(1, Ordering::SeqCst);
        assert!(!first.is_alive());

        let second = pm.get_process("counter", &cp)?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_alive());
        assert_eq!(first.content_hash(), second.content_hash());
        assert_eq!(counters.launched.load(Ordering::SeqCst), 2);
        assert_eq!(pm.len(), 1);

        let again = pm.get_process("counter", &cp)?;
        assert!(Arc::ptr_eq(&second, &again));

        Ok(())
    }
}
