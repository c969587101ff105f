// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Configuration of the contract host.
//!
//! Loaded from TOML with [`ContractConfig::from_file`], or built in code.
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kernel::KernRegistry;
use crate::util::ram_in_bytes;
use crate::{ContractType, Error};

/// Top-level configuration of the contract host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Whether deployed contracts may have their code replaced.
    pub enable_upgrade: bool,
    pub native: NativeConfig,
    pub wasm: WasmConfig,
    pub xkernel: XkernelConfig,
    pub evm: EvmConfig,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            enable_upgrade: true,
            native: NativeConfig::default(),
            wasm: WasmConfig::default(),
            xkernel: XkernelConfig::default(),
            evm: EvmConfig::default(),
        }
    }
}

impl ContractConfig {
    /// Loads the configuration from a TOML file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)
            .map_err(|err| Error::Config(err.to_string().into()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `XBRIDGE_*` environment variable overrides.
    ///
    /// - `XBRIDGE_ENABLE_UPGRADE`
    /// - `XBRIDGE_NATIVE_ENABLE`
    /// - `XBRIDGE_NATIVE_DOCKER_ENABLE`
    /// - `XBRIDGE_NATIVE_DOCKER_IMAGE`
    pub fn apply_env_overrides(&mut self) {
        fn flag(name: &str) -> Option<bool> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        if let Some(v) = flag("XBRIDGE_ENABLE_UPGRADE") {
            self.enable_upgrade = v;
        }
        if let Some(v) = flag("XBRIDGE_NATIVE_ENABLE") {
            self.native.enable = v;
        }
        if let Some(v) = flag("XBRIDGE_NATIVE_DOCKER_ENABLE") {
            self.native.docker.enable = v;
        }
        if let Ok(image) = std::env::var("XBRIDGE_NATIVE_DOCKER_IMAGE") {
            self.native.docker.image_name = image;
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.wasm.xvm.opt_level > 3 {
            return Err(Error::Config(
                format!(
                    "xvm opt_level must be in [0, 3], got {}",
                    self.wasm.xvm.opt_level
                )
                .into(),
            ));
        }

        let docker = &self.native.docker;
        if docker.cpus < 0.0 {
            return Err(Error::Config(
                format!("docker cpus must not be negative, got {}", docker.cpus)
                    .into(),
            ));
        }
        if !docker.memory.is_empty() {
            ram_in_bytes(&docker.memory)?;
        }

        Ok(())
    }

    /// Returns the driver settings for `tp`, if that type is enabled.
    pub fn vm_config(
        &self,
        tp: ContractType,
        registry: &Arc<KernRegistry>,
    ) -> Option<VmConfig> {
        let config = match tp {
            ContractType::Wasm => VmConfig::Wasm(self.wasm.clone()),
            ContractType::Native => VmConfig::Native(self.native.clone()),
            ContractType::Evm => VmConfig::Evm(self.evm.clone()),
            ContractType::Kernel => {
                VmConfig::Kernel(self.xkernel.clone(), registry.clone())
            }
        };
        config.is_enable().then_some(config)
    }
}

/// Settings for native contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub enable: bool,
    pub driver: String,
    /// Seconds a contract process is given to exit before being killed.
    pub stop_timeout: u64,
    pub docker: NativeDockerConfig,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            enable: true,
            driver: ContractType::Native.default_driver().into(),
            stop_timeout: 3,
            docker: NativeDockerConfig::default(),
        }
    }
}

impl NativeConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }
}

/// Settings for running native contracts inside containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeDockerConfig {
    pub enable: bool,
    pub image_name: String,
    pub cpus: f64,
    /// Memory cap such as `1G` or `512m`. Empty means no cap.
    pub memory: String,
}

impl Default for NativeDockerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            image_name: "alpine".into(),
            cpus: 1.0,
            memory: "1G".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmConfig {
    pub enable: bool,
    pub driver: String,
    pub xvm: XvmConfig,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            enable: false,
            driver: ContractType::Wasm.default_driver().into(),
            xvm: XvmConfig::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XvmConfig {
    /// Optimization level of the compiled code, 0 to 3.
    pub opt_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XkernelConfig {
    pub enable: bool,
    pub driver: String,
}

impl Default for XkernelConfig {
    fn default() -> Self {
        Self {
            enable: true,
            driver: ContractType::Kernel.default_driver().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvmConfig {
    pub enable: bool,
    pub driver: String,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            enable: false,
            driver: ContractType::Evm.default_driver().into(),
        }
    }
}

/// The settings handed to a driver when it is opened.
#[derive(Debug, Clone)]
pub enum VmConfig {
    Wasm(WasmConfig),
    Native(NativeConfig),
    Evm(EvmConfig),
    Kernel(XkernelConfig, Arc<KernRegistry>),
}

impl VmConfig {
    pub fn driver_name(&self) -> &str {
        match self {
            Self::Wasm(c) => &c.driver,
            Self::Native(c) => &c.driver,
            Self::Evm(c) => &c.driver,
            Self::Kernel(c, _) => &c.driver,
        }
    }

    pub fn is_enable(&self) -> bool {
        match self {
            Self::Wasm(c) => c.enable,
            Self::Native(c) => c.enable,
            Self::Evm(c) => c.enable,
            Self::Kernel(c, _) => c.enable,
        }
    }
}
