// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};

use crate::instance::{InstanceCreator, InstanceCreatorConfig};
use crate::{ContractType, Error};

/// Builds an [`InstanceCreator`] from its configuration.
pub type NewInstanceCreatorFunc =
    fn(&InstanceCreatorConfig) -> Result<Box<dyn InstanceCreator>, Error>;

/// The table of drivers available for each contract type.
///
/// Filled once at start-up and handed to [`XBridge::new`].
///
/// [`XBridge::new`]: crate::XBridge::new
#[derive(Default)]
pub struct CreatorRegistry {
    creators: BTreeMap<(ContractType, String), NewInstanceCreatorFunc>,
}

impl Debug for CreatorRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.creators.keys()).finish()
    }
}

impl CreatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the drivers shipped with this crate: `native` for
    /// native contracts and `default` for kernel contracts.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            ContractType::Native,
            "native",
            crate::native::new_native_creator,
        );
        registry.register(
            ContractType::Kernel,
            "default",
            crate::kernel::new_kernel_creator,
        );
        registry
    }

    /// Registers `factory` as the driver `name` for `tp`.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered for the
    /// type.
    pub fn register(
        &mut self,
        tp: ContractType,
        name: &str,
        factory: NewInstanceCreatorFunc,
    ) {
        let key = (tp, name.to_owned());
        if self.creators.contains_key(&key) {
            panic!("driver {name} for contract type {tp} exists");
        }
        self.creators.insert(key, factory);
    }

    /// Opens the driver `name` for `tp`.
    pub fn open(
        &self,
        tp: ContractType,
        name: &str,
        config: &InstanceCreatorConfig,
    ) -> Result<Box<dyn InstanceCreator>, Error> {
        let factory = self
            .creators
            .get(&(tp, name.to_owned()))
            .ok_or_else(|| Error::DriverNotFound {
                tp,
                driver: name.to_owned(),
            })?;
        factory(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_provider::ContractCodeProvider;
    use crate::{Context, Instance};

    struct NoopCreator;

    impl InstanceCreator for NoopCreator {
        fn create_instance(
            &self,
            _ctx: &Context,
            _cp: &dyn ContractCodeProvider,
        ) -> Result<Box<dyn Instance>, Error> {
            Err(Error::Process("noop".into()))
        }

        fn remove_cache(&self, _name: &str) {}
    }

    fn noop(
        _config: &InstanceCreatorConfig,
    ) -> Result<Box<dyn InstanceCreator>, Error> {
        Ok(Box::new(NoopCreator))
    }

    #[test]
    #[should_panic(expected = "driver xvm for contract type wasm exists")]
    fn duplicate_registration_panics() {
        let mut registry = CreatorRegistry::new();
        registry.register(ContractType::Wasm, "xvm", noop);
        registry.register(ContractType::Wasm, "xvm", noop);
    }

    #[test]
    fn same_name_different_types() {
        let mut registry = CreatorRegistry::new();
        registry.register(ContractType::Wasm, "xvm", noop);
        registry.register(ContractType::Evm, "xvm", noop);
    }
}
