// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{ConstructorDescriptor, MemberDescriptor, MethodDescriptor};
use crate::error::OptionsError;

use core::fmt;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Settings {
    #[serde(default = "yes")]
    dispose_constructed_objects: bool,
    #[serde(default = "yes")]
    dispose_static_method_return_values: bool,
    #[serde(default)]
    constructors: BTreeSet<ConstructorDescriptor>,
    #[serde(default)]
    methods: BTreeSet<MethodDescriptor>,
    #[serde(default)]
    properties: BTreeSet<MemberDescriptor>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dispose_constructed_objects: true,
            dispose_static_method_return_values: true,
            constructors: BTreeSet::new(),
            methods: BTreeSet::new(),
            properties: BTreeSet::new(),
        }
    }
}

/// Disposal configuration shared by the nodes of an activation.
///
/// Options become read-only the first time a session builds nodes with
/// them; later modifications fail with [`OptionsError::Frozen`]. Explicit
/// registrations only ever add disposal on top of the two global defaults.
/// Removing a registration does not opt a value out of a default that is
/// switched on.
pub struct Options {
    settings: RwLock<Settings>,
    frozen: AtomicBool,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("settings", &*self.settings.read())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Options {
    pub fn new() -> Self {
        Self::from_settings(Settings::default())
    }

    fn from_settings(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn from_json_str(json: &str) -> Result<Options, OptionsError> {
        Ok(Self::from_settings(serde_json::from_str(json)?))
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Options, OptionsError> {
        // Read through the json data model so that tagged types use the same
        // `{ host: Name }` shape in both formats.
        let document: serde_json::Value = serde_yaml::from_str(yaml)?;
        Ok(Self::from_settings(serde_json::from_value(document)?))
    }

    pub fn to_json_str(&self) -> Result<String, OptionsError> {
        Ok(serde_json::to_string_pretty(&*self.settings.read())?)
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    fn modify<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> Result<R, OptionsError> {
        let mut settings = self.settings.write();
        // checked under the write lock so a concurrent freeze cannot interleave
        if self.is_frozen() {
            return Err(OptionsError::Frozen);
        }
        Ok(f(&mut settings))
    }

    pub fn dispose_constructed_objects(&self) -> bool {
        self.settings.read().dispose_constructed_objects
    }

    pub fn set_dispose_constructed_objects(&self, value: bool) -> Result<(), OptionsError> {
        self.modify(|s| s.dispose_constructed_objects = value)
    }

    pub fn dispose_static_method_return_values(&self) -> bool {
        self.settings.read().dispose_static_method_return_values
    }

    pub fn set_dispose_static_method_return_values(
        &self,
        value: bool,
    ) -> Result<(), OptionsError> {
        self.modify(|s| s.dispose_static_method_return_values = value)
    }

    /// Returns `false` if the constructor was already registered.
    pub fn add_constructed_type_disposal(
        &self,
        constructor: ConstructorDescriptor,
    ) -> Result<bool, OptionsError> {
        self.modify(|s| s.constructors.insert(constructor))
    }

    pub fn remove_constructed_type_disposal(
        &self,
        constructor: &ConstructorDescriptor,
    ) -> Result<bool, OptionsError> {
        self.modify(|s| s.constructors.remove(constructor))
    }

    pub fn add_method_return_value_disposal(
        &self,
        method: MethodDescriptor,
    ) -> Result<bool, OptionsError> {
        self.modify(|s| s.methods.insert(method))
    }

    pub fn remove_method_return_value_disposal(
        &self,
        method: &MethodDescriptor,
    ) -> Result<bool, OptionsError> {
        self.modify(|s| s.methods.remove(method))
    }

    pub fn add_property_value_disposal(
        &self,
        property: MemberDescriptor,
    ) -> Result<bool, OptionsError> {
        self.modify(|s| s.properties.insert(property))
    }

    pub fn remove_property_value_disposal(
        &self,
        property: &MemberDescriptor,
    ) -> Result<bool, OptionsError> {
        self.modify(|s| s.properties.remove(property))
    }

    pub fn is_constructed_type_disposed(&self, constructor: &ConstructorDescriptor) -> bool {
        let settings = self.settings.read();
        settings.dispose_constructed_objects || settings.constructors.contains(constructor)
    }

    pub fn is_method_return_value_disposed(&self, method: &MethodDescriptor) -> bool {
        let settings = self.settings.read();
        (method.is_static && settings.dispose_static_method_return_values)
            || settings.methods.contains(method)
    }

    pub fn is_property_value_disposed(&self, property: &MemberDescriptor) -> bool {
        self.settings.read().properties.contains(property)
    }
}
