// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Active devices and their capabilities.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    adaptation::{LoadError, ScriptErrorReporter, ScriptLoader},
    capability_ref, Adaptation, Capability, CapabilityRef, CapabilityRole, Device,
};

/// Identifier of registered devices
///
/// Opaque, 0-based, consecutive index that enumerates registered devices.
///
/// The value depends on the order of registration and must neither
/// be hard-coded nor stored persistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[repr(transparent)]
pub struct RegisteredId(usize);

#[derive(Debug, Error)]
pub enum Error {
    #[error("{device} does not support {capability}")]
    CapabilityNotSupported {
        device: String,
        capability: Capability,
    },

    #[error("no device registered with id {0}")]
    DeviceNotRegistered(RegisteredId),
}

pub type Result<T> = std::result::Result<T, Error>;

enum RegistryEntry {
    Native(Box<dyn Device>),
    Adaptation(Adaptation),
}

impl RegistryEntry {
    fn device(&self) -> &dyn Device {
        match self {
            Self::Native(device) => device.as_ref(),
            Self::Adaptation(adaptation) => adaptation,
        }
    }
}

const fn registry_entry_id(id: RegisteredId) -> usize {
    let RegisteredId(entry_id) = id;
    entry_id
}

/// Device registry
///
/// Devices are never removed. Script-backed devices that fail to load
/// are not registered.
#[derive(Default)]
#[allow(missing_debug_implementations)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, entry: RegistryEntry) -> RegisteredId {
        let id = RegisteredId(self.entries.len());
        log::debug!("Registering {name} as {id}", name = entry.device().name());
        self.entries.push(entry);
        id
    }

    pub fn register(&mut self, device: Box<dyn Device>) -> RegisteredId {
        self.push(RegistryEntry::Native(device))
    }

    pub fn register_adaptation(&mut self, adaptation: Adaptation) -> RegisteredId {
        self.push(RegistryEntry::Adaptation(adaptation))
    }

    /// Load and register script-backed devices.
    ///
    /// Modules that fail to load are logged and skipped.
    pub fn load_adaptations<I, P>(
        &mut self,
        loader: &dyn ScriptLoader,
        paths: I,
        reporter: &ScriptErrorReporter,
    ) -> Vec<RegisteredId>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths
            .into_iter()
            .filter_map(|path| {
                let path = path.into();
                match Adaptation::load(loader, path.clone(), reporter.clone()) {
                    Ok(adaptation) => Some(self.register_adaptation(adaptation)),
                    Err(err) => {
                        log::error!(
                            "Failed to load adaptation from {path}: {err}",
                            path = path.display()
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Reload all script-backed devices.
    ///
    /// Returns the devices that failed to reload. They keep
    /// their previous module.
    pub fn reload_adaptations(&self, loader: &dyn ScriptLoader) -> Vec<(RegisteredId, LoadError)> {
        self.iter_entries()
            .filter_map(|(id, entry)| {
                let RegistryEntry::Adaptation(adaptation) = entry else {
                    return None;
                };
                adaptation.reload(loader).err().map(|err| {
                    log::warn!(
                        "Failed to reload adaptation from {path}: {err}",
                        path = adaptation.path().display()
                    );
                    (id, err)
                })
            })
            .collect()
    }

    fn iter_entries(&self) -> impl Iterator<Item = (RegisteredId, &RegistryEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (RegisteredId(index), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: RegisteredId) -> Option<&dyn Device> {
        self.entries
            .get(registry_entry_id(id))
            .map(RegistryEntry::device)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegisteredId, &dyn Device)> {
        self.iter_entries().map(|(id, entry)| (id, entry.device()))
    }

    /// Bind a capability of a registered device.
    ///
    /// Returns `None` if the device is unknown or does not
    /// support the capability.
    #[must_use]
    pub fn request_capability(
        &self,
        id: RegisteredId,
        capability: Capability,
    ) -> Option<CapabilityRef<'_>> {
        capability_ref(self.get(id)?, capability)
    }

    /// Bind a capability that the caller depends on.
    pub fn require<'a, T>(&'a self, id: RegisteredId) -> Result<&'a T>
    where
        T: CapabilityRole<'a> + ?Sized,
    {
        let device = self.get(id).ok_or(Error::DeviceNotRegistered(id))?;
        T::bind(device).ok_or_else(|| Error::CapabilityNotSupported {
            device: device.name().into_owned(),
            capability: T::CAPABILITY,
        })
    }
}
