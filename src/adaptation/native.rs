// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Script modules implemented in Rust.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use super::script::{ScriptCallError, ScriptLoader, ScriptModule, ScriptValue};

type NativeFunction =
    Box<dyn FnMut(Vec<ScriptValue>) -> Result<ScriptValue, ScriptCallError> + Send>;

/// A module with functions backed by closures
#[derive(Default)]
pub struct NativeModule {
    functions: HashMap<String, NativeFunction>,
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.functions.keys().collect::<Vec<_>>();
        names.sort_unstable();
        f.debug_struct("NativeModule")
            .field("functions", &names)
            .finish()
    }
}

impl NativeModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: FnMut(Vec<ScriptValue>) -> Result<ScriptValue, ScriptCallError> + Send + 'static,
    {
        self.functions.insert(name.into(), Box::new(function));
        self
    }

    /// A function that always returns the same value
    #[must_use]
    pub fn with_constant(self, name: impl Into<String>, value: impl Into<ScriptValue>) -> Self {
        let value = value.into();
        self.with_function(name, move |_| Ok(value.clone()))
    }
}

impl ScriptModule for NativeModule {
    fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn call(&mut self, name: &str, args: Vec<ScriptValue>) -> Result<ScriptValue, ScriptCallError> {
        let function = self
            .functions
            .get_mut(name)
            .ok_or(ScriptCallError::FunctionNotFound)?;
        function(args)
    }
}

type ModuleFactory = Box<dyn Fn() -> NativeModule + Send + Sync>;

/// Loads [`NativeModule`]s that are registered for a path
#[derive(Default)]
pub struct NativeLoader {
    factories: HashMap<PathBuf, ModuleFactory>,
}

impl std::fmt::Debug for NativeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLoader")
            .field("paths", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NativeLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the factory for a path.
    pub fn register<F>(&mut self, path: impl Into<PathBuf>, factory: F)
    where
        F: Fn() -> NativeModule + Send + Sync + 'static,
    {
        self.factories.insert(path.into(), Box::new(factory));
    }
}

impl ScriptLoader for NativeLoader {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn ScriptModule>> {
        let Some(factory) = self.factories.get(path) else {
            anyhow::bail!("no module registered for {path}", path = path.display());
        };
        Ok(Box::new(factory()))
    }
}
