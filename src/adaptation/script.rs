// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Seam to an embedded scripting host.
//!
//! The host itself is not part of this crate. It provides a
//! [`ScriptLoader`] that turns a file into a [`ScriptModule`].

use std::{path::Path, sync::Mutex};

use enum_as_inner::EnumAsInner;
use thiserror::Error;

use crate::{codec, midi::flatten_sysex, SysexMessage};

/// Serializes all calls into the scripting host.
///
/// Must never be held while waiting for I/O.
pub static INTERPRETER_LOCK: Mutex<()> = Mutex::new(());

/// Values exchanged with script functions
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum ScriptValue {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ScriptValue>),
    Tuple(Vec<ScriptValue>),
    /// Key/value pairs in insertion order
    Map(Vec<(ScriptValue, ScriptValue)>),
}

impl ScriptValue {
    /// Bytes as a list of integers
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::List(bytes.iter().copied().map(|byte| Self::Int(byte.into())).collect())
    }

    /// All messages concatenated into a single list of integers
    #[must_use]
    pub fn from_messages(messages: &[SysexMessage]) -> Self {
        Self::from_bytes(&flatten_sysex(messages))
    }

    /// Each message as a separate list of integers
    #[must_use]
    pub fn from_message_list(messages: &[SysexMessage]) -> Self {
        Self::List(
            messages
                .iter()
                .map(|message| Self::from_bytes(message.as_bytes()))
                .collect(),
        )
    }

    /// Truth value with the usual scripting semantics
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Str(value) => !value.is_empty(),
            Self::List(values) | Self::Tuple(values) => !values.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    /// Look up an entry of a map by its string key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map()?
            .iter()
            .find_map(|(k, v)| (k.as_str().map(String::as_str) == Some(key)).then_some(v))
    }

    /// Convert a list or tuple of integers into bytes.
    ///
    /// Fails on values outside of 0..=255 instead of clamping them.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScriptCallError> {
        let (Self::List(values) | Self::Tuple(values)) = self else {
            return Err(ScriptCallError::unexpected("list of integers", self));
        };
        let values = values
            .iter()
            .map(|value| {
                value
                    .as_int()
                    .copied()
                    .ok_or_else(|| ScriptCallError::unexpected("integer", value))
            })
            .collect::<Result<Vec<_>, _>>()?;
        codec::bytes_from_values(values.as_slice()).map_err(Into::into)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u8> for ScriptValue {
    fn from(value: u8) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for ScriptValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[derive(Debug, Error)]
pub enum ScriptCallError {
    #[error("function not found")]
    FunctionNotFound,

    /// Raised by the script
    #[error("{0}")]
    Runtime(String),

    #[error("expected {expected}, got {value:?}")]
    UnexpectedResult {
        expected: &'static str,
        value: ScriptValue,
    },

    #[error(transparent)]
    Codec(#[from] codec::Error),
}

impl ScriptCallError {
    #[must_use]
    pub fn unexpected(expected: &'static str, value: &ScriptValue) -> Self {
        Self::UnexpectedResult {
            expected,
            value: value.clone(),
        }
    }
}

/// A loaded script module
pub trait ScriptModule: Send {
    /// Whether the module defines a function with the given name
    fn has_function(&self, name: &str) -> bool;

    /// Invoke a function.
    ///
    /// Only called while holding the [`INTERPRETER_LOCK`].
    fn call(&mut self, name: &str, args: Vec<ScriptValue>) -> Result<ScriptValue, ScriptCallError>;
}

/// Loads script modules from files
pub trait ScriptLoader: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn ScriptModule>>;
}
