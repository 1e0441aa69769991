// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Generic devices that are implemented by script modules.
//!
//! Capabilities are derived from the functions a module defines. They
//! are probed once when the module is loaded and never change until
//! the module is reloaded.
//!
//! Failing script calls never propagate. They are reported through a
//! [`ScriptErrorReporter`] and result in an empty value.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex, MutexGuard, PoisonError, RwLock,
    },
    time::Duration,
};

use thiserror::Error;

use crate::{
    capability::DEFAULT_TIMEOUT, midi::flatten_sysex, parse_midi_messages, split_sysex,
    BankDescriptor, BankDumpCapability, BankNumber, Capability, CustomProgramChangeCapability,
    Device, DeviceDetection, EditBufferCapability, GlobalSettingsCapability,
    HasBankDescriptorsCapability, HasBanksCapability, MidiChannel, MidiMessage, Patch, PatchData,
    ProgramDumpCapability, ProgramNumber, SysexMessage,
};

pub mod cache;
use self::cache::HashCache;

pub mod functions;
use self::functions::{probe_functions, BankExtraction, ProbedFunctions};

pub mod native;
pub use self::native::{NativeLoader, NativeModule};

pub mod report;
pub use self::report::{spawn_script_error_log_task, ScriptErrorReport, ScriptErrorReporter};

pub mod script;
pub use self::script::{
    ScriptCallError, ScriptLoader, ScriptModule, ScriptValue, INTERPRETER_LOCK,
};

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing function {0}()")]
    MissingFunction(&'static str),

    #[error("{function}() failed: {source}")]
    Call {
        function: &'static str,
        #[source]
        source: ScriptCallError,
    },

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Properties of a loaded module
#[derive(Debug, Clone)]
struct ModuleInfo {
    name: String,
    functions: ProbedFunctions,
    timeout: Option<Duration>,
    message_delay: Option<Duration>,
}

fn call_on_load(
    module: &mut dyn ScriptModule,
    function: &'static str,
) -> Result<ScriptValue, LoadError> {
    let _interpreter = lock(&INTERPRETER_LOCK);
    module
        .call(function, Vec::new())
        .map_err(|source| LoadError::Call { function, source })
}

fn optional_millis(
    module: &mut dyn ScriptModule,
    functions: &ProbedFunctions,
    function: &'static str,
) -> Result<Option<Duration>, LoadError> {
    if !functions.defines(function) {
        return Ok(None);
    }
    let value = call_on_load(module, function)?;
    let millis = value
        .as_int()
        .and_then(|&millis| u64::try_from(millis).ok())
        .ok_or_else(|| LoadError::Call {
            function,
            source: ScriptCallError::unexpected("non-negative integer", &value),
        })?;
    Ok(Some(Duration::from_millis(millis)))
}

fn inspect_module(module: &mut dyn ScriptModule) -> Result<ModuleInfo, LoadError> {
    let functions = probe_functions(module);
    if !functions.defines(functions::NAME) {
        return Err(LoadError::MissingFunction(functions::NAME));
    }
    let name = call_on_load(module, functions::NAME)?
        .into_str()
        .map_err(|value| LoadError::Call {
            function: functions::NAME,
            source: ScriptCallError::unexpected("string", &value),
        })?;
    let timeout = optional_millis(module, &functions, functions::TRANSFER_TIMEOUT_MILLISECONDS)?;
    let message_delay = optional_millis(module, &functions, functions::GENERAL_MESSAGE_DELAY)?;
    Ok(ModuleInfo {
        name,
        functions,
        timeout,
        message_delay,
    })
}

/// A device that is implemented by a script module
pub struct Adaptation {
    path: PathBuf,
    module: Mutex<Box<dyn ScriptModule>>,
    info: RwLock<ModuleInfo>,
    channel: AtomicU8,
    name_cache: HashCache,
    fingerprint_cache: HashCache,
    reporter: ScriptErrorReporter,
}

impl std::fmt::Debug for Adaptation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adaptation")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl Adaptation {
    /// Load a module and probe its capabilities.
    pub fn load(
        loader: &dyn ScriptLoader,
        path: impl Into<PathBuf>,
        reporter: ScriptErrorReporter,
    ) -> Result<Self, LoadError> {
        let path = path.into();
        let mut module = loader.load(&path)?;
        let info = inspect_module(module.as_mut())?;
        log::info!(
            "Loaded adaptation {name} from {path}: {capabilities:?}",
            name = info.name,
            path = path.display(),
            capabilities = info.functions.capabilities,
        );
        Ok(Self {
            path,
            module: Mutex::new(module),
            info: RwLock::new(info),
            channel: AtomicU8::new(MidiChannel::default().index()),
            name_cache: HashCache::default(),
            fingerprint_cache: HashCache::default(),
            reporter,
        })
    }

    /// Load the module again from the same path.
    ///
    /// Capabilities are probed again and the caches are cleared. The
    /// current module remains active if loading fails.
    pub fn reload(&self, loader: &dyn ScriptLoader) -> Result<(), LoadError> {
        let mut module = loader.load(&self.path)?;
        let info = inspect_module(module.as_mut())?;
        log::info!(
            "Reloaded adaptation {name} from {path}: {capabilities:?}",
            name = info.name,
            path = self.path.display(),
            capabilities = info.functions.capabilities,
        );
        {
            let _interpreter = lock(&INTERPRETER_LOCK);
            *lock(&self.module) = module;
            *self.info.write().unwrap_or_else(PoisonError::into_inner) = info;
        }
        self.name_cache.clear();
        self.fingerprint_cache.clear();
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn channel(&self) -> MidiChannel {
        MidiChannel::new(self.channel.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_channel(&self, channel: MidiChannel) {
        self.channel.store(channel.index(), Ordering::Relaxed);
    }

    /// Delay between consecutive messages that the device needs
    #[must_use]
    pub fn message_delay(&self) -> Option<Duration> {
        self.read_info(|info| info.message_delay)
    }

    #[must_use]
    pub fn probed_functions(&self) -> ProbedFunctions {
        self.read_info(|info| info.functions.clone())
    }

    fn read_info<T>(&self, read: impl FnOnce(&ModuleInfo) -> T) -> T {
        read(&self.info.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn defines(&self, function: &str) -> bool {
        self.read_info(|info| info.functions.defines(function))
    }

    fn has(&self, capability: Capability) -> bool {
        self.read_info(|info| info.functions.capabilities.contains(capability))
    }

    fn channel_arg(&self) -> ScriptValue {
        self.channel().index().into()
    }

    fn call(&self, function: &str, args: Vec<ScriptValue>) -> Result<ScriptValue, ScriptCallError> {
        let _interpreter = lock(&INTERPRETER_LOCK);
        lock(&self.module).call(function, args)
    }

    /// Invoke a function and convert the result.
    ///
    /// Failures are reported after all locks have been released.
    fn invoke<T>(
        &self,
        function: &'static str,
        args: Vec<ScriptValue>,
        convert: impl FnOnce(ScriptValue) -> Result<T, ScriptCallError>,
    ) -> Option<T> {
        match self.call(function, args).and_then(convert) {
            Ok(value) => Some(value),
            Err(err) => {
                self.reporter.report(ScriptErrorReport {
                    module: self.read_info(|info| info.name.clone()),
                    function: function.to_owned(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    fn invoke_bool(&self, function: &'static str, args: Vec<ScriptValue>) -> bool {
        self.invoke(function, args, |value| Ok(value.is_truthy()))
            .unwrap_or(false)
    }

    fn invoke_int(&self, function: &'static str, args: Vec<ScriptValue>) -> Option<i64> {
        self.invoke(function, args, |value| {
            value
                .into_int()
                .map_err(|value| ScriptCallError::unexpected("integer", &value))
        })
    }

    fn invoke_string(&self, function: &'static str, args: Vec<ScriptValue>) -> Option<String> {
        self.invoke(function, args, |value| {
            value
                .into_str()
                .map_err(|value| ScriptCallError::unexpected("string", &value))
        })
    }

    fn invoke_bytes(&self, function: &'static str, args: Vec<ScriptValue>) -> Option<Vec<u8>> {
        self.invoke(function, args, |value| value.to_bytes())
    }

    fn invoke_midi(&self, function: &'static str, args: Vec<ScriptValue>) -> Vec<MidiMessage> {
        self.invoke_bytes(function, args)
            .map(|bytes| parse_midi_messages(&bytes))
            .unwrap_or_default()
    }

    fn invoke_sysex(&self, function: &'static str, args: Vec<ScriptValue>) -> Vec<SysexMessage> {
        self.invoke_bytes(function, args)
            .map(|bytes| split_sysex(&bytes))
            .unwrap_or_default()
    }

    fn patches_from_bank_messages(&self, messages: &[SysexMessage]) -> Vec<Patch> {
        let extraction = self.read_info(|info| info.functions.bank_extraction);
        match extraction {
            Some(BankExtraction::AllMessages) => self
                .invoke(
                    functions::EXTRACT_PATCHES_FROM_ALL_BANK_MESSAGES,
                    vec![ScriptValue::from_message_list(messages)],
                    patches_from_value,
                )
                .unwrap_or_default(),
            Some(BankExtraction::PerMessage) => messages
                .iter()
                .filter_map(|message| {
                    self.invoke(
                        functions::EXTRACT_PATCHES_FROM_BANK,
                        vec![ScriptValue::from_bytes(message.as_bytes())],
                        patches_from_value,
                    )
                })
                .flatten()
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Patches from either a list of byte lists or a flat list of bytes
/// that contains one patch per sysex message.
fn patches_from_value(value: ScriptValue) -> Result<Vec<Patch>, ScriptCallError> {
    let is_list_of_lists = value
        .as_list()
        .and_then(|values| values.first())
        .is_some_and(|first| first.is_list() || first.is_tuple());
    if is_list_of_lists {
        return value
            .as_list()
            .into_iter()
            .flatten()
            .map(|patch| patch.to_bytes().map(|bytes| Patch::new(bytes.into())))
            .collect();
    }
    let bytes = value.to_bytes()?;
    Ok(split_sysex(&bytes)
        .into_iter()
        .map(|message| Patch::new(message.into_bytes().into()))
        .collect())
}

fn bank_descriptors_from_value(value: ScriptValue) -> Result<Vec<BankDescriptor>, ScriptCallError> {
    let descriptors = value
        .into_list()
        .map_err(|value| ScriptCallError::unexpected("list of bank descriptors", &value))?;
    descriptors
        .iter()
        .map(|descriptor| {
            let int = |key| {
                descriptor
                    .get(key)
                    .and_then(ScriptValue::as_int)
                    .and_then(|&value| u32::try_from(value).ok())
                    .ok_or_else(|| ScriptCallError::unexpected("bank descriptor", descriptor))
            };
            let string = |key| descriptor.get(key).and_then(ScriptValue::as_str).cloned();
            Ok(BankDescriptor {
                bank: BankNumber::new(int("bank")?),
                size: int("size")?,
                name: string("name")
                    .ok_or_else(|| ScriptCallError::unexpected("bank descriptor", descriptor))?,
                is_rom: descriptor
                    .get("isROM")
                    .is_some_and(ScriptValue::is_truthy),
                kind: string("type").unwrap_or_else(|| "Patch".to_owned()),
            })
        })
        .collect()
}

impl Device for Adaptation {
    fn name(&self) -> Cow<'_, str> {
        self.read_info(|info| info.name.clone()).into()
    }

    fn default_timeout(&self) -> Duration {
        self.read_info(|info| info.timeout)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    fn patch_name(&self, patch: &Patch) -> Option<String> {
        if !self.defines(functions::NAME_FROM_DUMP) {
            return None;
        }
        self.name_cache
            .get_or_try_insert_with(patch.data().content_hash(), || {
                self.invoke_string(
                    functions::NAME_FROM_DUMP,
                    vec![ScriptValue::from_bytes(patch.data())],
                )
            })
    }

    fn fingerprint(&self, patch: &Patch) -> String {
        let hash = patch.data().content_hash();
        if !self.defines(functions::CALCULATE_FINGERPRINT) {
            return hash.to_hex();
        }
        self.fingerprint_cache
            .get_or_try_insert_with(hash, || {
                self.invoke_string(
                    functions::CALCULATE_FINGERPRINT,
                    vec![ScriptValue::from_bytes(patch.data())],
                )
            })
            .unwrap_or_else(|| hash.to_hex())
    }

    fn renamed_patch(&self, patch: &Patch, name: &str) -> Option<Patch> {
        if !self.defines(functions::RENAME_PATCH) {
            return None;
        }
        let bytes = self.invoke_bytes(
            functions::RENAME_PATCH,
            vec![ScriptValue::from_bytes(patch.data()), name.into()],
        )?;
        let mut renamed = patch.clone();
        renamed.replace_data(bytes.into());
        Some(renamed)
    }

    fn is_default_name(&self, name: &str) -> bool {
        self.defines(functions::IS_DEFAULT_NAME)
            && self.invoke_bool(functions::IS_DEFAULT_NAME, vec![name.into()])
    }

    fn detection(&self) -> Option<&dyn DeviceDetection> {
        if self.read_info(|info| info.functions.detection) {
            Some(self)
        } else {
            None
        }
    }

    fn edit_buffer(&self) -> Option<&dyn EditBufferCapability> {
        if self.has(Capability::EditBuffer) {
            Some(self)
        } else {
            None
        }
    }

    fn program_dump(&self) -> Option<&dyn ProgramDumpCapability> {
        if self.has(Capability::ProgramDump) {
            Some(self)
        } else {
            None
        }
    }

    fn bank_dump(&self) -> Option<&dyn BankDumpCapability> {
        if self.has(Capability::BankDump) {
            Some(self)
        } else {
            None
        }
    }

    fn has_banks(&self) -> Option<&dyn HasBanksCapability> {
        if self.has(Capability::HasBanks) {
            Some(self)
        } else {
            None
        }
    }

    fn has_bank_descriptors(&self) -> Option<&dyn HasBankDescriptorsCapability> {
        if self.has(Capability::HasBankDescriptors) {
            Some(self)
        } else {
            None
        }
    }

    fn global_settings(&self) -> Option<&dyn GlobalSettingsCapability> {
        if self.has(Capability::GlobalSettings) {
            Some(self)
        } else {
            None
        }
    }

    fn custom_program_change(&self) -> Option<&dyn CustomProgramChangeCapability> {
        if self.has(Capability::CustomProgramChange) {
            Some(self)
        } else {
            None
        }
    }
}

impl DeviceDetection for Adaptation {
    fn device_detect_messages(&self, channel: MidiChannel) -> Vec<MidiMessage> {
        self.invoke_midi(
            functions::CREATE_DEVICE_DETECT_MESSAGE,
            vec![channel.index().into()],
        )
    }

    fn channel_if_valid_device_response(&self, message: &SysexMessage) -> Option<MidiChannel> {
        let channel = self.invoke_int(
            functions::CHANNEL_IF_VALID_DEVICE_RESPONSE,
            vec![ScriptValue::from_bytes(message.as_bytes())],
        )?;
        // Negative values signal an invalid response
        u8::try_from(channel).ok().and_then(MidiChannel::new)
    }

    fn needs_channel_specific_detection(&self) -> bool {
        self.defines(functions::NEEDS_CHANNEL_SPECIFIC_DETECTION)
            && self.invoke_bool(functions::NEEDS_CHANNEL_SPECIFIC_DETECTION, Vec::new())
    }
}

impl EditBufferCapability for Adaptation {
    fn request_edit_buffer_dump(&self) -> Vec<MidiMessage> {
        self.invoke_midi(functions::CREATE_EDIT_BUFFER_REQUEST, vec![self.channel_arg()])
    }

    fn is_edit_buffer_dump(&self, messages: &[SysexMessage]) -> bool {
        self.invoke_bool(
            functions::IS_EDIT_BUFFER_DUMP,
            vec![ScriptValue::from_messages(messages)],
        )
    }

    fn is_part_of_edit_buffer_dump(&self, message: &SysexMessage) -> bool {
        let function = if self.defines(functions::IS_PART_OF_EDIT_BUFFER_DUMP) {
            functions::IS_PART_OF_EDIT_BUFFER_DUMP
        } else {
            functions::IS_EDIT_BUFFER_DUMP
        };
        self.invoke_bool(function, vec![ScriptValue::from_bytes(message.as_bytes())])
    }

    fn patch_from_edit_buffer(&self, messages: &[SysexMessage]) -> Option<Patch> {
        if !self.is_edit_buffer_dump(messages) {
            return None;
        }
        Some(Patch::new(flatten_sysex(messages).into()))
    }

    fn patch_to_edit_buffer(&self, patch: &Patch) -> Vec<SysexMessage> {
        if !self.defines(functions::CONVERT_TO_EDIT_BUFFER) {
            return split_sysex(patch.data());
        }
        self.invoke_sysex(
            functions::CONVERT_TO_EDIT_BUFFER,
            vec![self.channel_arg(), ScriptValue::from_bytes(patch.data())],
        )
    }
}

impl ProgramDumpCapability for Adaptation {
    fn request_program_dump(&self, program: ProgramNumber) -> Vec<MidiMessage> {
        self.invoke_midi(
            functions::CREATE_PROGRAM_DUMP_REQUEST,
            vec![self.channel_arg(), program.value().into()],
        )
    }

    fn is_single_program_dump(&self, messages: &[SysexMessage]) -> bool {
        self.invoke_bool(
            functions::IS_SINGLE_PROGRAM_DUMP,
            vec![ScriptValue::from_messages(messages)],
        )
    }

    fn is_part_of_single_program_dump(&self, message: &SysexMessage) -> bool {
        let function = if self.defines(functions::IS_PART_OF_SINGLE_PROGRAM_DUMP) {
            functions::IS_PART_OF_SINGLE_PROGRAM_DUMP
        } else {
            functions::IS_SINGLE_PROGRAM_DUMP
        };
        self.invoke_bool(function, vec![ScriptValue::from_bytes(message.as_bytes())])
    }

    fn program_number_of(&self, messages: &[SysexMessage]) -> Option<ProgramNumber> {
        if !self.defines(functions::NUMBER_FROM_DUMP) {
            return None;
        }
        let number = self.invoke_int(
            functions::NUMBER_FROM_DUMP,
            vec![ScriptValue::from_messages(messages)],
        )?;
        u32::try_from(number).ok().map(ProgramNumber::new)
    }

    fn patch_from_program_dump(&self, messages: &[SysexMessage]) -> Option<Patch> {
        if !self.is_single_program_dump(messages) {
            return None;
        }
        let data = PatchData::from(flatten_sysex(messages));
        let patch = match self.program_number_of(messages) {
            Some(program) => Patch::with_program(data, program),
            None => Patch::new(data),
        };
        Some(patch)
    }

    fn patch_to_program_dump(&self, patch: &Patch, program: ProgramNumber) -> Vec<SysexMessage> {
        if !self.defines(functions::CONVERT_TO_PROGRAM_DUMP) {
            return split_sysex(patch.data());
        }
        self.invoke_sysex(
            functions::CONVERT_TO_PROGRAM_DUMP,
            vec![
                self.channel_arg(),
                ScriptValue::from_bytes(patch.data()),
                program.value().into(),
            ],
        )
    }
}

impl BankDumpCapability for Adaptation {
    fn request_bank_dump(&self, bank: BankNumber) -> Vec<MidiMessage> {
        self.invoke_midi(
            functions::CREATE_BANK_DUMP_REQUEST,
            vec![self.channel_arg(), bank.value().into()],
        )
    }

    fn is_bank_dump(&self, message: &SysexMessage) -> bool {
        self.invoke_bool(
            functions::IS_PART_OF_BANK_DUMP,
            vec![ScriptValue::from_bytes(message.as_bytes())],
        )
    }

    fn is_bank_dump_finished(&self, messages: &[SysexMessage]) -> bool {
        self.invoke_bool(
            functions::IS_BANK_DUMP_FINISHED,
            vec![ScriptValue::from_message_list(messages)],
        )
    }

    fn patches_from_bank(&self, messages: &[SysexMessage]) -> Vec<Patch> {
        self.patches_from_bank_messages(messages)
    }
}

impl HasBanksCapability for Adaptation {
    fn number_of_banks(&self) -> u32 {
        self.invoke_int(functions::NUMBER_OF_BANKS, Vec::new())
            .and_then(|count| u32::try_from(count).ok())
            .unwrap_or(0)
    }

    fn number_of_patches(&self, _bank: BankNumber) -> u32 {
        self.invoke_int(functions::NUMBER_OF_PATCHES_PER_BANK, Vec::new())
            .and_then(|count| u32::try_from(count).ok())
            .unwrap_or(0)
    }

    fn friendly_bank_name(&self, bank: BankNumber) -> String {
        if self.defines(functions::FRIENDLY_BANK_NAME) {
            if let Some(name) =
                self.invoke_string(functions::FRIENDLY_BANK_NAME, vec![bank.value().into()])
            {
                return name;
            }
        }
        format!("Bank {bank}", bank = bank.value() + 1)
    }
}

impl HasBankDescriptorsCapability for Adaptation {
    fn bank_descriptors(&self) -> Vec<BankDescriptor> {
        self.invoke(
            functions::BANK_DESCRIPTORS,
            Vec::new(),
            bank_descriptors_from_value,
        )
        .unwrap_or_default()
    }
}

impl CustomProgramChangeCapability for Adaptation {
    fn goto_program(&self, program: ProgramNumber) -> Vec<MidiMessage> {
        self.invoke_midi(
            functions::CREATE_CUSTOM_PROGRAM_CHANGE,
            vec![self.channel_arg(), program.value().into()],
        )
    }
}

impl GlobalSettingsCapability for Adaptation {
    fn request_global_settings(&self) -> Vec<MidiMessage> {
        self.invoke_midi(
            functions::CREATE_GLOBAL_SETTINGS_REQUEST,
            vec![self.channel_arg()],
        )
    }

    fn is_global_settings_dump(&self, message: &SysexMessage) -> bool {
        self.invoke_bool(
            functions::IS_PART_OF_GLOBAL_SETTINGS,
            vec![ScriptValue::from_bytes(message.as_bytes())],
        )
    }

    fn is_global_settings_finished(&self, messages: &[SysexMessage]) -> bool {
        self.invoke_bool(
            functions::IS_GLOBAL_SETTINGS_FINISHED,
            vec![ScriptValue::from_message_list(messages)],
        )
    }

    fn settings_from_dump(&self, messages: &[SysexMessage]) -> Option<PatchData> {
        if !self.is_global_settings_finished(messages) {
            return None;
        }
        Some(flatten_sysex(messages).into())
    }

    fn settings_to_messages(&self, settings: &PatchData) -> Vec<SysexMessage> {
        split_sysex(settings)
    }
}
