// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::*;
use crate::{has_capability, stream::stream_protocol_for, StreamAccumulator, StreamType};

const PATH: &str = "adaptations/test_synth.py";

fn bytes_arg(args: &[ScriptValue], index: usize) -> Vec<u8> {
    args[index].to_bytes().unwrap()
}

/// Edit buffer dumps are `F0 7D 01 <data> F7`.
fn edit_buffer_module() -> NativeModule {
    NativeModule::new()
        .with_constant(functions::NAME, "Test Synth")
        .with_function(functions::CREATE_EDIT_BUFFER_REQUEST, |args| {
            let channel = *args[0].as_int().unwrap();
            Ok(ScriptValue::from_bytes(&[
                0xf0,
                0x7d,
                0x02,
                u8::try_from(channel).unwrap(),
                0xf7,
            ]))
        })
        .with_function(functions::IS_EDIT_BUFFER_DUMP, |args| {
            let bytes = bytes_arg(&args, 0);
            Ok(bytes.starts_with(&[0xf0, 0x7d, 0x01]).into())
        })
        .with_function(functions::NAME_FROM_DUMP, |args| {
            let bytes = bytes_arg(&args, 0);
            Ok(format!("Patch {len}", len = bytes.len()).into())
        })
}

fn loader_with(module: fn() -> NativeModule) -> NativeLoader {
    let mut loader = NativeLoader::new();
    loader.register(PATH, module);
    loader
}

fn load(module: fn() -> NativeModule) -> Adaptation {
    Adaptation::load(&loader_with(module), PATH, ScriptErrorReporter::default()).unwrap()
}

fn sysex(bytes: &[u8]) -> SysexMessage {
    SysexMessage::new(bytes.to_vec()).unwrap()
}

#[test]
fn capabilities_are_probed_from_functions() {
    let adaptation = load(edit_buffer_module);
    assert_eq!("Test Synth", adaptation.name());
    let capabilities = adaptation.capabilities();
    assert!(capabilities.contains(Capability::EditBuffer));
    assert_eq!(1, capabilities.len());
    assert!(adaptation.detection().is_none());
    assert!(has_capability::<dyn EditBufferCapability>(&adaptation).is_some());
    assert!(has_capability::<dyn BankDumpCapability>(&adaptation).is_none());
    // Deterministic
    assert_eq!(capabilities, adaptation.capabilities());
}

#[test]
fn missing_name_fails_to_load() {
    let loader = loader_with(NativeModule::new);
    assert!(matches!(
        Adaptation::load(&loader, PATH, ScriptErrorReporter::default()),
        Err(LoadError::MissingFunction("name"))
    ));
    assert!(matches!(
        Adaptation::load(&loader, "unknown.py", ScriptErrorReporter::default()),
        Err(LoadError::Host(_))
    ));
}

#[test]
fn capabilities_change_only_after_reload() {
    let mut loader = loader_with(edit_buffer_module);
    let adaptation =
        Adaptation::load(&loader, PATH, ScriptErrorReporter::default()).unwrap();
    assert!(!adaptation.supports(Capability::CustomProgramChange));

    loader.register(PATH, || {
        edit_buffer_module().with_function(functions::CREATE_CUSTOM_PROGRAM_CHANGE, |args| {
            let program = *args[1].as_int().unwrap();
            Ok(ScriptValue::from_bytes(&[0xc0, u8::try_from(program).unwrap()]))
        })
    });
    assert!(!adaptation.supports(Capability::CustomProgramChange));

    adaptation.reload(&loader).unwrap();
    assert!(adaptation.supports(Capability::CustomProgramChange));
    assert_eq!(
        vec![MidiMessage::ProgramChange {
            channel: MidiChannel::default(),
            program: 7,
        }],
        adaptation.goto_program(ProgramNumber::new(7))
    );
}

#[test]
fn failed_reload_keeps_module() {
    let mut loader = loader_with(edit_buffer_module);
    let adaptation =
        Adaptation::load(&loader, PATH, ScriptErrorReporter::default()).unwrap();
    loader.register(PATH, NativeModule::new);
    assert!(adaptation.reload(&loader).is_err());
    assert_eq!("Test Synth", adaptation.name());
    assert!(adaptation.supports(Capability::EditBuffer));
}

#[test]
fn edit_buffer_through_script() {
    let adaptation = load(edit_buffer_module);
    adaptation.set_channel(MidiChannel::new(3).unwrap());
    assert_eq!(
        vec![MidiMessage::Sysex(sysex(&[0xf0, 0x7d, 0x02, 0x03, 0xf7]))],
        adaptation.request_edit_buffer_dump()
    );
    let dump = [sysex(&[0xf0, 0x7d, 0x01, 0x10, 0x20, 0xf7])];
    let patch = adaptation.patch_from_edit_buffer(&dump).unwrap();
    assert_eq!(dump[0].as_bytes(), patch.data().as_slice());
    // Without a conversion function the data is sent unmodified
    assert_eq!(dump.to_vec(), adaptation.patch_to_edit_buffer(&patch));
    assert!(adaptation
        .patch_from_edit_buffer(&[sysex(&[0xf0, 0x7d, 0x02, 0xf7])])
        .is_none());
}

#[test]
fn edit_buffer_stream_through_script() {
    let adaptation = load(edit_buffer_module);
    let protocol = stream_protocol_for(&adaptation, StreamType::EditBufferDump).unwrap();
    let mut accumulator = StreamAccumulator::new(&*protocol, StreamType::EditBufferDump);
    accumulator.start().unwrap();
    accumulator
        .handle_message(&sysex(&[0xf0, 0x7d, 0x01, 0x10, 0xf7]))
        .unwrap();
    assert_eq!(1, accumulator.decode().unwrap().len());
}

#[test]
fn patch_names_are_cached() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let adaptation = load(|| {
        edit_buffer_module().with_function(functions::NAME_FROM_DUMP, |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok("Cached".into())
        })
    });
    let patch = Patch::new(vec![0xf0u8, 0x7d, 0x01, 0xf7].into());
    assert_eq!(Some("Cached".to_owned()), adaptation.patch_name(&patch));
    assert_eq!(Some("Cached".to_owned()), adaptation.patch_name(&patch.clone()));
    assert_eq!(1, CALLS.load(Ordering::SeqCst));
    assert_eq!(1, adaptation.name_cache.len());
}

#[test]
fn fingerprint_falls_back_to_content_hash() {
    let adaptation = load(edit_buffer_module);
    let patch = Patch::new(vec![0xf0u8, 0x7d, 0x01, 0xf7].into());
    assert_eq!(
        patch.data().content_hash().to_hex(),
        adaptation.fingerprint(&patch)
    );
    assert!(adaptation.fingerprint_cache.is_empty());
}

#[test]
fn legacy_bank_extraction() {
    fn module() -> NativeModule {
        edit_buffer_module()
            .with_function(functions::CREATE_BANK_DUMP_REQUEST, |args| {
                let bank = *args[1].as_int().unwrap();
                Ok(ScriptValue::from_bytes(&[
                    0xf0,
                    0x7d,
                    0x10,
                    u8::try_from(bank).unwrap(),
                    0xf7,
                ]))
            })
            .with_function(functions::IS_PART_OF_BANK_DUMP, |args| {
                Ok(bytes_arg(&args, 0).starts_with(&[0xf0, 0x7d, 0x11]).into())
            })
            .with_function(functions::IS_BANK_DUMP_FINISHED, |args| {
                Ok((args[0].as_list().unwrap().len() == 3).into())
            })
            // Each bank message contains a single program
            .with_function(functions::EXTRACT_PATCHES_FROM_BANK, |args| {
                let mut bytes = bytes_arg(&args, 0);
                bytes[2] = 0x01;
                Ok(ScriptValue::from_bytes(&bytes))
            })
    }
    let adaptation = load(module);
    assert_eq!(
        Some(BankExtraction::PerMessage),
        adaptation.probed_functions().bank_extraction
    );
    assert!(adaptation.supports(Capability::BankDump));
    let bank = (0..3)
        .map(|i| sysex(&[0xf0, 0x7d, 0x11, i, 0xf7]))
        .collect::<Vec<_>>();
    assert!(!adaptation.is_bank_dump_finished(&bank[..2]));
    assert!(adaptation.is_bank_dump_finished(&bank));
    let patches = adaptation.patches_from_bank(&bank);
    assert_eq!(3, patches.len());
    assert_eq!(&[0xf0, 0x7d, 0x01, 0x02, 0xf7], patches[2].data().as_slice());
}

#[test]
fn bank_extraction_prefers_all_messages() {
    let adaptation = load(|| {
        edit_buffer_module()
            .with_constant(functions::CREATE_BANK_DUMP_REQUEST, ScriptValue::List(vec![]))
            .with_constant(functions::IS_PART_OF_BANK_DUMP, true)
            .with_constant(functions::IS_BANK_DUMP_FINISHED, true)
            .with_function(functions::EXTRACT_PATCHES_FROM_BANK, |_| {
                Err(ScriptCallError::Runtime("legacy".to_owned()))
            })
            .with_function(functions::EXTRACT_PATCHES_FROM_ALL_BANK_MESSAGES, |args| {
                // One patch per message
                Ok(args[0].clone())
            })
    });
    assert_eq!(
        Some(BankExtraction::AllMessages),
        adaptation.probed_functions().bank_extraction
    );
    let bank = [
        sysex(&[0xf0, 0x7d, 0x11, 0x00, 0xf7]),
        sysex(&[0xf0, 0x7d, 0x11, 0x01, 0xf7]),
    ];
    assert_eq!(2, adaptation.patches_from_bank(&bank).len());
}

#[test]
fn bank_dump_requires_extraction() {
    let adaptation = load(|| {
        edit_buffer_module()
            .with_constant(functions::CREATE_BANK_DUMP_REQUEST, ScriptValue::List(vec![]))
            .with_constant(functions::IS_PART_OF_BANK_DUMP, true)
            .with_constant(functions::IS_BANK_DUMP_FINISHED, true)
    });
    assert!(!adaptation.supports(Capability::BankDump));
}

#[test]
fn out_of_range_values_are_reported() {
    let (reporter, mut rx) = ScriptErrorReporter::channel();
    let loader = loader_with(|| {
        edit_buffer_module().with_constant(
            functions::CREATE_EDIT_BUFFER_REQUEST,
            ScriptValue::List(vec![
                ScriptValue::Int(0xf0),
                ScriptValue::Int(256),
                ScriptValue::Int(0xf7),
            ]),
        )
    });
    let adaptation = Adaptation::load(&loader, PATH, reporter).unwrap();
    assert!(adaptation.request_edit_buffer_dump().is_empty());
    let report = rx.try_recv().unwrap();
    assert_eq!("Test Synth", report.module);
    assert_eq!(functions::CREATE_EDIT_BUFFER_REQUEST, report.function);
    assert!(rx.try_recv().is_err());
}

#[test]
fn script_errors_are_reported_and_return_empty_values() {
    let (reporter, mut rx) = ScriptErrorReporter::channel();
    let loader = loader_with(|| {
        edit_buffer_module()
            .with_function(functions::IS_EDIT_BUFFER_DUMP, |_| {
                Err(ScriptCallError::Runtime("IndexError: list index out of range".to_owned()))
            })
            .with_constant(functions::NUMBER_OF_BANKS, "four")
            .with_constant(functions::NUMBER_OF_PATCHES_PER_BANK, 128i64)
    });
    let adaptation = Adaptation::load(&loader, PATH, reporter).unwrap();
    let dump = [sysex(&[0xf0, 0x7d, 0x01, 0xf7])];
    assert!(!adaptation.is_edit_buffer_dump(&dump));
    assert!(adaptation.patch_from_edit_buffer(&dump).is_none());
    assert_eq!(0, adaptation.number_of_banks());
    assert_eq!(128, adaptation.number_of_patches(BankNumber::new(0)));
    assert_eq!("Bank 2", adaptation.friendly_bank_name(BankNumber::new(1)));

    let reports = std::iter::from_fn(|| rx.try_recv().ok()).collect::<Vec<_>>();
    assert_eq!(3, reports.len());
    assert_eq!(
        ScriptErrorReport {
            module: "Test Synth".to_owned(),
            function: functions::IS_EDIT_BUFFER_DUMP.to_owned(),
            message: "IndexError: list index out of range".to_owned(),
        },
        reports[0]
    );
    assert_eq!(functions::NUMBER_OF_BANKS, reports[2].function);
}

#[test]
fn detection_and_bank_descriptors() {
    let adaptation = load(|| {
        edit_buffer_module()
            .with_function(functions::CREATE_DEVICE_DETECT_MESSAGE, |_| {
                Ok(ScriptValue::from_bytes(&[0xf0, 0x7e, 0x7f, 0x06, 0x01, 0xf7]))
            })
            .with_function(functions::CHANNEL_IF_VALID_DEVICE_RESPONSE, |args| {
                let bytes = bytes_arg(&args, 0);
                Ok(if bytes[1] == 0x7e {
                    ScriptValue::Int(bytes[2].into())
                } else {
                    ScriptValue::Int(-1)
                })
            })
            .with_constant(
                functions::BANK_DESCRIPTORS,
                ScriptValue::List(vec![ScriptValue::Map(vec![
                    ("bank".into(), 0i64.into()),
                    ("name".into(), "Factory".into()),
                    ("size".into(), 64i64.into()),
                    ("isROM".into(), true.into()),
                ])]),
            )
    });
    assert!(adaptation.detection().is_some());
    assert!(!adaptation.needs_channel_specific_detection());
    assert_eq!(
        MidiChannel::new(5),
        adaptation.channel_if_valid_device_response(&sysex(&[0xf0, 0x7e, 0x05, 0x06, 0x02, 0xf7]))
    );
    assert_eq!(
        None,
        adaptation.channel_if_valid_device_response(&sysex(&[0xf0, 0x7d, 0x05, 0xf7]))
    );
    assert_eq!(
        vec![BankDescriptor {
            bank: BankNumber::new(0),
            size: 64,
            name: "Factory".to_owned(),
            is_rom: true,
            kind: "Patch".to_owned(),
        }],
        adaptation.bank_descriptors()
    );
}

#[test]
fn timeouts_from_script() {
    let adaptation = load(|| {
        edit_buffer_module()
            .with_constant(functions::TRANSFER_TIMEOUT_MILLISECONDS, 500i64)
            .with_constant(functions::GENERAL_MESSAGE_DELAY, 20i64)
    });
    assert_eq!(Duration::from_millis(500), adaptation.default_timeout());
    assert_eq!(Some(Duration::from_millis(20)), adaptation.message_delay());
    assert_eq!(DEFAULT_TIMEOUT, load(edit_buffer_module).default_timeout());
}

#[test]
fn concurrent_queries() {
    let adaptation = Arc::new(load(edit_buffer_module));
    let threads = (0..4)
        .map(|_| {
            let adaptation = Arc::clone(&adaptation);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    assert!(adaptation.supports(Capability::EditBuffer));
                    assert!(adaptation.is_edit_buffer_dump(&[sysex(&[0xf0, 0x7d, 0x01, 0xf7])]));
                }
            })
        })
        .collect::<Vec<_>>();
    for thread in threads {
        thread.join().unwrap();
    }
}

#[tokio::test]
async fn script_error_log_task_drains_reports() {
    let (reporter, rx) = ScriptErrorReporter::channel();
    let task = spawn_script_error_log_task(rx);
    reporter.report(ScriptErrorReport {
        module: "Test Synth".to_owned(),
        function: functions::NAME_FROM_DUMP.to_owned(),
        message: "boom".to_owned(),
    });
    drop(reporter);
    task.await.unwrap();
}
