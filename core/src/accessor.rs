//! Accessor Analyzer.
//!
//! Builds the accessor-name → literal mapping either by reading each accessor
//! method's own instruction stream (the common case) or, when the decoder carries a
//! lookup-table field, by parsing that table directly. The two paths are mutually
//! exclusive per decoder: the locator only looks for a table field at all once a decoder has
//! already been located, and when one is present it is authoritative.

use std::collections::HashMap;

use deobfstr_config::{AccessorOutcome, PipelineConfig, Report};

use crate::model::{InstructionStream, MethodRef, ReturnType, TypeRef};

pub type AccessorMap = HashMap<String, String>;

/// Why `recover_text`/`decode_slice` did not produce a string for one candidate.
enum RecoverError {
    PatternMismatch,
    OutOfBounds,
    InvalidUtf8,
}

impl From<RecoverError> for AccessorOutcome {
    fn from(error: RecoverError) -> Self {
        match error {
            RecoverError::PatternMismatch => AccessorOutcome::PatternMismatch,
            RecoverError::OutOfBounds => AccessorOutcome::OutOfBounds,
            RecoverError::InvalidUtf8 => AccessorOutcome::InvalidUtf8,
        }
    }
}

/// Builds the `AccessorMap` for a located decoder type.
///
/// `table_field` is `Some` when the Decoder Locator found an auxiliary text-sequence
/// field, in which case the lookup-table path is taken instead of
/// per-method instruction analysis.
pub fn analyze(
    decoder_type: &TypeRef,
    table_field: Option<&str>,
    payload: &[u8],
    config: &PipelineConfig,
    report: &mut Report,
) -> AccessorMap {
    if let Some(table_field_name) = table_field {
        return analyze_lookup_table(decoder_type, table_field_name, payload, config, report);
    }
    analyze_instruction_streams(decoder_type, payload, report)
}

fn analyze_instruction_streams(decoder_type: &TypeRef, payload: &[u8], report: &mut Report) -> AccessorMap {
    let mut map = AccessorMap::new();
    for method in &decoder_type.methods {
        if !is_accessor_candidate(method) {
            report.accessor_outcomes.push(AccessorOutcome::NotAnAccessor);
            continue;
        }
        report.accessors_total += 1;

        let Some(body) = method.body.as_ref() else {
            report.accessors_skipped += 1;
            report.accessor_outcomes.push(AccessorOutcome::PatternMismatch);
            continue;
        };

        match recover_text(body, payload) {
            Ok(text) => {
                map.insert(method.name.clone(), text);
                report.accessors_recovered += 1;
                report.accessor_outcomes.push(AccessorOutcome::Recovered);
            }
            Err(error) => {
                report.accessors_skipped += 1;
                report.accessor_outcomes.push(error.into());
            }
        }
    }
    map
}

fn is_accessor_candidate(method: &MethodRef) -> bool {
    !method.is_constructor() && method.param_count == 0 && method.return_type == ReturnType::TextSequence
}

/// Recovers `(offset, length)` from the three integer-constant loads immediately
/// preceding the first `call`/`virtual-call` instruction, then slices and decodes.
fn recover_text(body: &InstructionStream, payload: &[u8]) -> Result<String, RecoverError> {
    let call_index = body
        .instructions
        .iter()
        .position(|insn| insn.opcode.is_call())
        .ok_or(RecoverError::PatternMismatch)?;
    if call_index < 3 {
        return Err(RecoverError::PatternMismatch);
    }

    let window = &body.instructions[call_index - 3..call_index];
    let mut constants = window.iter().map(|insn| insn.as_int32_constant());
    let _index = constants.next().flatten().ok_or(RecoverError::PatternMismatch)?;
    let offset = constants.next().flatten().ok_or(RecoverError::PatternMismatch)?;
    let length = constants.next().flatten().ok_or(RecoverError::PatternMismatch)?;

    decode_slice(payload, offset, length)
}

fn decode_slice(payload: &[u8], offset: i32, length: i32) -> Result<String, RecoverError> {
    if offset < 0 || length < 0 {
        return Err(RecoverError::OutOfBounds);
    }
    let (offset, length) = (offset as usize, length as usize);
    let end = offset.checked_add(length).ok_or(RecoverError::OutOfBounds)?;
    if end > payload.len() {
        return Err(RecoverError::OutOfBounds);
    }
    std::str::from_utf8(&payload[offset..end])
        .map(str::to_owned)
        .map_err(|_| RecoverError::InvalidUtf8)
}

fn analyze_lookup_table(
    decoder_type: &TypeRef,
    table_field_name: &str,
    payload: &[u8],
    config: &PipelineConfig,
    report: &mut Report,
) -> AccessorMap {
    let mut map = AccessorMap::new();
    let Some(field) = decoder_type.fields.iter().find(|f| f.name == table_field_name) else {
        return map;
    };
    let Some(bytes) = field.initial_bytes.as_ref() else {
        return map;
    };
    let Ok(text) = std::str::from_utf8(bytes) else {
        return map;
    };

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            report.table_records_malformed += 1;
            continue;
        }
        if fields[0] == config.lookup_table_header_sentinel {
            continue;
        }
        let (Ok(offset), Ok(length)) = (fields[3].parse::<i32>(), fields[4].parse::<i32>()) else {
            report.table_records_malformed += 1;
            report.accessor_outcomes.push(AccessorOutcome::PatternMismatch);
            continue;
        };
        match decode_slice(payload, offset, length) {
            Ok(text) => {
                map.insert(format!("{}{}", config.lookup_table_key_prefix, fields[0]), text);
                report.accessor_outcomes.push(AccessorOutcome::Recovered);
            }
            Err(error) => {
                report.table_records_malformed += 1;
                report.accessor_outcomes.push(error.into());
            }
        }
    }
    map
}
