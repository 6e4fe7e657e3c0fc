//! Decoder Locator.
//!
//! Finds the auto-generated decoder type by its shape — a static byte-sequence field
//! whose initial bytes exceed [`PipelineConfig::payload_size_threshold`], on a type
//! that declares at least one method — rather than by name, since obfuscators rename
//! the type and its members freely.

use deobfstr_config::PipelineConfig;

use crate::model::{FieldHandle, Module, Opcode, Operand, SemanticType, TypeRef};

/// The result of locating the decoder: its identity and the raw (still-encrypted)
/// payload bytes, resolved through any data-token indirection.
#[derive(Debug, Clone)]
pub struct DecoderLocation {
    pub decoder_type: String,
    pub payload_field: String,
    pub table_field: Option<String>,
    pub raw_payload: Vec<u8>,
}

/// Scans every type in `module` in enumeration order and returns the first one whose
/// shape matches a decoder. Returns `None` if no type matches (the "no-decoder-found"
/// outcome, which is not an error).
pub fn locate(module: &Module, config: &PipelineConfig) -> Option<DecoderLocation> {
    for ty in module.enumerate_types() {
        if ty.methods.is_empty() {
            continue;
        }
        for field in &ty.fields {
            if !field.is_static || field.semantic_type != SemanticType::ByteSequence {
                continue;
            }
            let Some(bytes) = resolve_static_byte_field(module, ty, field.name.as_str()) else {
                continue;
            };
            if bytes.len() > config.payload_size_threshold {
                let table_field = find_table_field(ty);
                return Some(DecoderLocation {
                    decoder_type: ty.full_name.clone(),
                    payload_field: field.name.clone(),
                    table_field,
                    raw_payload: bytes,
                });
            }
        }
    }
    None
}

fn find_table_field(ty: &TypeRef) -> Option<String> {
    ty.fields
        .iter()
        .find(|f| matches!(f.semantic_type, SemanticType::TextSequence | SemanticType::TextSequenceArray))
        .map(|f| f.name.clone())
}

/// Recovers the initial bytes of a candidate static byte-sequence field.
///
/// Some metadata formats store the bytes directly on the field. Others only record
/// them on a backing data blob referenced from the type's static initializer via
/// `load-token <data_field>; …; store-static <candidate_field>`; in that case this
/// walks the `.cctor` body to find the pattern and reaches through to the data field.
fn resolve_static_byte_field(module: &Module, ty: &TypeRef, field_name: &str) -> Option<Vec<u8>> {
    let field = ty.fields.iter().find(|f| f.name == field_name)?;
    if let Some(bytes) = &field.initial_bytes {
        return Some(bytes.clone());
    }

    let cctor = ty.methods.iter().find(|m| m.name == ".cctor")?;
    let body = cctor.body.as_ref()?;

    let mut pending_token: Option<&FieldHandle> = None;
    for insn in &body.instructions {
        match (insn.opcode, &insn.operand) {
            (Opcode::LoadFieldToken, Operand::Field(handle)) => pending_token = Some(handle),
            (Opcode::StoreStatic, Operand::Field(handle))
                if handle.field_name == field_name && handle.declaring_type == ty.full_name =>
            {
                let token = pending_token?;
                let data_type = module.find_type(&token.declaring_type)?;
                let data_field = data_type.fields.iter().find(|f| f.name == token.field_name)?;
                return data_field.initial_bytes.clone();
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldRef, Instruction, InstructionStream, MethodRef, ReturnType};

    fn payload_of_len(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn locates_decoder_with_directly_embedded_payload() {
        let mut ty = TypeRef::new("Obfuscated.Decoder");
        ty.fields.push(
            FieldRef::new("_data", true, SemanticType::ByteSequence)
                .with_initial_bytes(payload_of_len(60_000)),
        );
        ty.methods.push(MethodRef::new("A", 0, ReturnType::TextSequence));
        let module = Module::new(vec![ty]);

        let config = PipelineConfig::default();
        let location = locate(&module, &config).expect("decoder found");
        assert_eq!(location.decoder_type, "Obfuscated.Decoder");
        assert_eq!(location.payload_field, "_data");
        assert_eq!(location.raw_payload.len(), 60_000);
        assert!(location.table_field.is_none());
    }

    #[test]
    fn follows_token_indirection_through_a_data_blob_type() {
        let mut blob_holder = TypeRef::new("<PrivateImplementationDetails>");
        blob_holder.fields.push(
            FieldRef::new("$$field-0", true, SemanticType::Other)
                .with_initial_bytes(payload_of_len(51_000)),
        );

        let mut decoder = TypeRef::new("Obfuscated.Decoder");
        decoder
            .fields
            .push(FieldRef::new("_data", true, SemanticType::ByteSequence));
        decoder.methods.push(MethodRef::new("A", 0, ReturnType::TextSequence));
        decoder.methods.push(
            MethodRef::new(".cctor", 0, ReturnType::Other).with_body(InstructionStream::new(vec![
                Instruction::load_field_token("<PrivateImplementationDetails>", "$$field-0"),
                Instruction::store_static("Obfuscated.Decoder", "_data"),
                Instruction::ret(),
            ])),
        );

        let module = Module::new(vec![blob_holder, decoder]);
        let config = PipelineConfig::default();
        let location = locate(&module, &config).expect("decoder found via indirection");
        assert_eq!(location.decoder_type, "Obfuscated.Decoder");
        assert_eq!(location.raw_payload.len(), 51_000);
    }

    #[test]
    fn type_below_threshold_is_rejected() {
        let mut ty = TypeRef::new("NotADecoder");
        ty.fields.push(
            FieldRef::new("_small", true, SemanticType::ByteSequence)
                .with_initial_bytes(payload_of_len(10)),
        );
        ty.methods.push(MethodRef::new("M", 0, ReturnType::Other));
        let module = Module::new(vec![ty]);

        assert!(locate(&module, &PipelineConfig::default()).is_none());
    }

    #[test]
    fn type_with_no_methods_is_rejected_even_if_payload_is_big_enough() {
        let mut ty = TypeRef::new("DataOnly");
        ty.fields.push(
            FieldRef::new("_data", true, SemanticType::ByteSequence)
                .with_initial_bytes(payload_of_len(60_000)),
        );
        let module = Module::new(vec![ty]);

        assert!(locate(&module, &PipelineConfig::default()).is_none());
    }

    #[test]
    fn first_match_in_enumeration_order_wins() {
        let mut first = TypeRef::new("First");
        first.fields.push(
            FieldRef::new("_data", true, SemanticType::ByteSequence)
                .with_initial_bytes(payload_of_len(60_000)),
        );
        first.methods.push(MethodRef::new("A", 0, ReturnType::TextSequence));

        let mut second = TypeRef::new("Second");
        second.fields.push(
            FieldRef::new("_data", true, SemanticType::ByteSequence)
                .with_initial_bytes(payload_of_len(70_000)),
        );
        second.methods.push(MethodRef::new("B", 0, ReturnType::TextSequence));

        let module = Module::new(vec![first, second]);
        let location = locate(&module, &PipelineConfig::default()).expect("decoder found");
        assert_eq!(location.decoder_type, "First");
    }

    #[test]
    fn exactly_at_threshold_is_rejected_since_comparison_is_strict() {
        let mut ty = TypeRef::new("Borderline");
        ty.fields.push(
            FieldRef::new("_data", true, SemanticType::ByteSequence)
                .with_initial_bytes(payload_of_len(50_000)),
        );
        ty.methods.push(MethodRef::new("A", 0, ReturnType::TextSequence));
        let module = Module::new(vec![ty]);
        assert!(locate(&module, &PipelineConfig::default()).is_none());
    }
}
