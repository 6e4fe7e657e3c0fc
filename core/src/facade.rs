//! Module Facade.
//!
//! The only file in this crate that talks to `dotscope`, the ECMA-335 metadata/CIL
//! library this pipeline is built on. `load` and `write` translate between its object
//! graph and this crate's own [`crate::model::Module`]; no analysis or rewriting logic
//! lives here. Keeping the translation isolated here is what lets every other
//! component be tested against hand-built fixtures instead of real PE files.

use std::path::Path;

use dotscope::assembly::{Instruction as CilInstruction, Operand as CilOperand};
use dotscope::metadata::typesystem::{CilField, CilFieldSemantics, CilMethod, CilType};
use dotscope::CilObject;

use crate::error::PipelineError;
use crate::model::{
    FieldHandle, FieldRef, Instruction, InstructionStream, MethodHandle, MethodRef, Module, Opcode, Operand,
    ReturnType, SemanticType, TypeRef,
};

/// Loads `path` and converts dotscope's object graph into this crate's owned model.
pub fn load(path: &Path) -> Result<(CilObject, Module), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }
    let object = CilObject::from_file(path).map_err(|source| PipelineError::LoadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let module = convert_module(&object);
    Ok((object, module))
}

/// Writes the mutated `module` back onto `object`, then serializes to `path`,
/// requesting that `object` preserve every metadata token.
pub fn write(object: &mut CilObject, module: &Module, path: &Path) -> Result<(), PipelineError> {
    apply_mutations(object, module);
    object
        .write_to_file(path, dotscope::WriteOptions::preserve_tokens())
        .map_err(|source| PipelineError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn convert_module(object: &CilObject) -> Module {
    let types = object.types().map(convert_type).collect();
    Module::new(types)
}

fn convert_type(ty: &CilType) -> TypeRef {
    TypeRef {
        full_name: ty.full_name(),
        is_nested: ty.is_nested(),
        fields: ty.fields().map(convert_field).collect(),
        methods: ty.methods().map(convert_method).collect(),
    }
}

fn convert_field(field: &CilField) -> FieldRef {
    let semantic_type = match field.semantics() {
        CilFieldSemantics::ByteArray => SemanticType::ByteSequence,
        CilFieldSemantics::String => SemanticType::TextSequence,
        CilFieldSemantics::StringArray => SemanticType::TextSequenceArray,
        _ => SemanticType::Other,
    };
    FieldRef {
        name: field.name().to_owned(),
        is_static: field.is_static(),
        semantic_type,
        initial_bytes: field.initial_value_bytes(),
    }
}

fn convert_method(method: &CilMethod) -> MethodRef {
    let return_type = if method.return_type_is_string() {
        ReturnType::TextSequence
    } else {
        ReturnType::Other
    };
    let body = method
        .body()
        .map(|body| InstructionStream::new(body.instructions().iter().map(convert_instruction).collect()));
    MethodRef {
        name: method.name().to_owned(),
        param_count: method.param_count(),
        return_type,
        body,
    }
}

fn convert_instruction(insn: &CilInstruction) -> Instruction {
    let opcode = match insn.mnemonic() {
        "nop" => Opcode::Nop,
        "ret" => Opcode::Ret,
        "dup" => Opcode::Dup,
        "pop" => Opcode::Pop,
        "ldc.i4.m1" => Opcode::LdcI4M1,
        "ldc.i4.s" => Opcode::LdcI4S,
        "ldc.i4" => Opcode::LdcI4,
        "call" => Opcode::Call,
        "callvirt" => Opcode::CallVirt,
        "ldstr" => Opcode::LdStr,
        "ldtoken" => Opcode::LoadFieldToken,
        "stsfld" => Opcode::StoreStatic,
        m if m.starts_with("ldc.i4.") => m
            .rsplit('.')
            .next()
            .and_then(|n| n.parse::<u8>().ok())
            .map(Opcode::LdcI4Small)
            .unwrap_or(Opcode::Other(insn.raw_opcode())),
        _ => Opcode::Other(insn.raw_opcode()),
    };
    // `ldc.i4.m1` and the `ldc.i4.0`..`ldc.i4.8` shorthands carry no operand bytes at
    // all; the constant is implicit in the opcode itself, so `insn.operand` is
    // `CilOperand::None` for these and must not be trusted.
    let operand = match opcode {
        Opcode::LdcI4M1 => Operand::Int32(-1),
        Opcode::LdcI4Small(n) => Operand::Int32(i32::from(n)),
        _ => match &insn.operand {
            CilOperand::None => Operand::None,
            CilOperand::Int32(v) => Operand::Int32(*v),
            CilOperand::Method(token) => Operand::Method(MethodHandle {
                declaring_type: token.declaring_type_full_name(),
                method_name: token.name().to_owned(),
            }),
            CilOperand::Field(token) => Operand::Field(FieldHandle {
                declaring_type: token.declaring_type_full_name(),
                field_name: token.name().to_owned(),
            }),
            CilOperand::String(s) => Operand::Text(s.clone()),
            _ => Operand::Other,
        },
    };
    Instruction::new(opcode, operand)
}

/// Applies every mutation recorded on `module` back onto the live `CilObject`.
///
/// Only `opcode`/`operand` differ from what was loaded; since `call`/`callvirt` and
/// `ldstr` are all single-token-operand instructions of identical width, this never
/// changes a method body's byte length.
fn apply_mutations(object: &mut CilObject, module: &Module) {
    for ty in &module.types {
        for method in &ty.methods {
            let Some(body) = &method.body else { continue };
            let Some(mut live_body) = object.method_body_mut(&ty.full_name, &method.name) else {
                continue;
            };
            for (index, insn) in body.instructions.iter().enumerate() {
                if let Operand::Text(text) = &insn.operand {
                    let token = object.user_strings_mut().intern(text);
                    live_body.set_instruction(index, "ldstr", CilOperand::String(text.clone()), Some(token));
                }
            }
        }
    }
}
