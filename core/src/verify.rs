//! Verifier.
//!
//! Re-walks every non-decoder-type method body after rewriting and counts residual
//! `call`/`virtual-call` instructions that still target the decoder type. A nonzero
//! count means the Accessor Analyzer could not recover every accessor; this is always
//! a warning, never a fatal condition.

use crate::model::{Module, Operand};

pub fn count_residual_calls(module: &Module, decoder_type: &str) -> usize {
    let mut residual = 0;
    for ty in module.enumerate_types() {
        if ty.full_name == decoder_type {
            continue;
        }
        for method in &ty.methods {
            let Some(body) = method.body.as_ref() else {
                continue;
            };
            for insn in &body.instructions {
                if !insn.opcode.is_call() {
                    continue;
                }
                if let Operand::Method(handle) = &insn.operand {
                    if handle.declaring_type == decoder_type {
                        residual += 1;
                    }
                }
            }
        }
    }
    residual
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instruction, InstructionStream, MethodRef, Opcode, Operand as Op, ReturnType, TypeRef};

    #[test]
    fn counts_only_calls_targeting_the_decoder_type() {
        let mut caller = TypeRef::new("App.Program");
        caller.methods.push(
            MethodRef::new("Main", 0, ReturnType::Other).with_body(InstructionStream::new(vec![
                Instruction::call("Obfuscated.Decoder", "B"),
                Instruction::call("Other.Type", "C"),
            ])),
        );
        let module = Module::new(vec![caller]);
        assert_eq!(count_residual_calls(&module, "Obfuscated.Decoder"), 1);
    }

    #[test]
    fn zero_after_full_rewrite() {
        let mut caller = TypeRef::new("App.Program");
        caller.methods.push(
            MethodRef::new("Main", 0, ReturnType::Other).with_body(InstructionStream::new(vec![
                Instruction::new(Opcode::LdStr, Op::Text("alpha".to_owned())),
            ])),
        );
        let module = Module::new(vec![caller]);
        assert_eq!(count_residual_calls(&module, "Obfuscated.Decoder"), 0);
    }

    #[test]
    fn ignores_calls_within_the_decoder_type_itself() {
        let mut decoder = TypeRef::new("Obfuscated.Decoder");
        decoder.methods.push(
            MethodRef::new("Helper", 0, ReturnType::Other).with_body(InstructionStream::new(vec![
                Instruction::call("Obfuscated.Decoder", "A"),
            ])),
        );
        let module = Module::new(vec![decoder]);
        assert_eq!(count_residual_calls(&module, "Obfuscated.Decoder"), 0);
    }
}
