//! Call-site Rewriter.
//!
//! Walks every method body outside the decoder type and replaces each `call`/
//! `virtual-call` instruction that targets a recovered accessor with a literal-text
//! load carrying the decoded string. Mutation is strictly in place: no instruction is
//! ever inserted, removed, or reordered, so instruction counts and branch offsets are
//! preserved by construction.

use deobfstr_config::Report;

use crate::accessor::AccessorMap;
use crate::model::{Module, Opcode, Operand};

/// Mutates every qualifying call site in `module` and updates `report`'s
/// `calls_replaced`/`methods_patched` counters. The decoder type itself is never
/// touched.
pub fn rewrite(module: &mut Module, decoder_type: &str, accessors: &AccessorMap, report: &mut Report) {
    for ty in module.types.iter_mut() {
        if ty.full_name == decoder_type {
            continue;
        }
        for method in ty.methods.iter_mut() {
            let Some(body) = method.body.as_mut() else {
                continue;
            };

            let mut patched_this_method = false;
            for insn in body.instructions.iter_mut() {
                if !insn.opcode.is_call() {
                    continue;
                }
                let Operand::Method(handle) = &insn.operand else {
                    continue;
                };
                if handle.declaring_type != decoder_type {
                    continue;
                }
                let Some(text) = accessors.get(&handle.method_name) else {
                    continue;
                };

                insn.opcode = Opcode::LdStr;
                insn.operand = Operand::Text(text.clone());
                patched_this_method = true;
                report.calls_replaced += 1;
            }

            if patched_this_method {
                report.methods_patched += 1;
            }
        }
    }
}
