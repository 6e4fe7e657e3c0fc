//! Owned, `dotscope`-independent representation of a loaded module.
//!
//! Every other component in this crate operates exclusively on these types. The only
//! place that talks to `dotscope` is [`crate::facade`], which translates between its
//! object graph and this one on load, and writes the mutated streams back on write.
//! Keeping the boundary here lets the analysis and rewriting components be exercised
//! with hand-built fixtures instead of real PE files.

use std::fmt;

/// A loaded managed binary: an ordered sequence of declared types.
///
/// `Module` owns everything reachable from it, including every method body's
/// instruction stream. There is no sharing and no interior mutability; the pipeline
/// holds one `Module` for the whole run and mutates it directly.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<TypeRef>,
}

impl Module {
    pub fn new(types: Vec<TypeRef>) -> Self {
        Module { types }
    }

    /// Enumeration order is declaration order; this is also iteration order.
    pub fn enumerate_types(&self) -> impl Iterator<Item = &TypeRef> {
        self.types.iter()
    }

    pub fn find_type(&self, full_name: &str) -> Option<&TypeRef> {
        self.types.iter().find(|t| t.full_name == full_name)
    }
}

/// One declared type.
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// Fully qualified name, e.g. `MyApp.Internal.<PrivateImplementationDetails>`.
    pub full_name: String,
    pub is_nested: bool,
    pub fields: Vec<FieldRef>,
    pub methods: Vec<MethodRef>,
}

impl TypeRef {
    pub fn new(full_name: impl Into<String>) -> Self {
        TypeRef {
            full_name: full_name.into(),
            is_nested: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }
}

/// Coarse classification of a field's declared type, sufficient to recognize the
/// decoder's payload and lookup-table fields without a full signature parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    ByteSequence,
    TextSequence,
    TextSequenceArray,
    Other,
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldRef {
    pub name: String,
    pub is_static: bool,
    pub semantic_type: SemanticType,
    /// Present for static fields whose initial value is embedded in metadata, reached
    /// either directly or via a data-token-carrying field (see `facade`/`decoder`).
    pub initial_bytes: Option<Vec<u8>>,
}

impl FieldRef {
    pub fn new(name: impl Into<String>, is_static: bool, semantic_type: SemanticType) -> Self {
        FieldRef {
            name: name.into(),
            is_static,
            semantic_type,
            initial_bytes: None,
        }
    }

    pub fn with_initial_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.initial_bytes = Some(bytes);
        self
    }
}

/// Coarse classification of a method's return type; only text-sequence matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    TextSequence,
    Other,
}

/// One declared method.
#[derive(Debug, Clone)]
pub struct MethodRef {
    pub name: String,
    pub param_count: usize,
    pub return_type: ReturnType,
    pub body: Option<InstructionStream>,
}

impl MethodRef {
    pub fn new(name: impl Into<String>, param_count: usize, return_type: ReturnType) -> Self {
        MethodRef {
            name: name.into(),
            param_count,
            return_type,
            body: None,
        }
    }

    pub fn with_body(mut self, body: InstructionStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }
}

/// The ordered, mutable sequence of instructions making up a method body.
///
/// Length and relative order are invariant across a rewrite: only `opcode` and
/// `operand` of individual elements are ever mutated in place.
#[derive(Debug, Clone, Default)]
pub struct InstructionStream {
    pub instructions: Vec<Instruction>,
}

impl InstructionStream {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        InstructionStream { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A reference to a method, as carried by a `call`/`virtual-call` operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    pub declaring_type: String,
    pub method_name: String,
}

/// A reference to a field, as carried by a `load-token`/`store-static` operand. These
/// only appear in static initializers and only matter to the Decoder Locator,
/// which follows them to reach a static byte-sequence field's backing data blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle {
    pub declaring_type: String,
    pub field_name: String,
}

/// The operand carried by an instruction. Only the kinds this pipeline needs to
/// recognize or emit are modeled individually; everything else is `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int32(i32),
    Method(MethodHandle),
    Field(FieldHandle),
    Text(String),
    Other,
}

/// The subset of the CIL instruction set this pipeline recognizes by name. Opcodes it
/// does not need to reason about (arithmetic, locals, branches, ...) are preserved
/// verbatim as `Other` carrying the original one-byte opcode, so instruction streams
/// round-trip unchanged except where the rewriter explicitly mutates an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    Ret,
    Dup,
    Pop,
    LdcI4M1,
    /// `ldc.i4.0` .. `ldc.i4.8`, stored as the literal 0..=8.
    LdcI4Small(u8),
    LdcI4S,
    LdcI4,
    Call,
    CallVirt,
    /// Pushes a constant text reference; the substitution target of this pipeline.
    LdStr,
    /// Loads a metadata token for a field, used by static initializers to reference
    /// the data blob that backs a `byte[]`'s `RuntimeHelpers.InitializeArray` call.
    LoadFieldToken,
    /// Stores the top of stack into a static field.
    StoreStatic,
    Other(u8),
}

impl Opcode {
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallVirt)
    }
}

/// One `(opcode, operand)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    pub fn call(declaring_type: impl Into<String>, method_name: impl Into<String>) -> Self {
        Instruction::new(
            Opcode::Call,
            Operand::Method(MethodHandle {
                declaring_type: declaring_type.into(),
                method_name: method_name.into(),
            }),
        )
    }

    pub fn call_virt(declaring_type: impl Into<String>, method_name: impl Into<String>) -> Self {
        Instruction::new(
            Opcode::CallVirt,
            Operand::Method(MethodHandle {
                declaring_type: declaring_type.into(),
                method_name: method_name.into(),
            }),
        )
    }

    pub fn ldc_i4(value: i32) -> Self {
        match value {
            0..=8 => Instruction::new(Opcode::LdcI4Small(value as u8), Operand::Int32(value)),
            -1 => Instruction::new(Opcode::LdcI4M1, Operand::Int32(value)),
            v if i8::try_from(v).is_ok() => Instruction::new(Opcode::LdcI4S, Operand::Int32(value)),
            v => Instruction::new(Opcode::LdcI4, Operand::Int32(value)),
        }
    }

    pub fn ret() -> Self {
        Instruction::new(Opcode::Ret, Operand::None)
    }

    pub fn load_field_token(declaring_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Instruction::new(
            Opcode::LoadFieldToken,
            Operand::Field(FieldHandle {
                declaring_type: declaring_type.into(),
                field_name: field_name.into(),
            }),
        )
    }

    pub fn store_static(declaring_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Instruction::new(
            Opcode::StoreStatic,
            Operand::Field(FieldHandle {
                declaring_type: declaring_type.into(),
                field_name: field_name.into(),
            }),
        )
    }

    /// Decodes the integer constant carried by one of the shorthand `ldc.i4*` forms or
    /// the full 32-bit form. Returns `None` for any other opcode: any other opcode in the
    /// three-instruction window invalidates the pattern.
    pub fn as_int32_constant(&self) -> Option<i32> {
        match (self.opcode, &self.operand) {
            (Opcode::LdcI4M1, Operand::Int32(v)) => Some(*v),
            (Opcode::LdcI4Small(n), Operand::Int32(v)) if i32::from(n) == *v => Some(*v),
            (Opcode::LdcI4S, Operand::Int32(v)) => Some(*v),
            (Opcode::LdcI4, Operand::Int32(v)) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Nop => write!(f, "nop"),
            Opcode::Ret => write!(f, "ret"),
            Opcode::Dup => write!(f, "dup"),
            Opcode::Pop => write!(f, "pop"),
            Opcode::LdcI4M1 => write!(f, "ldc.i4.m1"),
            Opcode::LdcI4Small(n) => write!(f, "ldc.i4.{n}"),
            Opcode::LdcI4S => write!(f, "ldc.i4.s"),
            Opcode::LdcI4 => write!(f, "ldc.i4"),
            Opcode::Call => write!(f, "call"),
            Opcode::CallVirt => write!(f, "callvirt"),
            Opcode::LdStr => write!(f, "ldstr"),
            Opcode::LoadFieldToken => write!(f, "ldtoken"),
            Opcode::StoreStatic => write!(f, "stsfld"),
            Opcode::Other(byte) => write!(f, "<0x{byte:02X}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldc_i4_picks_the_right_shorthand() {
        assert_eq!(Instruction::ldc_i4(0).opcode, Opcode::LdcI4Small(0));
        assert_eq!(Instruction::ldc_i4(8).opcode, Opcode::LdcI4Small(8));
        assert_eq!(Instruction::ldc_i4(-1).opcode, Opcode::LdcI4M1);
        assert_eq!(Instruction::ldc_i4(100).opcode, Opcode::LdcI4S);
        assert_eq!(Instruction::ldc_i4(70_000).opcode, Opcode::LdcI4);
    }

    #[test]
    fn as_int32_constant_rejects_non_constant_opcodes() {
        let call = Instruction::call("Decoder", "A");
        assert_eq!(call.as_int32_constant(), None);
        let ldc = Instruction::ldc_i4(13);
        assert_eq!(ldc.as_int32_constant(), Some(13));
    }

    #[test]
    fn is_call_recognizes_both_call_forms() {
        assert!(Opcode::Call.is_call());
        assert!(Opcode::CallVirt.is_call());
        assert!(!Opcode::Ret.is_call());
    }
}
