use crate::descriptor::{BaseType, FieldType, ReturnType};
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

use crate::classfile::AttributeInfo;

/// The opcodes the engine emits or inspects. Not a complete table.
pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_0: u8 = 0x03;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const ILOAD: u8 = 0x15;
    pub const LLOAD: u8 = 0x16;
    pub const FLOAD: u8 = 0x17;
    pub const DLOAD: u8 = 0x18;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1a;
    pub const LLOAD_0: u8 = 0x1e;
    pub const FLOAD_0: u8 = 0x22;
    pub const DLOAD_0: u8 = 0x26;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3a;
    pub const ISTORE_0: u8 = 0x3b;
    pub const ASTORE_0: u8 = 0x4b;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const IADD: u8 = 0x60;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const IFNE: u8 = 0x9a;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const GOTO: u8 = 0xa7;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const FRETURN: u8 = 0xae;
    pub const DRETURN: u8 = 0xaf;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const GETFIELD: u8 = 0xb4;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const ATHROW: u8 = 0xbf;
    pub const WIDE: u8 = 0xc4;
}

/// Parsed `Code` attribute. Nested attributes (`StackMapTable`,
/// `LineNumberTable`, ...) stay raw; the rewriter adjusts the ones it knows
/// and carries the rest.
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Pool index of the caught class, or 0 for catch-any.
    pub catch_type: u16,
}

impl CodeAttribute {
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(info);
        let max_stack = reader.read_u2()?;
        let max_locals = reader.read_u2()?;
        let code_length = reader.read_u4()? as usize;
        let code = reader.read_bytes(code_length)?.to_vec();

        let handler_count = reader.read_u2()? as usize;
        let mut exception_table = Vec::with_capacity(handler_count);
        for _ in 0..handler_count {
            exception_table.push(ExceptionHandler {
                start_pc: reader.read_u2()?,
                end_pc: reader.read_u2()?,
                handler_pc: reader.read_u2()?,
                catch_type: reader.read_u2()?,
            });
        }

        let attr_count = reader.read_u2()? as usize;
        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            let name_index = reader.read_u2()?;
            let length = reader.read_u4()? as usize;
            let info = reader.read_bytes(length)?.to_vec();
            attributes.push(AttributeInfo { name_index, info });
        }
        reader.ensure_empty()?;

        Ok(Self { max_stack, max_locals, code, exception_table, attributes })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.code.len() > u16::MAX as usize {
            return Err(Error::CodeOverflow);
        }
        let mut writer = Writer::new();
        writer.write_u2(self.max_stack);
        writer.write_u2(self.max_locals);
        writer.write_u4(self.code.len() as u32);
        writer.write_bytes(&self.code);
        writer.write_u2(self.exception_table.len() as u16);
        for handler in &self.exception_table {
            writer.write_u2(handler.start_pc);
            writer.write_u2(handler.end_pc);
            writer.write_u2(handler.handler_pc);
            writer.write_u2(handler.catch_type);
        }
        writer.write_u2(self.attributes.len() as u16);
        for attr in &self.attributes {
            writer.write_u2(attr.name_index);
            writer.write_u4(attr.info.len() as u32);
            writer.write_bytes(&attr.info);
        }
        Ok(writer.into_bytes())
    }
}

/// Instruction emitter for synthesized code. Picks the compact load forms
/// and falls back to `wide` for slots above 255.
#[derive(Default)]
pub struct InsnBuffer {
    bytes: Vec<u8>,
}

impl InsnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn nop(&mut self) {
        self.bytes.push(opcodes::NOP);
    }

    pub fn aload(&mut self, slot: u16) {
        self.load_with(opcodes::ALOAD, opcodes::ALOAD_0, slot);
    }

    /// Emits the type-correct load for `ty` from `slot`.
    pub fn load(&mut self, ty: &FieldType, slot: u16) {
        let (long_form, short_base) = match ty {
            FieldType::Base(BaseType::Long) => (opcodes::LLOAD, opcodes::LLOAD_0),
            FieldType::Base(BaseType::Float) => (opcodes::FLOAD, opcodes::FLOAD_0),
            FieldType::Base(BaseType::Double) => (opcodes::DLOAD, opcodes::DLOAD_0),
            FieldType::Base(_) => (opcodes::ILOAD, opcodes::ILOAD_0),
            FieldType::Object(_) | FieldType::Array(_) => (opcodes::ALOAD, opcodes::ALOAD_0),
        };
        self.load_with(long_form, short_base, slot);
    }

    fn load_with(&mut self, long_form: u8, short_base: u8, slot: u16) {
        if slot <= 3 {
            self.bytes.push(short_base + slot as u8);
        } else if slot <= u8::MAX as u16 {
            self.bytes.push(long_form);
            self.bytes.push(slot as u8);
        } else {
            self.bytes.push(opcodes::WIDE);
            self.bytes.push(long_form);
            self.bytes.extend_from_slice(&slot.to_be_bytes());
        }
    }

    pub fn getfield(&mut self, fieldref: u16) {
        self.with_index(opcodes::GETFIELD, fieldref);
    }

    pub fn invokevirtual(&mut self, methodref: u16) {
        self.with_index(opcodes::INVOKEVIRTUAL, methodref);
    }

    pub fn invokespecial(&mut self, methodref: u16) {
        self.with_index(opcodes::INVOKESPECIAL, methodref);
    }

    pub fn invokestatic(&mut self, methodref: u16) {
        self.with_index(opcodes::INVOKESTATIC, methodref);
    }

    pub fn athrow(&mut self) {
        self.bytes.push(opcodes::ATHROW);
    }

    /// Emits the return instruction matching the method's return type.
    pub fn ret(&mut self, return_type: &ReturnType) {
        let opcode = match return_type {
            ReturnType::Void => opcodes::RETURN,
            ReturnType::Type(FieldType::Base(BaseType::Long)) => opcodes::LRETURN,
            ReturnType::Type(FieldType::Base(BaseType::Float)) => opcodes::FRETURN,
            ReturnType::Type(FieldType::Base(BaseType::Double)) => opcodes::DRETURN,
            ReturnType::Type(FieldType::Base(_)) => opcodes::IRETURN,
            ReturnType::Type(_) => opcodes::ARETURN,
        };
        self.bytes.push(opcode);
    }

    fn with_index(&mut self, opcode: u8, index: u16) {
        self.bytes.push(opcode);
        self.bytes.extend_from_slice(&index.to_be_bytes());
    }
}
