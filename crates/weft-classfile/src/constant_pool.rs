use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// One constant-pool entry. Numeric payloads are kept as raw bits and UTF-8
/// entries as raw bytes (the JVM uses modified UTF-8) so serialization
/// reproduces the input exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

impl Constant {
    /// `Long` and `Double` occupy two pool slots (JVMS 4.4.5).
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Editable constant pool. Existing entries are never rewritten; the only
/// mutation is a deduplicating append, so indices embedded in untouched
/// code remain valid.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    // Slot 0 and the trailing slot of wide entries are `None`.
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: vec![None] }
    }

    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(None);
        while entries.len() < count {
            let tag = reader.read_u1()?;
            let constant = match tag {
                tag::UTF8 => {
                    let len = reader.read_u2()? as usize;
                    Constant::Utf8(reader.read_bytes(len)?.to_vec())
                }
                tag::INTEGER => Constant::Integer(reader.read_u4()?),
                tag::FLOAT => Constant::Float(reader.read_u4()?),
                tag::LONG => {
                    let hi = reader.read_u4()? as u64;
                    let lo = reader.read_u4()? as u64;
                    Constant::Long(hi << 32 | lo)
                }
                tag::DOUBLE => {
                    let hi = reader.read_u4()? as u64;
                    let lo = reader.read_u4()? as u64;
                    Constant::Double(hi << 32 | lo)
                }
                tag::CLASS => Constant::Class { name_index: reader.read_u2()? },
                tag::STRING => Constant::String { string_index: reader.read_u2()? },
                tag::FIELDREF => Constant::Fieldref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                tag::METHODREF => Constant::Methodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                tag::INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                tag::NAME_AND_TYPE => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                tag::METHOD_HANDLE => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                tag::METHOD_TYPE => Constant::MethodType { descriptor_index: reader.read_u2()? },
                tag::DYNAMIC => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                tag::MODULE => Constant::Module { name_index: reader.read_u2()? },
                tag::PACKAGE => Constant::Package { name_index: reader.read_u2()? },
                other => return Err(Error::InvalidConstantPoolTag(other)),
            };
            let wide = constant.is_wide();
            entries.push(Some(constant));
            if wide {
                entries.push(None);
            }
        }
        if entries.len() != count {
            // A wide constant in the last slot overran the declared count.
            return Err(Error::InvalidConstantPoolIndex(count as u16));
        }
        Ok(Self { entries })
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u2(self.entries.len() as u16);
        for entry in self.entries.iter().flatten() {
            match entry {
                Constant::Utf8(bytes) => {
                    writer.write_u1(tag::UTF8);
                    writer.write_u2(bytes.len() as u16);
                    writer.write_bytes(bytes);
                }
                Constant::Integer(bits) => {
                    writer.write_u1(tag::INTEGER);
                    writer.write_u4(*bits);
                }
                Constant::Float(bits) => {
                    writer.write_u1(tag::FLOAT);
                    writer.write_u4(*bits);
                }
                Constant::Long(bits) => {
                    writer.write_u1(tag::LONG);
                    writer.write_u4((bits >> 32) as u32);
                    writer.write_u4(*bits as u32);
                }
                Constant::Double(bits) => {
                    writer.write_u1(tag::DOUBLE);
                    writer.write_u4((bits >> 32) as u32);
                    writer.write_u4(*bits as u32);
                }
                Constant::Class { name_index } => {
                    writer.write_u1(tag::CLASS);
                    writer.write_u2(*name_index);
                }
                Constant::String { string_index } => {
                    writer.write_u1(tag::STRING);
                    writer.write_u2(*string_index);
                }
                Constant::Fieldref { class_index, name_and_type_index } => {
                    writer.write_u1(tag::FIELDREF);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::Methodref { class_index, name_and_type_index } => {
                    writer.write_u1(tag::METHODREF);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::InterfaceMethodref { class_index, name_and_type_index } => {
                    writer.write_u1(tag::INTERFACE_METHODREF);
                    writer.write_u2(*class_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::NameAndType { name_index, descriptor_index } => {
                    writer.write_u1(tag::NAME_AND_TYPE);
                    writer.write_u2(*name_index);
                    writer.write_u2(*descriptor_index);
                }
                Constant::MethodHandle { reference_kind, reference_index } => {
                    writer.write_u1(tag::METHOD_HANDLE);
                    writer.write_u1(*reference_kind);
                    writer.write_u2(*reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    writer.write_u1(tag::METHOD_TYPE);
                    writer.write_u2(*descriptor_index);
                }
                Constant::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
                    writer.write_u1(tag::DYNAMIC);
                    writer.write_u2(*bootstrap_method_attr_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
                    writer.write_u1(tag::INVOKE_DYNAMIC);
                    writer.write_u2(*bootstrap_method_attr_index);
                    writer.write_u2(*name_and_type_index);
                }
                Constant::Module { name_index } => {
                    writer.write_u1(tag::MODULE);
                    writer.write_u2(*name_index);
                }
                Constant::Package { name_index } => {
                    writer.write_u1(tag::PACKAGE);
                    writer.write_u2(*name_index);
                }
            }
        }
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidConstantPoolIndex(index))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(bytes) => {
                std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8Constant(index))
            }
            _ => Err(Error::ConstantPoolTypeMismatch { index, expected: "Utf8" }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(Error::ConstantPoolTypeMismatch { index, expected: "Class" }),
        }
    }

    /// Appends `constant`, reusing an existing identical entry if present.
    pub fn push(&mut self, constant: Constant) -> Result<u16> {
        for (i, existing) in self.entries.iter().enumerate() {
            if existing.as_ref() == Some(&constant) {
                return Ok(i as u16);
            }
        }
        let width = if constant.is_wide() { 2 } else { 1 };
        // A rejected push must leave the pool exactly as it was.
        if self.entries.len() + width > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        let index = self.entries.len();
        self.entries.push(Some(constant));
        if width == 2 {
            self.entries.push(None);
        }
        Ok(index as u16)
    }

    pub fn ensure_utf8(&mut self, value: &str) -> Result<u16> {
        self.push(Constant::Utf8(value.as_bytes().to_vec()))
    }

    pub fn ensure_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.ensure_utf8(name)?;
        self.push(Constant::Class { name_index })
    }

    pub fn ensure_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.ensure_utf8(name)?;
        let descriptor_index = self.ensure_utf8(descriptor)?;
        self.push(Constant::NameAndType { name_index, descriptor_index })
    }

    pub fn ensure_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.ensure_class(class)?;
        let name_and_type_index = self.ensure_name_and_type(name, descriptor)?;
        self.push(Constant::Methodref { class_index, name_and_type_index })
    }

    pub fn ensure_fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.ensure_class(class)?;
        let name_and_type_index = self.ensure_name_and_type(name, descriptor)?;
        self.push(Constant::Fieldref { class_index, name_and_type_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_methodref_deduplicates() {
        let mut pool = ConstantPool::new();
        let first = pool.ensure_methodref("java/lang/Thread", "run", "()V").unwrap();
        let second = pool.ensure_methodref("java/lang/Thread", "run", "()V").unwrap();
        assert_eq!(first, second);
        // Shares the Class and NameAndType entries with the methodref above.
        let other = pool.ensure_methodref("java/lang/Thread", "start", "()V").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn full_pool_rejects_push_and_stays_serializable() {
        // A pool at the u16 count limit: 65534 distinct Integer entries.
        let mut writer = Writer::new();
        writer.write_u2(u16::MAX);
        for i in 0..u16::MAX as u32 - 1 {
            writer.write_u1(tag::INTEGER);
            writer.write_u4(i);
        }
        let bytes = writer.into_bytes();
        let mut pool = ConstantPool::parse(&mut Reader::new(&bytes)).unwrap();

        assert!(matches!(
            pool.push(Constant::Utf8(b"overflow".to_vec())),
            Err(Error::ConstantPoolOverflow)
        ));
        assert!(matches!(pool.push(Constant::Long(1)), Err(Error::ConstantPoolOverflow)));

        // The rejected pushes left nothing behind.
        let mut out = Writer::new();
        pool.write(&mut out);
        assert_eq!(out.into_bytes(), bytes);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long_index = pool.push(Constant::Long(7)).unwrap();
        let next = pool.ensure_utf8("after").unwrap();
        assert_eq!(next, long_index + 2);

        let mut writer = Writer::new();
        pool.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = Reader::new(&bytes);
        let reparsed = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(reparsed.get(long_index).unwrap(), &Constant::Long(7));
        assert_eq!(reparsed.utf8(next).unwrap(), "after");
    }
}
