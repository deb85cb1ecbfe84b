use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

pub mod access_flags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const BRIDGE: u16 = 0x0040;
    pub const NATIVE: u16 = 0x0100;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
}

/// A class-file image with the structures the rewriter edits parsed out and
/// everything else preserved verbatim. Names are referenced by pool index,
/// not resolved into strings, so untouched members round-trip exactly.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

/// A field_info or method_info structure.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

/// An attribute kept as raw bytes; the name is resolved through the pool
/// only when the caller needs to recognize it.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = reader.read_u2()?;
        let super_class = reader.read_u2()?;

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(reader.read_u2()?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_member(&mut reader)?);
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_member(&mut reader)?);
        }

        let attributes = parse_attributes(&mut reader)?;
        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_u4(0xCAFEBABE);
        writer.write_u2(self.minor_version);
        writer.write_u2(self.major_version);
        self.constant_pool.write(&mut writer);
        writer.write_u2(self.access_flags);
        writer.write_u2(self.this_class);
        writer.write_u2(self.super_class);
        writer.write_u2(self.interfaces.len() as u16);
        for iface in &self.interfaces {
            writer.write_u2(*iface);
        }
        writer.write_u2(self.fields.len() as u16);
        for field in &self.fields {
            write_member(&mut writer, field);
        }
        writer.write_u2(self.methods.len() as u16);
        for method in &self.methods {
            write_member(&mut writer, method);
        }
        write_attributes(&mut writer, &self.attributes);
        writer.into_bytes()
    }

    pub fn class_name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }
}

impl MemberInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & access_flags::STATIC != 0
    }

    /// Index of the attribute named `name`, resolved through `pool`.
    pub fn attribute_index(&self, pool: &ConstantPool, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attr| pool.utf8(attr.name_index).is_ok_and(|n| n == name))
    }
}

fn parse_member(reader: &mut Reader<'_>) -> Result<MemberInfo> {
    let access_flags = reader.read_u2()?;
    let name_index = reader.read_u2()?;
    let descriptor_index = reader.read_u2()?;
    let attributes = parse_attributes(reader)?;
    Ok(MemberInfo { access_flags, name_index, descriptor_index, attributes })
}

fn parse_attributes(reader: &mut Reader<'_>) -> Result<Vec<AttributeInfo>> {
    let count = reader.read_u2()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?.to_vec();
        attributes.push(AttributeInfo { name_index, info });
    }
    Ok(attributes)
}

fn write_member(writer: &mut Writer, member: &MemberInfo) {
    writer.write_u2(member.access_flags);
    writer.write_u2(member.name_index);
    writer.write_u2(member.descriptor_index);
    write_attributes(writer, &member.attributes);
}

fn write_attributes(writer: &mut Writer, attributes: &[AttributeInfo]) {
    writer.write_u2(attributes.len() as u16);
    for attr in attributes {
        writer.write_u2(attr.name_index);
        writer.write_u4(attr.info.len() as u32);
        writer.write_bytes(&attr.info);
    }
}
