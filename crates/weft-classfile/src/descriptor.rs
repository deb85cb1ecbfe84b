use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

impl FieldType {
    /// Number of local-variable slots the type occupies (JVMS 2.6.1).
    pub fn slot_width(&self) -> u16 {
        match self {
            FieldType::Base(BaseType::Long | BaseType::Double) => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }
}

impl MethodDescriptor {
    /// Total argument slots, including the receiver for instance methods.
    pub fn argument_slots(&self, is_static: bool) -> u16 {
        let receiver = if is_static { 0 } else { 1 };
        receiver + self.params.iter().map(FieldType::slot_width).sum::<u16>()
    }
}

impl fmt::Display for FieldType {
    /// Renders the type back into descriptor syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => {
                let c = match base {
                    BaseType::Byte => 'B',
                    BaseType::Char => 'C',
                    BaseType::Double => 'D',
                    BaseType::Float => 'F',
                    BaseType::Int => 'I',
                    BaseType::Long => 'J',
                    BaseType::Short => 'S',
                    BaseType::Boolean => 'Z',
                };
                write!(f, "{c}")
            }
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        write!(f, ")")?;
        match &self.return_type {
            ReturnType::Void => write!(f, "V"),
            ReturnType::Type(ty) => write!(f, "{ty}"),
        }
    }
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    let (ty, rest) = parse_field_type(desc)?;
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let Some(mut remaining) = desc.strip_prefix('(') else {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    };

    let mut params = Vec::new();
    loop {
        if let Some(rest) = remaining.strip_prefix(')') {
            remaining = rest;
            break;
        }
        if remaining.is_empty() {
            return Err(Error::InvalidDescriptor(desc.to_string()));
        }
        let (param, rest) = parse_field_type(remaining)?;
        params.push(param);
        remaining = rest;
    }

    let (return_type, rest) = if let Some(rest) = remaining.strip_prefix('V') {
        (ReturnType::Void, rest)
    } else {
        let (ty, rest) = parse_field_type(remaining)?;
        (ReturnType::Type(ty), rest)
    };
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    Ok(MethodDescriptor { params, return_type })
}

fn parse_field_type(input: &str) -> Result<(FieldType, &str)> {
    let bytes = input.as_bytes();
    if bytes.is_empty() {
        return Err(Error::InvalidDescriptor(input.to_string()));
    }
    match bytes[0] as char {
        'B' => Ok((FieldType::Base(BaseType::Byte), &input[1..])),
        'C' => Ok((FieldType::Base(BaseType::Char), &input[1..])),
        'D' => Ok((FieldType::Base(BaseType::Double), &input[1..])),
        'F' => Ok((FieldType::Base(BaseType::Float), &input[1..])),
        'I' => Ok((FieldType::Base(BaseType::Int), &input[1..])),
        'J' => Ok((FieldType::Base(BaseType::Long), &input[1..])),
        'S' => Ok((FieldType::Base(BaseType::Short), &input[1..])),
        'Z' => Ok((FieldType::Base(BaseType::Boolean), &input[1..])),
        'L' => {
            if let Some(end) = input.find(';') {
                let name = &input[1..end];
                Ok((FieldType::Object(name.to_string()), &input[end + 1..]))
            } else {
                Err(Error::InvalidDescriptor(input.to_string()))
            }
        }
        '[' => {
            let (component, rest) = parse_field_type(&input[1..])?;
            Ok((FieldType::Array(Box::new(component)), rest))
        }
        _ => Err(Error::InvalidDescriptor(input.to_string())),
    }
}
