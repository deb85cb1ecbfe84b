//! JVM class-file reading, editing and writing.
//!
//! Unlike a stub extractor, this crate keeps everything it does not
//! understand as raw bytes (constant-pool payloads, unknown attributes), so
//! a parse/serialize round trip of an untouched class is byte-identical.
//! That property is what lets the instrumentation engine rewrite one method
//! of a class without disturbing the rest of the image.

#![forbid(unsafe_code)]

mod classfile;
mod code;
mod constant_pool;
mod descriptor;
mod error;
mod reader;
mod stackmap;
mod writer;

pub use crate::classfile::{access_flags, AttributeInfo, ClassFile, MemberInfo};
pub use crate::code::{opcodes, CodeAttribute, ExceptionHandler, InsnBuffer};
pub use crate::constant_pool::{Constant, ConstantPool};
pub use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
pub use crate::descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType};
pub use crate::error::{Error, Result};
pub use crate::reader::Reader;
pub use crate::stackmap::{shift_frame_offsets, single_throwable_frame};
pub use crate::writer::Writer;
