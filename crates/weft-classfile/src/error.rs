use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid classfile magic: 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
    #[error("constant pool type mismatch at index {index}: expected {expected}")]
    ConstantPoolTypeMismatch { index: u16, expected: &'static str },
    #[error("constant pool entry {0} is not valid UTF-8")]
    InvalidUtf8Constant(u16),
    #[error("constant pool is full")]
    ConstantPoolOverflow,
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
    #[error("method body exceeds the 65535-byte class-file limit")]
    CodeOverflow,
    #[error("trailing bytes after classfile structure")]
    TrailingBytes,
}
