use weft_classfile::{access_flags, ConstantPool, InsnBuffer, MethodDescriptor};

use crate::error::RewriteError;

/// Code-generation recipe for the correlation key at an instrumentation
/// point. A closed set: each variant emits instructions that push exactly
/// one reference and leave the rest of the frame untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyProvider {
    /// The receiver of the enclosing instance method.
    ThisRef,
    /// The value in argument slot `n`, counting the implicit receiver as
    /// slot 0 for instance methods and minding long/double widths.
    ParamSlot(u16),
    /// A field read off the current receiver.
    FieldRead { class_name: String, field_name: String, descriptor: String },
}

impl KeyProvider {
    /// Checks the provider's preconditions against the target method.
    /// A violation is a configuration error, not a runtime condition.
    pub fn validate(
        &self,
        method_access: u16,
        descriptor: &MethodDescriptor,
    ) -> Result<(), RewriteError> {
        let is_static = method_access & access_flags::STATIC != 0;
        match self {
            KeyProvider::ThisRef | KeyProvider::FieldRead { .. } => {
                if is_static {
                    return Err(RewriteError::KeyRequiresInstance);
                }
            }
            KeyProvider::ParamSlot(slot) => {
                if !slot_holds_reference(*slot, is_static, descriptor) {
                    return Err(RewriteError::KeyParamUnavailable {
                        slot: *slot,
                        descriptor: descriptor.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Emits the instructions that leave the key on the operand stack.
    pub fn emit_load(
        &self,
        insns: &mut InsnBuffer,
        pool: &mut ConstantPool,
    ) -> Result<(), RewriteError> {
        match self {
            KeyProvider::ThisRef => insns.aload(0),
            KeyProvider::ParamSlot(slot) => insns.aload(*slot),
            KeyProvider::FieldRead { class_name, field_name, descriptor } => {
                insns.aload(0);
                let fieldref = pool.ensure_fieldref(class_name, field_name, descriptor)?;
                insns.getfield(fieldref);
            }
        }
        Ok(())
    }
}

fn slot_holds_reference(slot: u16, is_static: bool, descriptor: &MethodDescriptor) -> bool {
    let mut next = if is_static {
        0
    } else {
        if slot == 0 {
            // The receiver.
            return true;
        }
        1
    };
    for param in &descriptor.params {
        if next == slot {
            return param.is_reference();
        }
        if next > slot {
            // `slot` points into the middle of a long/double.
            return false;
        }
        next += param.slot_width();
    }
    false
}
