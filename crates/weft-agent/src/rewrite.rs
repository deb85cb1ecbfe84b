use tracing::{debug, warn};
use weft_classfile::{
    access_flags, parse_method_descriptor, shift_frame_offsets, single_throwable_frame,
    AttributeInfo, ClassFile, CodeAttribute, ExceptionHandler, InsnBuffer, MemberInfo, Reader,
    ReturnType, Writer,
};

use crate::error::RewriteError;
use crate::registry::{CapturePoint, InsertPoint};

/// Internal name of the correlation-store class the generated call sites
/// target. The store itself (capture/insertEnter/insertExit) lives in the
/// support library, never in this engine.
pub const STORAGE_CLASS: &str = "weft/runtime/CaptureStorage";

/// All three store hooks take the key and return nothing.
pub const HOOK_DESCRIPTOR: &str = "(Ljava/lang/Object;)V";

/// Suffix appended to an insert-point method when its body is demoted to
/// the private shadow behind the synthesized wrapper.
pub const SHADOW_SUFFIX: &str = "$$$shadow";

const CAPTURE_HOOK: &str = "capture";
const INSERT_ENTER_HOOK: &str = "insertEnter";
const INSERT_EXIT_HOOK: &str = "insertExit";

/// Rewrites `bytes` according to the matching registry entries.
///
/// Pure function of its inputs: no state survives between calls, and
/// identical inputs produce identical output bytes. Returns `Ok(None)` when
/// nothing ended up instrumented (every match was abstract/native or failed
/// its key-provider preconditions).
pub fn instrument_class(
    bytes: &[u8],
    captures: &[CapturePoint],
    inserts: &[InsertPoint],
) -> Result<Option<Vec<u8>>, RewriteError> {
    let mut class = ClassFile::parse(bytes)?;
    let class_name = class.class_name()?.to_string();

    let mut wrappers = Vec::new();
    let mut changed = false;

    for index in 0..class.methods.len() {
        let method = &class.methods[index];
        if method.access_flags & (access_flags::BRIDGE | access_flags::SYNTHETIC) != 0 {
            continue;
        }
        let name = method.name(&class.constant_pool)?.to_string();

        // Matching is by bare method name; a capture match shadows an
        // insert match for the same name.
        if let Some(point) = captures.iter().find(|p| p.method_name == name) {
            match instrument_capture(&mut class, index, point) {
                Ok(true) => {
                    changed = true;
                    debug!(class = %class_name, method = %name, "instrumented capture point");
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(class = %class_name, method = %name, %err, "capture point skipped");
                }
            }
            continue;
        }

        if let Some(point) = inserts.iter().find(|p| p.method_name == name) {
            match instrument_insert(&mut class, index, point, &class_name) {
                Ok(Some(wrapper)) => {
                    wrappers.push(wrapper);
                    changed = true;
                    debug!(class = %class_name, method = %name, "instrumented insert point");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(class = %class_name, method = %name, %err, "insert point skipped");
                }
            }
        }
    }

    if !changed {
        return Ok(None);
    }
    class.methods.extend(wrappers);
    Ok(Some(class.to_bytes()))
}

/// Prepends `key load; invokestatic capture` to the method body. Original
/// instructions stay byte-for-byte; only absolute offsets around them move.
fn instrument_capture(
    class: &mut ClassFile,
    index: usize,
    point: &CapturePoint,
) -> Result<bool, RewriteError> {
    let ClassFile { ref mut constant_pool, ref mut methods, .. } = *class;
    let method = &mut methods[index];

    let descriptor = parse_method_descriptor(constant_pool.utf8(method.descriptor_index)?)?;
    point.key.validate(method.access_flags, &descriptor)?;

    let Some(code_index) = method.attribute_index(constant_pool, "Code") else {
        // Abstract or native declaration; there is no body to instrument.
        return Ok(false);
    };
    let mut code = CodeAttribute::parse(&method.attributes[code_index].info)?;

    let mut prologue = InsnBuffer::new();
    point.key.emit_load(&mut prologue, constant_pool)?;
    let capture_ref = constant_pool.ensure_methodref(STORAGE_CLASS, CAPTURE_HOOK, HOOK_DESCRIPTOR)?;
    prologue.invokestatic(capture_ref);
    // tableswitch/lookupswitch operands are aligned relative to the code
    // start; keep the original instructions on their 4-byte phase.
    while prologue.len() % 4 != 0 {
        prologue.nop();
    }
    let shift = prologue.len() as u16;

    let mut body = prologue.into_bytes();
    body.extend_from_slice(&code.code);
    code.code = body;
    code.max_stack = code.max_stack.max(1);

    for handler in &mut code.exception_table {
        handler.start_pc = offset_add(handler.start_pc, shift)?;
        handler.end_pc = offset_add(handler.end_pc, shift)?;
        handler.handler_pc = offset_add(handler.handler_pc, shift)?;
    }
    for attr in &mut code.attributes {
        match constant_pool.utf8(attr.name_index)? {
            "StackMapTable" => attr.info = shift_frame_offsets(&attr.info, shift)?,
            "LineNumberTable" => attr.info = shift_line_numbers(&attr.info, shift)?,
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                attr.info = shift_local_variables(&attr.info, shift)?;
            }
            _ => {}
        }
    }

    method.attributes[code_index].info = code.to_bytes()?;
    Ok(true)
}

/// Demotes the original method to a private synthetic shadow and puts a
/// wrapper under its name that brackets the shadow call with
/// `insertEnter`/`insertExit` on both the normal and the exceptional exit.
fn instrument_insert(
    class: &mut ClassFile,
    index: usize,
    point: &InsertPoint,
    class_name: &str,
) -> Result<Option<MemberInfo>, RewriteError> {
    let major_version = class.major_version;
    let ClassFile { ref mut constant_pool, ref mut methods, .. } = *class;
    let method = &mut methods[index];

    let descriptor_str = constant_pool.utf8(method.descriptor_index)?.to_string();
    let descriptor = parse_method_descriptor(&descriptor_str)?;
    point.key.validate(method.access_flags, &descriptor)?;
    if method.attribute_index(constant_pool, "Code").is_none() {
        return Ok(None);
    }

    let original_access = method.access_flags;
    let is_static = method.is_static();
    let name = method.name(constant_pool)?.to_string();
    let shadow_name = format!("{name}{SHADOW_SUFFIX}");

    let enter_ref =
        constant_pool.ensure_methodref(STORAGE_CLASS, INSERT_ENTER_HOOK, HOOK_DESCRIPTOR)?;
    let exit_ref =
        constant_pool.ensure_methodref(STORAGE_CLASS, INSERT_EXIT_HOOK, HOOK_DESCRIPTOR)?;
    let shadow_ref = constant_pool.ensure_methodref(class_name, &shadow_name, &descriptor_str)?;

    let mut insns = InsnBuffer::new();
    point.key.emit_load(&mut insns, constant_pool)?;
    insns.invokestatic(enter_ref);

    // Exceptions from here through the shadow call reach the catch-any
    // handler, so exit runs exactly once whichever way the call leaves.
    let try_start = insns.len() as u16;
    let mut slot = 0u16;
    if !is_static {
        insns.aload(0);
        slot = 1;
    }
    for param in &descriptor.params {
        insns.load(param, slot);
        slot += param.slot_width();
    }
    if is_static {
        insns.invokestatic(shadow_ref);
    } else {
        insns.invokespecial(shadow_ref);
    }
    let try_end = insns.len() as u16;

    // Normal exit: the return value rides the stack across the exit hook.
    point.key.emit_load(&mut insns, constant_pool)?;
    insns.invokestatic(exit_ref);
    insns.ret(&descriptor.return_type);

    // Exceptional exit: call the hook, then re-raise the same object.
    let handler_pc = insns.len() as u16;
    point.key.emit_load(&mut insns, constant_pool)?;
    insns.invokestatic(exit_ref);
    insns.athrow();

    let argument_slots = descriptor.argument_slots(is_static);
    let return_width = match &descriptor.return_type {
        ReturnType::Void => 0,
        ReturnType::Type(ty) => ty.slot_width(),
    };

    // Frame metadata is built from scratch; the shadow body's metadata does
    // not describe these call sites.
    let mut code_attributes = Vec::new();
    if major_version >= 50 {
        code_attributes.push(AttributeInfo {
            name_index: constant_pool.ensure_utf8("StackMapTable")?,
            info: single_throwable_frame(
                handler_pc,
                constant_pool.ensure_class("java/lang/Throwable")?,
            ),
        });
    }
    let wrapper_code = CodeAttribute {
        max_stack: argument_slots.max(return_width + 1).max(2),
        max_locals: argument_slots,
        code: insns.into_bytes(),
        exception_table: vec![ExceptionHandler {
            start_pc: try_start,
            end_pc: try_end,
            handler_pc,
            catch_type: 0,
        }],
        attributes: code_attributes,
    };

    let mut wrapper_attributes = vec![AttributeInfo {
        name_index: constant_pool.ensure_utf8("Code")?,
        info: wrapper_code.to_bytes()?,
    }];
    // The declared throws clause belongs on the public surface.
    if let Some(exceptions_index) = method.attribute_index(constant_pool, "Exceptions") {
        wrapper_attributes.push(method.attributes[exceptions_index].clone());
    }
    let wrapper = MemberInfo {
        access_flags: original_access,
        name_index: method.name_index,
        descriptor_index: method.descriptor_index,
        attributes: wrapper_attributes,
    };

    method.name_index = constant_pool.ensure_utf8(&shadow_name)?;
    method.access_flags = (original_access & !(access_flags::PUBLIC | access_flags::PROTECTED))
        | access_flags::PRIVATE
        | access_flags::SYNTHETIC;

    Ok(Some(wrapper))
}

fn offset_add(pc: u16, shift: u16) -> Result<u16, RewriteError> {
    pc.checked_add(shift).ok_or(RewriteError::ClassFormat(weft_classfile::Error::CodeOverflow))
}

fn shift_line_numbers(info: &[u8], shift: u16) -> Result<Vec<u8>, RewriteError> {
    let mut reader = Reader::new(info);
    let count = reader.read_u2()?;
    let mut out = Writer::new();
    out.write_u2(count);
    for _ in 0..count {
        out.write_u2(offset_add(reader.read_u2()?, shift)?);
        out.write_u2(reader.read_u2()?);
    }
    reader.ensure_empty()?;
    Ok(out.into_bytes())
}

fn shift_local_variables(info: &[u8], shift: u16) -> Result<Vec<u8>, RewriteError> {
    let mut reader = Reader::new(info);
    let count = reader.read_u2()?;
    let mut out = Writer::new();
    out.write_u2(count);
    for _ in 0..count {
        out.write_u2(offset_add(reader.read_u2()?, shift)?);
        // length, name, descriptor, slot index: unchanged.
        out.write_bytes(reader.read_bytes(8)?);
    }
    reader.ensure_empty()?;
    Ok(out.into_bytes())
}
