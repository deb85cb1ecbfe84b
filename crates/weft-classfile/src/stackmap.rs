//! Targeted `StackMapTable` edits.
//!
//! Frames encode their bytecode position as deltas, with the first frame's
//! delta absolute, so prepending a prologue only re-encodes the first
//! frame's position. `Uninitialized` verification types are the exception:
//! they carry the absolute offset of their `new` instruction (JVMS 4.7.4)
//! and must move in every frame they appear in.

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const SAME_FRAME_EXTENDED: u8 = 251;
const FULL_FRAME: u8 = 255;
const OBJECT_VARIABLE_INFO: u8 = 7;
const UNINITIALIZED_VARIABLE_INFO: u8 = 8;

/// Rewrites a raw `StackMapTable` payload for a method body that moved
/// forward by `shift` bytes: the first frame's position moves, and so does
/// the `new`-instruction offset of every `Uninitialized` entry.
pub fn shift_frame_offsets(info: &[u8], shift: u16) -> Result<Vec<u8>> {
    let mut reader = Reader::new(info);
    let count = reader.read_u2()?;
    let mut out = Writer::new();
    out.write_u2(count);
    for frame in 0..count {
        let delta_shift = if frame == 0 { shift } else { 0 };
        shift_frame(&mut reader, &mut out, delta_shift, shift)?;
    }
    reader.ensure_empty()?;
    Ok(out.into_bytes())
}

fn shift_frame(
    reader: &mut Reader<'_>,
    out: &mut Writer,
    delta_shift: u16,
    shift: u16,
) -> Result<()> {
    let tag = reader.read_u1()?;
    match tag {
        // same_frame: delta packed into the tag.
        0..=63 => {
            let offset = offset_add(tag as u16, delta_shift)?;
            if offset <= 63 {
                out.write_u1(offset as u8);
            } else {
                out.write_u1(SAME_FRAME_EXTENDED);
                out.write_u2(offset);
            }
        }
        // same_locals_1_stack_item: packed delta, one stack entry.
        64..=127 => {
            let offset = offset_add((tag - 64) as u16, delta_shift)?;
            if offset <= 63 {
                out.write_u1(offset as u8 + 64);
            } else {
                out.write_u1(SAME_LOCALS_1_STACK_ITEM_EXTENDED);
                out.write_u2(offset);
            }
            shift_verification_type(reader, out, shift)?;
        }
        SAME_LOCALS_1_STACK_ITEM_EXTENDED => {
            out.write_u1(tag);
            out.write_u2(offset_add(reader.read_u2()?, delta_shift)?);
            shift_verification_type(reader, out, shift)?;
        }
        // chop frames and same_frame_extended: explicit delta, nothing else.
        248..=251 => {
            out.write_u1(tag);
            out.write_u2(offset_add(reader.read_u2()?, delta_shift)?);
        }
        // append: explicit delta plus tag - 251 new locals.
        252..=254 => {
            out.write_u1(tag);
            out.write_u2(offset_add(reader.read_u2()?, delta_shift)?);
            for _ in 0..tag - 251 {
                shift_verification_type(reader, out, shift)?;
            }
        }
        FULL_FRAME => {
            out.write_u1(tag);
            out.write_u2(offset_add(reader.read_u2()?, delta_shift)?);
            let locals = reader.read_u2()?;
            out.write_u2(locals);
            for _ in 0..locals {
                shift_verification_type(reader, out, shift)?;
            }
            let stack = reader.read_u2()?;
            out.write_u2(stack);
            for _ in 0..stack {
                shift_verification_type(reader, out, shift)?;
            }
        }
        _ => return Err(Error::MalformedAttribute("StackMapTable")),
    }
    Ok(())
}

fn shift_verification_type(reader: &mut Reader<'_>, out: &mut Writer, shift: u16) -> Result<()> {
    let tag = reader.read_u1()?;
    out.write_u1(tag);
    match tag {
        OBJECT_VARIABLE_INFO => out.write_u2(reader.read_u2()?),
        // Names the absolute pc of the `new` that produced the value.
        UNINITIALIZED_VARIABLE_INFO => out.write_u2(offset_add(reader.read_u2()?, shift)?),
        _ => {}
    }
    Ok(())
}

fn offset_add(offset: u16, shift: u16) -> Result<u16> {
    offset.checked_add(shift).ok_or(Error::CodeOverflow)
}

/// Builds the `StackMapTable` payload for a synthesized wrapper: a single
/// catch-any handler at `handler_pc` with `java/lang/Throwable` on the stack
/// and the entry locals untouched.
pub fn single_throwable_frame(handler_pc: u16, throwable_class: u16) -> Vec<u8> {
    let mut out = Writer::new();
    out.write_u2(1);
    out.write_u1(SAME_LOCALS_1_STACK_ITEM_EXTENDED);
    out.write_u2(handler_pc);
    out.write_u1(OBJECT_VARIABLE_INFO);
    out.write_u2(throwable_class);
    out.into_bytes()
}
