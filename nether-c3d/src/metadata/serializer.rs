//! Parameter section serialization

use super::{Group, MetadataStore, Param, SECTION_PROLOGUE};
use crate::BLOCK_SIZE;
use crate::error::{C3dError, Result};
use crate::processor::Processor;

pub(crate) fn serialize_section(store: &MetadataStore) -> Result<Vec<u8>> {
    let processor = store.processor();
    let mut out = Vec::with_capacity(store.section_len());

    // ========== Prologue ==========
    // Block count is patched once the records are laid out
    out.extend_from_slice(&[0, 0, 0, processor.tag()]);

    // ========== Records ==========
    let mut last_offset = None;
    for group in store.groups() {
        if group.name().is_empty() {
            return Err(C3dError::metadata(format!(
                "group {} has no name and cannot be written",
                group.id()
            )));
        }
        last_offset = Some(write_group(&mut out, group, processor)?);
        for param in group.params() {
            last_offset = Some(write_param(&mut out, group.id(), param, processor)?);
        }
    }

    // Final record carries offset 0
    if let Some(at) = last_offset {
        out[at] = 0;
        out[at + 1] = 0;
    }

    // ========== Pad to blocks ==========
    let blocks = out.len().max(SECTION_PROLOGUE).div_ceil(BLOCK_SIZE);
    let block_count = u8::try_from(blocks).map_err(|_| {
        C3dError::metadata(format!(
            "parameter section needs {blocks} blocks, at most 255 fit"
        ))
    })?;
    out[2] = block_count;
    out.resize(blocks * BLOCK_SIZE, 0);

    Ok(out)
}

/// Writes the record and returns the position of its offset field
fn write_group(out: &mut Vec<u8>, group: &Group, processor: Processor) -> Result<usize> {
    let name = processor.encode_string(group.name());
    let desc = group.desc_bytes();

    out.push(name.len() as u8);
    out.push((-(group.id() as i8)) as u8);
    out.extend_from_slice(&name);

    let at = out.len();
    let offset = 2 + 1 + desc.len();
    write_offset(out, offset, group.name(), processor)?;

    out.push(desc.len() as u8);
    out.extend_from_slice(desc);
    Ok(at)
}

fn write_param(out: &mut Vec<u8>, group_id: u8, param: &Param, processor: Processor) -> Result<usize> {
    let name = processor.encode_string(param.name());
    let desc = param.desc_bytes();
    let dims = param.dimensions();

    out.push(name.len() as u8);
    out.push(group_id);
    out.extend_from_slice(&name);

    let at = out.len();
    let offset = 2 + 2 + dims.len() + param.total_bytes() + 1 + desc.len();
    write_offset(out, offset, param.name(), processor)?;

    out.push(param.bytes_per_element() as u8);
    out.push(dims.len() as u8);
    out.extend_from_slice(dims);
    out.extend_from_slice(param.bytes());
    out.push(desc.len() as u8);
    out.extend_from_slice(desc);
    Ok(at)
}

fn write_offset(out: &mut Vec<u8>, offset: usize, name: &str, processor: Processor) -> Result<()> {
    let offset = i16::try_from(offset).map_err(|_| {
        C3dError::metadata(format!("record {name} is too large ({offset} bytes)"))
    })?;
    out.extend_from_slice(&processor.i16_bytes(offset));
    Ok(())
}
