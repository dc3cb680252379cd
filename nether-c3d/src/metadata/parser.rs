//! Parameter record parsing

use super::{MetadataStore, Param, normalize_name};
use crate::error::{C3dError, Result};
use crate::processor::Processor;

/// Walk the record chain until a terminator, an offset of zero or the end
pub(crate) fn parse_records(records: &[u8], processor: Processor) -> Result<MetadataStore> {
    let mut store = MetadataStore::new(processor);
    let mut pos = 0;

    while pos + 2 <= records.len() {
        let name_len = records[pos] as i8;
        let group_id = records[pos + 1] as i8;
        pos += 2;

        if name_len == 0 || group_id == 0 {
            break;
        }

        let name_bytes = slice(records, pos, name_len.unsigned_abs() as usize, "record name")?;
        pos += name_bytes.len();
        let name = normalize_name(&processor.decode_string(name_bytes))
            .map_err(|_| C3dError::metadata(format!("unreadable record name at byte {pos}")))?;

        let offset_bytes = slice(records, pos, 2, "record offset")?;
        let offset = processor.read_i16([offset_bytes[0], offset_bytes[1]]);
        pos += 2;

        let last = offset == 0;
        let payload = if last {
            &records[pos..]
        } else {
            if offset < 2 {
                return Err(C3dError::metadata(format!(
                    "record {name} has invalid offset {offset}"
                )));
            }
            slice(records, pos, offset as usize - 2, "record payload")?
        };
        pos += payload.len();

        if group_id < 0 {
            let desc = read_desc(payload, 0);
            store.define_group(group_id.unsigned_abs(), name, desc)?;
        } else {
            let param = parse_param(payload, &name, processor)?;
            store.ensure_group(group_id as u8).set_param(param);
        }

        if last {
            break;
        }
    }

    for group in store.groups() {
        if group.name().is_empty() {
            log::warn!(
                "Parameter group {} has parameters but no definition record",
                group.id()
            );
        }
    }

    Ok(store)
}

/// `[width][ndims][dims..][data][desc_len][desc]`
fn parse_param(payload: &[u8], name: &str, processor: Processor) -> Result<Param> {
    let header = slice(payload, 0, 2, "parameter header")?;
    let width = header[0] as i8;
    let ndims = header[1] as usize;
    let dimensions = slice(payload, 2, ndims, "parameter dimensions")?.to_vec();

    let count: usize = dimensions.iter().map(|&d| d as usize).product();
    let data_len = count * width.unsigned_abs() as usize;
    let data_start = 2 + ndims;
    let data = slice(payload, data_start, data_len, "parameter data")?.to_vec();

    let mut param = Param::new(name, "", width, dimensions, data, processor)
        .map_err(|e| C3dError::metadata(format!("parameter {name}: {e}")))?;
    param.set_desc_bytes(read_desc(payload, data_start + data_len));
    Ok(param)
}

/// Length-prefixed description bytes; a missing or short description is tolerated
fn read_desc(payload: &[u8], at: usize) -> Vec<u8> {
    let Some(&len) = payload.get(at) else {
        return Vec::new();
    };
    let start = at + 1;
    let end = (start + len as usize).min(payload.len());
    payload.get(start..end).map(<[u8]>::to_vec).unwrap_or_default()
}

fn slice<'a>(bytes: &'a [u8], start: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    bytes.get(start..start + len).ok_or_else(|| {
        C3dError::metadata(format!(
            "{what} at byte {start} needs {len} bytes, section has {}",
            bytes.len().saturating_sub(start)
        ))
    })
}
