//! Versioned persistence of node state.
//!
//! Only configuration and learned state are persisted: parameter payloads,
//! input row counts, delay settings. Wiring, minibatch data and gradients
//! are not. A node writes its operation tag and name followed by a
//! kind-specific payload; on load the container is expected to have
//! consumed the tag and name already (matching nodes to a stored stream),
//! so [`load_state`] reads the payload only.
//!
//! The format is little-endian throughout. Readers accept every version up
//! to [`CURRENT_MODEL_VERSION`]; fields introduced later than the stored
//! version keep their defaults.

use std::io::{Read, Write};

use crate::error::TempoGraphError;
use crate::graph::ComputationGraph;
use crate::matrix::Matrix;
use crate::node::NodeId;
use crate::ops::OpKind;

/// First released model format.
pub const MODEL_VERSION_1: u32 = 1;
/// Adds the parameter update flag and the configurable delay depth.
pub const MODEL_VERSION_2: u32 = 2;
/// Version written by [`save_state`].
pub const CURRENT_MODEL_VERSION: u32 = MODEL_VERSION_2;

const MAX_NAME_BYTES: u32 = 1 << 20;
const MAX_PARAMETER_ELEMENTS: usize = 1 << 28;

fn io_err(e: std::io::Error) -> TempoGraphError {
    TempoGraphError::Serialization(e.to_string())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<(), TempoGraphError> {
    w.write_all(&v.to_le_bytes()).map_err(io_err)
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<(), TempoGraphError> {
    w.write_all(&v.to_le_bytes()).map_err(io_err)
}

fn write_f32<W: Write>(w: &mut W, v: f32) -> Result<(), TempoGraphError> {
    w.write_all(&v.to_le_bytes()).map_err(io_err)
}

fn write_bool<W: Write>(w: &mut W, v: bool) -> Result<(), TempoGraphError> {
    w.write_all(&[u8::from(v)]).map_err(io_err)
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), TempoGraphError> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes()).map_err(io_err)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, TempoGraphError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, TempoGraphError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32, TempoGraphError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_bool<R: Read>(r: &mut R) -> Result<bool, TempoGraphError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf[0] != 0)
}

fn read_string<R: Read>(r: &mut R) -> Result<String, TempoGraphError> {
    let len = read_u32(r)?;
    if len > MAX_NAME_BYTES {
        return Err(TempoGraphError::Serialization(format!(
            "string of {len} bytes exceeds the format limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).map_err(io_err)?;
    String::from_utf8(buf).map_err(|e| TempoGraphError::Serialization(e.to_string()))
}

fn check_version(version: u32) -> Result<(), TempoGraphError> {
    if version == 0 || version > CURRENT_MODEL_VERSION {
        return Err(TempoGraphError::Serialization(format!(
            "model version {version} is outside the supported range 1..={CURRENT_MODEL_VERSION}"
        )));
    }
    Ok(())
}

/// Writes the node's operation tag and name followed by its kind-specific
/// payload, in the current format.
///
/// # Errors
///
/// [`TempoGraphError::Serialization`] on any write failure.
pub fn save_state<W: Write>(
    graph: &ComputationGraph,
    id: NodeId,
    w: &mut W,
) -> Result<(), TempoGraphError> {
    let node = graph.node(id);
    write_string(w, node.kind().name())?;
    write_string(w, node.name())?;
    match node.kind() {
        OpKind::Parameter {
            rows,
            cols,
            update_enabled,
        } => {
            write_u64(w, *rows as u64)?;
            write_u64(w, *cols as u64)?;
            write_bool(w, *update_enabled)?;
            for v in node.value().data() {
                write_f32(w, *v)?;
            }
            Ok(())
        }
        OpKind::Input { rows } => write_u64(w, *rows as u64),
        OpKind::PastValue {
            delay,
            initial_activation,
        } => {
            write_f32(w, *initial_activation)?;
            write_u64(w, *delay as u64)
        }
        _ => Ok(()),
    }
}

/// Reads the payload [`save_state`] wrote for this node's kind, assuming
/// the caller already consumed the tag and name. Fields newer than
/// `version` keep their defaults: a version-1 parameter loads with updates
/// enabled, a version-1 delay loads with a one-step lookback.
///
/// # Errors
///
/// [`TempoGraphError::Serialization`] for unsupported versions, truncated
/// payloads and malformed data.
pub fn load_state<R: Read>(
    graph: &mut ComputationGraph,
    id: NodeId,
    r: &mut R,
    version: u32,
) -> Result<(), TempoGraphError> {
    check_version(version)?;
    match graph.node(id).kind().clone() {
        OpKind::Parameter { .. } => {
            let rows = read_u64(r)? as usize;
            let cols = read_u64(r)? as usize;
            let update_enabled = if version >= MODEL_VERSION_2 {
                read_bool(r)?
            } else {
                true
            };
            let count = rows.saturating_mul(cols);
            if count > MAX_PARAMETER_ELEMENTS {
                return Err(TempoGraphError::Serialization(format!(
                    "parameter of {rows} x {cols} exceeds the format limit"
                )));
            }
            let mut data = Vec::with_capacity(count);
            for _ in 0..count {
                data.push(read_f32(r)?);
            }
            let value = Matrix::from_columns(rows, cols, data)?;
            graph.restore_parameter(id, value, update_enabled)
        }
        OpKind::Input { .. } => {
            let rows = read_u64(r)? as usize;
            graph.restore_input(id, rows)
        }
        OpKind::PastValue { .. } => {
            let initial_activation = read_f32(r)?;
            let delay = if version >= MODEL_VERSION_2 {
                read_u64(r)? as usize
            } else {
                1
            };
            graph.restore_past_value(id, delay, initial_activation)
        }
        _ => Ok(()),
    }
}

/// Consumes the tag and name header written by [`save_state`]. Container
/// code uses this to match stored node records against a live graph before
/// handing the payload to [`load_state`].
pub fn read_tag_and_name<R: Read>(r: &mut R) -> Result<(String, String), TempoGraphError> {
    let tag = read_string(r)?;
    let name = read_string(r)?;
    Ok((tag, name))
}
