use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::types::{Shape, ShapeType};
use crate::internal::error::{Error, Result};

/// Encodes the content part of a .shp record (everything after the
/// 8-byte record header) for a file of type `shape_type`.
pub fn encode_shape(shape: &Shape, shape_type: ShapeType) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(content_length(shape, shape_type));

    if shape.shape_type == ShapeType::Null || shape_type == ShapeType::Null {
        buf.put_i32_le(ShapeType::Null.to_i32());
        return Ok(buf.freeze());
    }
    buf.put_i32_le(shape_type.to_i32());

    if shape_type.is_point() {
        let point = match shape.points.as_slice() {
            [point] => point,
            other => {
                return Err(Error::GeometryError(format!(
                    "{} record needs exactly one point, got {}",
                    shape_type,
                    other.len()
                )))
            }
        };
        buf.put_f64_le(point.x);
        buf.put_f64_le(point.y);
        if shape_type.has_z() {
            buf.put_f64_le(point.z);
        }
        if shape_type.has_m() {
            buf.put_f64_le(point.m);
        }
        return Ok(buf.freeze());
    }

    let bbox = shape.bbox();
    for v in bbox.xy() {
        buf.put_f64_le(v);
    }
    if shape_type.has_parts() {
        buf.put_i32_le(shape.parts.len() as i32);
    }
    buf.put_i32_le(shape.points.len() as i32);
    if shape_type.has_parts() {
        for part in &shape.parts {
            buf.put_i32_le(*part);
        }
    }
    for point in &shape.points {
        buf.put_f64_le(point.x);
        buf.put_f64_le(point.y);
    }
    if shape_type.has_z() {
        buf.put_f64_le(bbox.z_min);
        buf.put_f64_le(bbox.z_max);
        for point in &shape.points {
            buf.put_f64_le(point.z);
        }
    }
    if shape_type.has_m() {
        buf.put_f64_le(bbox.m_min);
        buf.put_f64_le(bbox.m_max);
        for point in &shape.points {
            buf.put_f64_le(point.m);
        }
    }
    Ok(buf.freeze())
}

/// Byte length of the record content `encode_shape` produces.
pub fn content_length(shape: &Shape, shape_type: ShapeType) -> usize {
    if shape.shape_type == ShapeType::Null || shape_type == ShapeType::Null {
        return 4;
    }
    let n = shape.points.len();
    let mut len = 4;
    if shape_type.is_point() {
        len += 16;
        if shape_type.has_z() {
            len += 8;
        }
        if shape_type.has_m() {
            len += 8;
        }
        return len;
    }
    len += 32 + 4 + 16 * n;
    if shape_type.has_parts() {
        len += 4 + 4 * shape.parts.len();
    }
    if shape_type.has_z() {
        len += 16 + 8 * n;
    }
    if shape_type.has_m() {
        len += 16 + 8 * n;
    }
    len
}
