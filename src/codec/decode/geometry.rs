use bytes::{Buf, Bytes};

use crate::codec::types::{Point, Shape, ShapeType};
use crate::internal::error::{Error, Result};

fn need(buf: &Bytes, len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(Error::CodecError(format!(
            "Incomplete data for {}. Expected {} bytes, got {}",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_count(buf: &mut Bytes, what: &str) -> Result<usize> {
    let count = buf.get_i32_le();
    usize::try_from(count)
        .map_err(|_| Error::CodecError(format!("Negative {} count: {}", what, count)))
}

/// Decodes the content of one .shp record.
///
/// Measures are optional in the format, so M data is read only when bytes for
/// it remain; missing measures stay 0.
pub fn decode_shape(mut buf: Bytes) -> Result<Shape> {
    need(&buf, 4, "shape type")?;
    let code = buf.get_i32_le();
    let shape_type = ShapeType::from_i32(code)
        .ok_or_else(|| Error::CodecError(format!("Unsupported shape type code: {}", code)))?;

    if shape_type == ShapeType::Null {
        return Ok(Shape::null());
    }

    if shape_type.is_point() {
        need(&buf, 16, "point coordinates")?;
        let mut point = Point::new(buf.get_f64_le(), buf.get_f64_le());
        if shape_type.has_z() {
            need(&buf, 8, "point z")?;
            point.z = buf.get_f64_le();
        }
        if shape_type.has_m() && buf.remaining() >= 8 {
            point.m = buf.get_f64_le();
        }
        return Ok(Shape { shape_type, parts: Vec::new(), points: vec![point] });
    }

    // bbox is recomputed from the points on demand
    need(&buf, 32, "bounding box")?;
    buf.advance(32);

    let num_parts = if shape_type.has_parts() {
        need(&buf, 4, "part count")?;
        read_count(&mut buf, "part")?
    } else {
        0
    };
    need(&buf, 4, "point count")?;
    let num_points = read_count(&mut buf, "point")?;

    need(&buf, num_parts.saturating_mul(4), "parts table")?;
    let parts: Vec<i32> = (0..num_parts).map(|_| buf.get_i32_le()).collect();

    need(&buf, num_points.saturating_mul(16), "points")?;
    let mut points: Vec<Point> = (0..num_points)
        .map(|_| Point::new(buf.get_f64_le(), buf.get_f64_le()))
        .collect();

    let values_len = 16 + num_points.saturating_mul(8);
    if shape_type.has_z() {
        need(&buf, values_len, "z values")?;
        buf.advance(16);
        for point in points.iter_mut() {
            point.z = buf.get_f64_le();
        }
    }
    if shape_type.has_m() && buf.remaining() >= values_len {
        buf.advance(16);
        for point in points.iter_mut() {
            point.m = buf.get_f64_le();
        }
    }

    Ok(Shape { shape_type, parts, points })
}
