use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codec::decimal::Decimal;
use crate::internal::error::{Error, Result};

/// Shape type codes stored in the .shp/.shx headers and in every record.
#[repr(i32)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ShapeType {
    Null = 0,
    Point = 1,
    PolyLine = 3,
    Polygon = 5,
    MultiPoint = 8,
    PointZ = 11,
    PolyLineZ = 13,
    PolygonZ = 15,
    MultiPointZ = 18,
    PointM = 21,
    PolyLineM = 23,
    PolygonM = 25,
    MultiPointM = 28,
}

impl ShapeType {
    pub const ALL: [ShapeType; 13] = [
        ShapeType::Null,
        ShapeType::Point,
        ShapeType::PolyLine,
        ShapeType::Polygon,
        ShapeType::MultiPoint,
        ShapeType::PointZ,
        ShapeType::PolyLineZ,
        ShapeType::PolygonZ,
        ShapeType::MultiPointZ,
        ShapeType::PointM,
        ShapeType::PolyLineM,
        ShapeType::PolygonM,
        ShapeType::MultiPointM,
    ];

    /// Converts a stored shape type code into a ShapeType.
    pub fn from_i32(code: i32) -> Option<Self> {
        ShapeType::ALL.iter().copied().find(|t| *t as i32 == code)
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Upper-case label, e.g. `POLYLINEZ`.
    pub fn name(self) -> &'static str {
        match self {
            ShapeType::Null => "NULL",
            ShapeType::Point => "POINT",
            ShapeType::PolyLine => "POLYLINE",
            ShapeType::Polygon => "POLYGON",
            ShapeType::MultiPoint => "MULTIPOINT",
            ShapeType::PointZ => "POINTZ",
            ShapeType::PolyLineZ => "POLYLINEZ",
            ShapeType::PolygonZ => "POLYGONZ",
            ShapeType::MultiPointZ => "MULTIPOINTZ",
            ShapeType::PointM => "POINTM",
            ShapeType::PolyLineM => "POLYLINEM",
            ShapeType::PolygonM => "POLYGONM",
            ShapeType::MultiPointM => "MULTIPOINTM",
        }
    }

    pub fn has_z(self) -> bool {
        matches!(
            self,
            ShapeType::PointZ | ShapeType::PolyLineZ | ShapeType::PolygonZ | ShapeType::MultiPointZ
        )
    }

    /// Z types carry measures too.
    pub fn has_m(self) -> bool {
        self.has_z()
            || matches!(
                self,
                ShapeType::PointM | ShapeType::PolyLineM | ShapeType::PolygonM | ShapeType::MultiPointM
            )
    }

    pub fn is_point(self) -> bool {
        matches!(self, ShapeType::Point | ShapeType::PointZ | ShapeType::PointM)
    }

    pub fn is_multipoint(self) -> bool {
        matches!(
            self,
            ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM
        )
    }

    /// PolyLine and Polygon families, the only types with a parts table.
    pub fn has_parts(self) -> bool {
        matches!(
            self,
            ShapeType::PolyLine
                | ShapeType::Polygon
                | ShapeType::PolyLineZ
                | ShapeType::PolygonZ
                | ShapeType::PolyLineM
                | ShapeType::PolygonM
        )
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ShapeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        ShapeType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| Error::InputError(format!("Unsupported shape type: {}", s)))
    }
}

/// A vertex. `z` and `m` are only persisted for Z/M shape types.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub m: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y, z: 0.0, m: 0.0 }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z, m: 0.0 }
    }
}

/// Extent of a set of points. All ranges are zero until a point is added.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub m_min: f64,
    pub m_max: f64,
    empty: bool,
}

impl BoundingBox {
    pub fn new() -> Self {
        BoundingBox {
            empty: true,
            ..Default::default()
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Self {
        let mut bbox = BoundingBox::new();
        for point in points {
            bbox.extend(point);
        }
        bbox
    }

    pub(crate) fn from_ranges(xy: [f64; 4], z: [f64; 2], m: [f64; 2]) -> Self {
        BoundingBox {
            x_min: xy[0],
            y_min: xy[1],
            x_max: xy[2],
            y_max: xy[3],
            z_min: z[0],
            z_max: z[1],
            m_min: m[0],
            m_max: m[1],
            empty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn extend(&mut self, point: &Point) {
        if self.empty {
            *self = BoundingBox::from_ranges(
                [point.x, point.y, point.x, point.y],
                [point.z, point.z],
                [point.m, point.m],
            );
            return;
        }
        self.x_min = self.x_min.min(point.x);
        self.y_min = self.y_min.min(point.y);
        self.x_max = self.x_max.max(point.x);
        self.y_max = self.y_max.max(point.y);
        self.z_min = self.z_min.min(point.z);
        self.z_max = self.z_max.max(point.z);
        self.m_min = self.m_min.min(point.m);
        self.m_max = self.m_max.max(point.m);
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.empty {
            return;
        }
        if self.empty {
            *self = *other;
            return;
        }
        self.extend(&Point { x: other.x_min, y: other.y_min, z: other.z_min, m: other.m_min });
        self.extend(&Point { x: other.x_max, y: other.y_max, z: other.z_max, m: other.m_max });
    }

    /// `[x_min, y_min, x_max, y_max]`
    pub fn xy(&self) -> [f64; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

/// One geometry record: a shape type, a parts table and the points.
///
/// `parts` holds the index of the first point of each part. Point and
/// MultiPoint shapes have an empty parts table.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub shape_type: ShapeType,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
}

impl Shape {
    pub fn null() -> Self {
        Shape { shape_type: ShapeType::Null, parts: Vec::new(), points: Vec::new() }
    }

    /// Builds a shape of `shape_type` from a list of point runs.
    pub fn from_parts(shape_type: ShapeType, runs: &[Vec<Point>]) -> Self {
        let mut parts = Vec::new();
        let mut points = Vec::new();
        for run in runs {
            if shape_type.has_parts() {
                parts.push(points.len() as i32);
            }
            points.extend_from_slice(run);
        }
        Shape { shape_type, parts, points }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// A shape is single-part when it has at most one part.
    pub fn is_single_part(&self) -> bool {
        self.parts.len() <= 1
    }

    /// Point ranges of each part. The last part runs to the end of the
    /// points array. Offsets that are out of range or decreasing are clamped.
    pub fn part_ranges(&self) -> Vec<Range<usize>> {
        if self.parts.is_empty() {
            return vec![0..self.points.len()];
        }
        let total = self.points.len();
        let starts: Vec<usize> = self
            .parts
            .iter()
            .map(|p| (*p).max(0) as usize)
            .map(|p| p.min(total))
            .collect();
        starts
            .iter()
            .enumerate()
            .map(|(i, start)| {
                let end = starts.get(i + 1).copied().unwrap_or(total).max(*start);
                *start..end
            })
            .collect()
    }
}

/// dBASE column type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbfFieldType {
    Character,
    Numeric,
    Float,
    Logical,
    Date,
    Memo,
}

impl DbfFieldType {
    pub fn code(self) -> u8 {
        match self {
            DbfFieldType::Character => b'C',
            DbfFieldType::Numeric => b'N',
            DbfFieldType::Float => b'F',
            DbfFieldType::Logical => b'L',
            DbfFieldType::Date => b'D',
            DbfFieldType::Memo => b'M',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code.to_ascii_uppercase() {
            b'C' => Some(DbfFieldType::Character),
            b'N' => Some(DbfFieldType::Numeric),
            b'F' => Some(DbfFieldType::Float),
            b'L' => Some(DbfFieldType::Logical),
            b'D' => Some(DbfFieldType::Date),
            b'M' => Some(DbfFieldType::Memo),
            _ => None,
        }
    }
}

/// A column as declared in the .dbf header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbfField {
    pub name: String,
    pub field_type: DbfFieldType,
    pub length: u8,
    pub decimal_count: u8,
}

/// A single attribute value, as coerced for writing or as read back.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Logical(bool),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    Character(String),
    Memo(String),
}

impl FieldValue {
    /// Loose 0/1 test: booleans count, as do numerics equal to 0 or 1.
    pub fn is_zero_or_one(&self) -> bool {
        match self {
            FieldValue::Logical(_) => true,
            FieldValue::Integer(i) => *i == 0 || *i == 1,
            FieldValue::Decimal(d) => d.is_zero() || d.is_one(),
            _ => false,
        }
    }

    /// Text form used for width accounting and for text columns.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Logical(true) => "True".to_string(),
            FieldValue::Logical(false) => "False".to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            FieldValue::Character(s) | FieldValue::Memo(s) => s.clone(),
        }
    }

    /// JSON form: numbers stay numbers, dates become `YYYY-MM-DD` strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Logical(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Decimal(d) => match d.to_i64() {
                Some(i) => Value::from(i),
                None => serde_json::Number::from_f64(d.to_f64()).map_or(Value::Null, Value::Number),
            },
            _ => Value::String(self.render()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Character encoding of .dbf text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "latin-1")]
    Latin1,
}

impl Encoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| if (c as u32) <= 0xFF { c as u32 as u8 } else { b'?' })
                .collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|b| *b as char).collect(),
        }
    }

    /// Encodes `text`, cut to at most `max_len` bytes without splitting a character.
    pub fn encode_truncated(self, text: &str, max_len: usize) -> Vec<u8> {
        match self {
            Encoding::Utf8 => {
                let mut end = text.len().min(max_len);
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.as_bytes()[..end].to_vec()
            }
            Encoding::Latin1 => {
                let mut bytes = self.encode(text);
                bytes.truncate(max_len);
                bytes
            }
        }
    }

    /// Length of `text` once encoded.
    pub fn encoded_len(self, text: &str) -> usize {
        match self {
            Encoding::Utf8 => text.len(),
            Encoding::Latin1 => text.chars().count(),
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "utf8" => Ok(Encoding::Utf8),
            "latin1" | "iso88591" => Ok(Encoding::Latin1),
            _ => Err(Error::InputError(format!("Unsupported encoding: {}", label))),
        }
    }
}
