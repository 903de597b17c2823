// Schema types for shapefile attribute tables
//
// A Schema is the ordered column list inferred from the attribute values of
// one write call. The identity field always comes first.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::codec::decimal::Decimal;
use crate::codec::types::{DbfField, DbfFieldType, FieldValue};
use crate::internal::error::{Error, Result};

/// Width cap of a dBASE column.
pub const MAX_WIDTH: usize = 254;
/// Decimal place cap of a dBASE numeric column.
pub const MAX_DECIMAL_PLACES: u32 = 15;

/// Column type of a schema field.
///
/// Widening runs Boolean -> Integer -> Decimal -> Text. Date and Memo only
/// ever widen to Text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Boolean,
    Integer,
    Decimal,
    Date,
    Text,
    Memo,
}

impl FieldKind {
    /// The kind a coerced value naturally belongs to. `Null` has none.
    pub fn of(value: &FieldValue) -> Option<FieldKind> {
        match value {
            FieldValue::Null => None,
            FieldValue::Logical(_) => Some(FieldKind::Boolean),
            FieldValue::Integer(_) => Some(FieldKind::Integer),
            FieldValue::Decimal(_) => Some(FieldKind::Decimal),
            FieldValue::Date(_) => Some(FieldKind::Date),
            FieldValue::Character(_) => Some(FieldKind::Text),
            FieldValue::Memo(_) => Some(FieldKind::Memo),
        }
    }

    pub fn dbf_type(self) -> DbfFieldType {
        match self {
            FieldKind::Boolean => DbfFieldType::Logical,
            FieldKind::Integer => DbfFieldType::Numeric,
            FieldKind::Decimal => DbfFieldType::Float,
            FieldKind::Date => DbfFieldType::Date,
            FieldKind::Text => DbfFieldType::Character,
            FieldKind::Memo => DbfFieldType::Memo,
        }
    }

    pub fn from_dbf_type(field_type: DbfFieldType, decimal_count: u8) -> FieldKind {
        match field_type {
            DbfFieldType::Logical => FieldKind::Boolean,
            DbfFieldType::Numeric if decimal_count == 0 => FieldKind::Integer,
            DbfFieldType::Numeric | DbfFieldType::Float => FieldKind::Decimal,
            DbfFieldType::Date => FieldKind::Date,
            DbfFieldType::Character => FieldKind::Text,
            DbfFieldType::Memo => FieldKind::Memo,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::Boolean => "Boolean",
            FieldKind::Integer => "Integer",
            FieldKind::Decimal => "Decimal",
            FieldKind::Date => "Date",
            FieldKind::Text => "Text",
            FieldKind::Memo => "Memo",
        };
        write!(f, "{}", label)
    }
}

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Rendered width including the safety margin.
    pub width: usize,
    /// Only present for Decimal fields.
    pub decimal_places: Option<u32>,
    /// True while every value folded into the field has been 0 or 1.
    #[serde(skip)]
    pub(crate) zero_or_one_only: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, width: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            width: width.min(MAX_WIDTH),
            decimal_places: None,
            zero_or_one_only: true,
        }
    }

    /// The dBASE column this field is stored as, under `column_name`.
    ///
    /// Logical and Date columns have fixed on-disk sizes; the schema width
    /// is kept as the rendered width.
    pub fn to_dbf_field(&self, column_name: &str) -> DbfField {
        let (length, decimal_count) = match self.kind {
            FieldKind::Boolean => (1, 0),
            FieldKind::Date => (8, 0),
            FieldKind::Decimal => {
                let places = self.decimal_places.unwrap_or(0).min(MAX_DECIMAL_PLACES);
                let width = self.width.max(places as usize + 2).min(MAX_WIDTH);
                (width, places.min(width.saturating_sub(2) as u32))
            }
            _ => (self.width.clamp(1, MAX_WIDTH), 0),
        };
        DbfField {
            name: column_name.to_string(),
            field_type: self.kind.dbf_type(),
            length: length as u8,
            decimal_count: decimal_count as u8,
        }
    }

    /// Builds a descriptor describing a column read from disk.
    pub fn from_dbf_field(field: &DbfField) -> Self {
        let kind = FieldKind::from_dbf_type(field.field_type, field.decimal_count);
        let mut descriptor = FieldDescriptor::new(field.name.clone(), kind, field.length as usize);
        if kind == FieldKind::Decimal {
            descriptor.decimal_places = Some(field.decimal_count as u32);
        }
        descriptor
    }
}

/// Ordered mapping from field name to descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: IndexMap<String, FieldDescriptor>,
}

impl Schema {
    /// A schema holding only the identity field, as a Text column.
    pub fn with_identity(name: &str, width: usize) -> Self {
        let mut fields = IndexMap::new();
        let mut identity = FieldDescriptor::new(name, FieldKind::Text, width);
        identity.zero_or_one_only = false;
        fields.insert(name.to_string(), identity);
        Schema { fields }
    }

    pub fn identity(&self) -> Option<&FieldDescriptor> {
        self.fields.values().next()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut FieldDescriptor> {
        self.fields.get_mut(name)
    }

    pub(crate) fn insert(&mut self, descriptor: FieldDescriptor) {
        self.fields.insert(descriptor.name.clone(), descriptor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }
}

/// Field values of one object, keyed by field name in first-seen order.
pub type AttributeRecord = IndexMap<String, FieldValue>;

/// Restates `value` in the form stored by a column of `descriptor`'s kind.
///
/// This is how values folded in before a field widened are brought in line
/// with its final type: integers become decimals in a Decimal field and
/// everything becomes its rendered text in a Text field.
pub fn conform_to(value: &FieldValue, descriptor: &FieldDescriptor) -> Result<FieldValue> {
    let conformed = match (descriptor.kind, value) {
        (_, FieldValue::Null) => FieldValue::Null,
        (FieldKind::Text, FieldValue::Character(_)) => value.clone(),
        (FieldKind::Text, other) => FieldValue::Character(other.render()),
        (FieldKind::Memo, other) => FieldValue::Memo(other.render()),
        (FieldKind::Boolean, FieldValue::Logical(_)) => value.clone(),
        (FieldKind::Boolean, FieldValue::Integer(i)) if *i == 0 || *i == 1 => {
            FieldValue::Logical(*i == 1)
        }
        (FieldKind::Boolean, FieldValue::Decimal(d)) if d.is_zero() || d.is_one() => {
            FieldValue::Logical(d.is_one())
        }
        (FieldKind::Integer, FieldValue::Integer(_)) => value.clone(),
        (FieldKind::Integer, FieldValue::Logical(b)) => FieldValue::Integer(*b as i64),
        (FieldKind::Decimal, FieldValue::Decimal(_)) => value.clone(),
        (FieldKind::Decimal, FieldValue::Integer(i)) => FieldValue::Decimal(Decimal::from_i64(*i)),
        (FieldKind::Decimal, FieldValue::Logical(b)) => {
            FieldValue::Decimal(Decimal::from_i64(*b as i64))
        }
        (FieldKind::Date, FieldValue::Date(_)) => value.clone(),
        (kind, other) => {
            return Err(Error::SchemaError(format!(
                "Value {:?} does not fit {} field '{}'",
                other, kind, descriptor.name
            )))
        }
    };
    Ok(conformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_identity_field_comes_first() {
        let schema = Schema::with_identity("object_id", 38);
        assert_eq!(schema.len(), 1);
        let identity = schema.identity().unwrap();
        assert_eq!(identity.name, "object_id");
        assert_eq!(identity.kind, FieldKind::Text);
        assert_eq!(identity.width, 38);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut schema = Schema::with_identity("id", 10);
        schema.insert(FieldDescriptor::new("zeta", FieldKind::Integer, 3));
        schema.insert(FieldDescriptor::new("alpha", FieldKind::Text, 3));
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["id", "zeta", "alpha"]);
    }

    #[test]
    fn test_dbf_field_mapping() {
        let mut d = FieldDescriptor::new("len", FieldKind::Decimal, 7);
        d.decimal_places = Some(3);
        let f = d.to_dbf_field("len");
        assert_eq!((f.field_type, f.length, f.decimal_count), (DbfFieldType::Float, 7, 3));

        let b = FieldDescriptor::new("flag", FieldKind::Boolean, 6).to_dbf_field("flag");
        assert_eq!((b.field_type, b.length), (DbfFieldType::Logical, 1));

        let t = FieldDescriptor::new("t", FieldKind::Text, 400).to_dbf_field("t");
        assert_eq!(t.length, 254);

        let back = FieldDescriptor::from_dbf_field(&f);
        assert_eq!(back.kind, FieldKind::Decimal);
        assert_eq!(back.decimal_places, Some(3));
    }

    #[test]
    fn test_conform_to_widened_kinds() {
        let text = FieldDescriptor::new("t", FieldKind::Text, 5);
        assert_eq!(
            conform_to(&FieldValue::Integer(12), &text).unwrap(),
            FieldValue::Character("12".into())
        );

        let dec = FieldDescriptor::new("d", FieldKind::Decimal, 5);
        assert_eq!(
            conform_to(&FieldValue::Integer(2), &dec).unwrap(),
            FieldValue::Decimal(Decimal::from_i64(2))
        );

        let int = FieldDescriptor::new("i", FieldKind::Integer, 5);
        assert_eq!(conform_to(&FieldValue::Logical(true), &int).unwrap(), FieldValue::Integer(1));

        let boolean = FieldDescriptor::new("b", FieldKind::Boolean, 5);
        assert_eq!(conform_to(&FieldValue::Integer(0), &boolean).unwrap(), FieldValue::Logical(false));

        let date = FieldDescriptor::new("day", FieldKind::Date, 12);
        let day = NaiveDate::from_ymd_opt(2022, 5, 6).unwrap();
        assert!(conform_to(&FieldValue::Integer(3), &date).is_err());
        assert_eq!(conform_to(&FieldValue::Date(day), &date).unwrap(), FieldValue::Date(day));
    }
}
