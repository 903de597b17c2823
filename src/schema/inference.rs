// Schema inference for shapefile attribute tables
//
// Folds coerced (field, value, kind) observations into one column descriptor
// per field. Conflicting kinds are unified by a fixed precedence: the 0/1
// boolean-integer exception, then widening an integer column to decimal,
// then permanent demotion to text.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codec::decimal::Decimal;
use crate::codec::types::{Encoding, FieldValue};
use crate::schema::types::{FieldDescriptor, FieldKind, Schema, MAX_DECIMAL_PLACES, MAX_WIDTH};

/// Configuration for schema inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Characters added to every observed width
    pub extra_chars: usize,

    /// Size columns from the observed values; otherwise every column gets
    /// `field_size` and decimals get `num_dp` places
    pub min_sizes: bool,

    /// Fixed column width when `min_sizes` is off
    pub field_size: usize,

    /// Fixed decimal places when `min_sizes` is off
    pub num_dp: u32,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            extra_chars: 2,
            min_sizes: true,
            field_size: 30,
            num_dp: 10,
        }
    }
}

/// Owns a schema while it is being inferred.
#[derive(Debug, Clone)]
pub struct SchemaUnifier {
    options: SchemaOptions,
    encoding: Encoding,
    schema: Schema,
}

impl SchemaUnifier {
    /// Creates a unifier over `schema` with default configuration
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, SchemaOptions::default())
    }

    /// Creates a unifier over `schema` with custom configuration
    pub fn with_config(schema: Schema, options: SchemaOptions) -> Self {
        Self { options, encoding: Encoding::default(), schema }
    }

    /// Widths are measured in bytes of `encoding`.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Folds one observation of `name` into the schema.
    pub fn fold(&mut self, name: &str, value: &FieldValue, kind: FieldKind) -> &Schema {
        let fixed_width = (self.options.field_size + self.options.extra_chars).min(MAX_WIDTH);
        let rendered = self.rendered_width(value, None);

        if !self.schema.contains(name) {
            let width = if self.options.min_sizes { rendered } else { fixed_width };
            let mut field = FieldDescriptor::new(name, kind, width);
            if kind == FieldKind::Decimal {
                field.decimal_places = Some(if self.options.min_sizes {
                    places_required(value)
                } else {
                    self.options.num_dp.min(MAX_DECIMAL_PLACES)
                });
            }
            field.zero_or_one_only = value.is_zero_or_one();
            debug!("New field '{}': {} width {}", name, kind, field.width);
            self.schema.insert(field);
            return &self.schema;
        }
        let field = match self.schema.get_mut(name) {
            Some(field) => field,
            None => return &self.schema,
        };

        let min_sizes = self.options.min_sizes;
        let extra_chars = self.options.extra_chars;
        let encoding = self.encoding;

        if kind != field.kind {
            let keep_kind = (value.is_zero_or_one() && field.kind == FieldKind::Boolean)
                || (kind == FieldKind::Boolean
                    && field.kind == FieldKind::Integer
                    && field.zero_or_one_only);

            if keep_kind {
                // compatible, the column keeps its type
            } else if kind == FieldKind::Decimal && field.kind == FieldKind::Integer {
                let places = if min_sizes {
                    places_required(value)
                } else {
                    self.options.num_dp.min(MAX_DECIMAL_PLACES)
                };
                debug!("Field '{}' widened from Integer to Decimal ({} places)", name, places);
                field.kind = FieldKind::Decimal;
                field.decimal_places = Some(places);
                if min_sizes && places > 0 {
                    // earlier integers gain a radix point and `places` digits
                    field.width = (field.width + places as usize + 1).min(MAX_WIDTH);
                }
            } else if field.kind != FieldKind::Text {
                debug!("Field '{}' demoted from {} to Text by a {} value", name, field.kind, kind);
                field.kind = FieldKind::Text;
                field.decimal_places = None;
            }
        }

        if min_sizes {
            if field.kind == FieldKind::Decimal && kind == FieldKind::Decimal {
                let current = field.decimal_places.unwrap_or(0);
                let required = places_required(value);
                if required > current {
                    field.width = (field.width + (required - current) as usize).min(MAX_WIDTH);
                    field.decimal_places = Some(required);
                }
            }
            let needed = rendered_width(encoding, extra_chars, value, field_places(field));
            field.width = field.width.max(needed).min(MAX_WIDTH);
        }

        field.zero_or_one_only &= value.is_zero_or_one();
        &self.schema
    }

    fn rendered_width(&self, value: &FieldValue, places: Option<u32>) -> usize {
        rendered_width(self.encoding, self.options.extra_chars, value, places)
    }
}

/// Folds one observation into an owned schema and returns it.
pub fn fold(schema: Schema, name: &str, value: &FieldValue, kind: FieldKind, options: &SchemaOptions) -> Schema {
    let mut unifier = SchemaUnifier::with_config(schema, options.clone());
    unifier.fold(name, value, kind);
    unifier.into_schema()
}

fn field_places(field: &FieldDescriptor) -> Option<u32> {
    match field.kind {
        FieldKind::Decimal => field.decimal_places,
        _ => None,
    }
}

/// Fractional digits a value needs, capped at the format limit.
pub fn places_required(value: &FieldValue) -> u32 {
    match value {
        FieldValue::Decimal(d) => d.scale().min(MAX_DECIMAL_PLACES),
        _ => 0,
    }
}

/// Width of `value` plus the margin. For decimal columns the fixed-place
/// rendering counts as well as the natural one.
fn rendered_width(encoding: Encoding, extra_chars: usize, value: &FieldValue, places: Option<u32>) -> usize {
    let natural = encoding.encoded_len(&value.render());
    let fixed = match (value, places) {
        (FieldValue::Decimal(d), Some(p)) => d.to_fixed(p).len(),
        (FieldValue::Integer(i), Some(p)) => Decimal::from_i64(*i).to_fixed(p).len(),
        _ => 0,
    };
    natural.max(fixed) + extra_chars
}
