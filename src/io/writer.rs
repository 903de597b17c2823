// Shapefile writer
//
// Turns a collection of host objects into a shapefile set. All attribute
// values are coerced and the schema inferred before any file is opened, so
// every input error surfaces before the first byte is written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::encode::dbf::{validate_fields, MAX_FIELD_NAME_LEN};
use crate::codec::encode::ShapefileEncoder;
use crate::codec::paths::ShapefilePaths;
use crate::codec::types::{DbfField, Encoding, FieldValue, Point, Shape, ShapeType};
use crate::internal::error::{Error, Result};
use crate::io::filename::FilenameResolver;
use crate::io::lifecycle::delete_file;
use crate::io::source::{KeyMatcher, ShapeSource};
use crate::options::ShpOptions;
use crate::schema::coerce::TypeCoercer;
use crate::schema::inference::{SchemaOptions, SchemaUnifier};
use crate::schema::types::{conform_to, AttributeRecord, FieldDescriptor, FieldKind, Schema};

/// Configuration for writing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Name of the reserved identity column, always the first column
    pub identity_field: String,

    /// Expected identity string length, before the safety margin
    pub identity_width: usize,

    /// Text encoding of the .dbf file
    pub encoding: Encoding,

    /// Fixed attribute columns. When set, no schema is inferred: only keys
    /// naming one of these fields are written, and every value must fit
    /// its column.
    pub fields: Option<Vec<FieldDescriptor>>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            identity_field: "object_id".to_string(),
            identity_width: 36,
            encoding: Encoding::Utf8,
            fields: None,
        }
    }
}

/// What a successful write persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// The .shp path actually written, after collision handling
    pub path: PathBuf,
    pub schema: Schema,
    /// One record per written row, conformed to the final column types
    pub records: Vec<AttributeRecord>,
}

struct PendingRow {
    identity: String,
    record: AttributeRecord,
    // text that date values were parsed from, by field
    date_text: HashMap<String, String>,
    runs: Vec<Vec<Point>>,
}

/// Writes host objects to a shapefile set.
#[derive(Debug, Clone)]
pub struct ShapefileWriter {
    coercer: TypeCoercer,
    schema_options: SchemaOptions,
    resolver: FilenameResolver,
    options: WriteOptions,
}

impl ShapefileWriter {
    /// Creates a writer with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(&ShpOptions::default())
    }

    /// Creates a writer with custom configuration
    pub fn with_config(options: &ShpOptions) -> Result<Self> {
        Ok(Self {
            coercer: TypeCoercer::with_config(options.coerce.clone())?,
            schema_options: options.schema.clone(),
            resolver: FilenameResolver::with_config(options.filename.clone()),
            options: options.write.clone(),
        })
    }

    /// Writes `objects` as records of `shape_type` to `output_path`.
    ///
    /// Attribute keys are selected and renamed by `matcher`. Objects whose
    /// geometry flattens to nothing contribute to the schema but get no row.
    pub fn write<S: ShapeSource>(
        &self,
        objects: &[S::Object],
        output_path: impl AsRef<Path>,
        shape_type: ShapeType,
        source: &S,
        matcher: &KeyMatcher,
    ) -> Result<WriteOutcome> {
        let desired = check_output_path(output_path.as_ref())?;
        if shape_type == ShapeType::Null {
            error!("Refusing to write a NULL shapefile: {}", desired.display());
            return Err(Error::InputError("Cannot write records of shape type NULL".to_string()));
        }

        let (schema, rows) = self.collect_rows(objects, shape_type, source, matcher)?;
        debug!("Schema for {}: {:?}", desired.display(), schema);

        let encoding = self.options.encoding;
        let columns = self.columns(&schema)?;
        let final_path = self.resolver.resolve(&desired);
        let paths = ShapefilePaths::from_path(&final_path);

        let records = match self.write_rows(&paths, shape_type, &schema, columns, rows, encoding) {
            Ok(records) => records,
            Err(e) => {
                error!("Writing {} failed: {}", final_path.display(), e);
                for path in [paths.shp(), paths.shx(), paths.dbf()] {
                    delete_file(&path);
                }
                return Err(e);
            }
        };

        info!("Wrote {} records to {}", records.len(), final_path.display());
        Ok(WriteOutcome { path: final_path, schema, records })
    }

    /// Coerces every attribute, infers the schema and flattens every geometry.
    fn collect_rows<S: ShapeSource>(
        &self,
        objects: &[S::Object],
        shape_type: ShapeType,
        source: &S,
        matcher: &KeyMatcher,
    ) -> Result<(Schema, Vec<PendingRow>)> {
        let identity_field = self.options.identity_field.as_str();
        let identity_width = self.options.identity_width + self.schema_options.extra_chars;
        let mut schema = Schema::with_identity(identity_field, identity_width);
        let fixed = self.options.fields.is_some();
        for field in self.options.fields.iter().flatten() {
            if field.name == identity_field {
                warn!("Ignoring supplied field '{}': it names the identity field", field.name);
                continue;
            }
            schema.insert(field.clone());
        }
        let mut unifier =
            SchemaUnifier::with_config(schema, self.schema_options.clone()).with_encoding(self.options.encoding);

        let mut rows = Vec::with_capacity(objects.len());
        for (index, object) in objects.iter().enumerate() {
            let identity = source.identity(object);
            if !source.is_shape(object, shape_type) {
                let msg = format!(
                    "Object {} (index {}) cannot be converted to shape type {}",
                    identity, index, shape_type
                );
                error!("{}", msg);
                return Err(Error::GeometryError(msg));
            }

            let mut record = AttributeRecord::new();
            let mut date_text = HashMap::new();
            let identity_value = FieldValue::Character(identity.clone());
            unifier.fold(identity_field, &identity_value, FieldKind::Text);
            record.insert(identity_field.to_string(), identity_value);

            for key in source.keys(object) {
                let name = match matcher.match_key(&key) {
                    Some(name) => name,
                    None => continue,
                };
                if name == identity_field {
                    warn!("Ignoring key '{}' of {}: it names the identity field", key, identity);
                    continue;
                }
                if fixed && !unifier.schema().contains(&name) {
                    debug!("Skipping key '{}' of {}: no such field", key, identity);
                    continue;
                }
                let raw = match source.value(object, &key) {
                    Some(raw) => raw,
                    None => {
                        debug!("No value for key '{}' of {}", key, identity);
                        continue;
                    }
                };
                let (value, kind, parsed_from) = self.coercer.coerce_with_source(&raw).map_err(|e| match e {
                    Error::CoercionError(msg) => {
                        Error::CoercionError(format!("{} (object {}, key '{}')", msg, identity, key))
                    }
                    other => other,
                })?;
                if fixed {
                    if let Some(field) = unifier.schema().get(&name) {
                        conform_to(&value, field).map_err(|e| match e {
                            Error::SchemaError(msg) => Error::SchemaError(format!("{} (object {})", msg, identity)),
                            other => other,
                        })?;
                    }
                } else {
                    unifier.fold(&name, &value, kind);
                }
                match parsed_from {
                    Some(text) => date_text.insert(name.clone(), text),
                    None => date_text.remove(&name),
                };
                record.insert(name, value);
            }

            let runs: Vec<Vec<Point>> =
                source.flatten(object).into_iter().filter(|run| !run.is_empty()).collect();
            if shape_type.is_point() && !runs.is_empty() && runs.iter().map(Vec::len).sum::<usize>() != 1 {
                let msg = format!("Object {} (index {}) is not a single point", identity, index);
                error!("{}", msg);
                return Err(Error::GeometryError(msg));
            }
            rows.push(PendingRow { identity, record, date_text, runs });
        }
        Ok((unifier.into_schema(), rows))
    }

    /// The .dbf columns for `schema`, with names cut to the format limit.
    fn columns(&self, schema: &Schema) -> Result<Vec<DbfField>> {
        let encoding = self.options.encoding;
        let mut taken: HashMap<String, &str> = HashMap::new();
        let mut columns = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let column = encoding.decode(&encoding.encode_truncated(&field.name, MAX_FIELD_NAME_LEN));
            if let Some(previous) = taken.insert(column.clone(), field.name.as_str()) {
                let msg = format!(
                    "Fields '{}' and '{}' both map to column '{}'",
                    previous, field.name, column
                );
                error!("{}", msg);
                return Err(Error::SchemaError(msg));
            }
            columns.push(field.to_dbf_field(&column));
        }
        validate_fields(&columns, encoding)?;
        Ok(columns)
    }

    fn write_rows(
        &self,
        paths: &ShapefilePaths,
        shape_type: ShapeType,
        schema: &Schema,
        columns: Vec<DbfField>,
        rows: Vec<PendingRow>,
        encoding: Encoding,
    ) -> Result<Vec<AttributeRecord>> {
        let mut encoder = ShapefileEncoder::create(paths.clone(), shape_type, columns, encoding)?;
        let mut written = Vec::with_capacity(rows.len());

        for row in rows {
            if row.runs.is_empty() {
                debug!("Object {} has no geometry, no row written", row.identity);
                continue;
            }
            let shape = Shape::from_parts(shape_type, &row.runs);

            let mut conformed = AttributeRecord::new();
            let mut values = Vec::with_capacity(schema.len());
            for field in schema.fields() {
                match row.record.get(&field.name) {
                    Some(value) => {
                        let value = match (value, row.date_text.get(&field.name), field.kind) {
                            (FieldValue::Date(_), Some(text), FieldKind::Text) => FieldValue::Character(text.clone()),
                            (FieldValue::Date(_), Some(text), FieldKind::Memo) => FieldValue::Memo(text.clone()),
                            _ => conform_to(value, field)?,
                        };
                        conformed.insert(field.name.clone(), value.clone());
                        values.push(value);
                    }
                    None => values.push(FieldValue::Null),
                }
            }
            encoder.write_record(&shape, &values)?;
            written.push(conformed);
        }

        encoder.finish()?;
        Ok(written)
    }
}

/// Checks the parent directory exists and makes sure of a .shp extension.
fn check_output_path(path: &Path) -> Result<PathBuf> {
    if path.file_name().is_none() {
        let msg = format!("Output path {} has no file name", path.display());
        error!("{}", msg);
        return Err(Error::InputError(msg));
    }
    let is_shp = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("shp"));
    let path = if is_shp {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".shp");
        PathBuf::from(name)
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        let msg = format!("Output directory {} does not exist", parent.display());
        error!("{}", msg);
        return Err(Error::InputError(msg));
    }
    Ok(path)
}
