// Geometry and attribute source contract
//
// Whatever holds the objects being written (a scene graph, a JSON file)
// exposes them through ShapeSource. The writer never looks inside an object
// except through these methods.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec::types::{Point, ShapeType};
use crate::internal::error::{Error, Result};
use crate::schema::coerce::HostValue;

/// Access to a collection of host objects.
pub trait ShapeSource {
    type Object;

    /// Whether `object` can be written as a record of `shape_type`.
    fn is_shape(&self, object: &Self::Object, shape_type: ShapeType) -> bool;

    /// The object's point runs, one per part. Empty when it has no geometry.
    fn flatten(&self, object: &Self::Object) -> Vec<Vec<Point>>;

    /// A stable identity string for the object.
    fn identity(&self, object: &Self::Object) -> String;

    /// Raw attribute keys of the object.
    fn keys(&self, object: &Self::Object) -> Vec<String>;

    /// The value stored under `key`, if any.
    fn value(&self, object: &Self::Object, key: &str) -> Option<HostValue>;
}

pub const DEFAULT_KEY_PATTERN: &str = r"(?P<name>.+)";

/// Maps raw attribute keys to field names through a regex with a `name` group.
/// The pattern must match at the start of the key.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    regex: Regex,
}

impl KeyMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InputError(format!("Invalid key pattern {:?}: {}", pattern, e)))?;
        if !regex.capture_names().any(|name| name == Some("name")) {
            return Err(Error::InputError(format!(
                "Key pattern {:?} has no capture group named 'name'",
                pattern
            )));
        }
        Ok(Self { regex })
    }

    /// Matches every key, using the whole key as the field name.
    pub fn any() -> Result<Self> {
        Self::new(DEFAULT_KEY_PATTERN)
    }

    /// The field name for `key`, or `None` if the key is not an attribute.
    pub fn match_key(&self, key: &str) -> Option<String> {
        let caps = self.regex.captures(key)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        let name = caps.name("name")?.as_str();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// A feature as found in a JSON feature file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    /// Point runs; each coordinate is `[x, y]`, `[x, y, z|m]` or `[x, y, z, m]`.
    #[serde(default)]
    pub parts: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub attributes: IndexMap<String, serde_json::Value>,
}

/// ShapeSource over plain features. Three-value coordinates are read as z
/// for Z shape types and as m otherwise.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSource {
    shape_type: ShapeType,
}

impl FeatureSource {
    pub fn new(shape_type: ShapeType) -> Self {
        Self { shape_type }
    }

    fn point(&self, coords: &[f64]) -> Point {
        let mut point = Point::new(coords[0], coords[1]);
        match coords.len() {
            3 if self.shape_type.has_z() => point.z = coords[2],
            3 => point.m = coords[2],
            4 => {
                point.z = coords[2];
                point.m = coords[3];
            }
            _ => {}
        }
        point
    }
}

impl ShapeSource for FeatureSource {
    type Object = Feature;

    fn is_shape(&self, feature: &Feature, shape_type: ShapeType) -> bool {
        if shape_type == ShapeType::Null {
            return false;
        }
        let min_len = if shape_type.has_z() { 3 } else { 2 };
        let coords_ok = feature
            .parts
            .iter()
            .flatten()
            .all(|c| c.len() >= min_len && c.len() <= 4 && c.iter().all(|v| v.is_finite()));
        if !coords_ok {
            return false;
        }
        // an empty point feature is still a shape, it just gets no row
        if shape_type.is_point() {
            return feature.parts.iter().map(|p| p.len()).sum::<usize>() <= 1;
        }
        true
    }

    fn flatten(&self, feature: &Feature) -> Vec<Vec<Point>> {
        feature
            .parts
            .iter()
            .map(|run| run.iter().map(|c| self.point(c)).collect())
            .collect()
    }

    fn identity(&self, feature: &Feature) -> String {
        feature.id.clone()
    }

    fn keys(&self, feature: &Feature) -> Vec<String> {
        feature.attributes.keys().cloned().collect()
    }

    fn value(&self, feature: &Feature, key: &str) -> Option<HostValue> {
        feature.attributes.get(key).and_then(HostValue::from_json)
    }
}
