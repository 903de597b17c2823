// Type coercion for loosely typed attribute values
//
// Host applications hand over attribute values of whatever type their users
// typed in. This module classifies each one into a column kind and the value
// that will be stored for it.

use std::fmt;

use chrono::NaiveDate;
use log::{debug, error, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec::decimal::Decimal;
use crate::codec::types::FieldValue;
use crate::internal::error::{Error, Result};
use crate::schema::types::FieldKind;

/// A dynamically typed value as supplied by a host application.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    List(Vec<HostValue>),
    Bytes(Vec<u8>),
}

impl HostValue {
    /// Maps a JSON value onto a host value. `null` has no counterpart.
    /// Objects are opaque and arrive as their serialized bytes.
    pub fn from_json(value: &serde_json::Value) -> Option<HostValue> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(HostValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(HostValue::Int(i)),
                None => n.as_f64().map(HostValue::Float),
            },
            Value::String(s) => Some(HostValue::Text(s.clone())),
            Value::Array(items) => Some(HostValue::List(
                items.iter().filter_map(HostValue::from_json).collect(),
            )),
            Value::Object(_) => Some(HostValue::Bytes(value.to_string().into_bytes())),
        }
    }
}

impl From<&FieldValue> for HostValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => HostValue::Text(String::new()),
            FieldValue::Logical(b) => HostValue::Bool(*b),
            FieldValue::Integer(i) => HostValue::Int(*i),
            FieldValue::Decimal(d) => HostValue::Text(d.to_string()),
            FieldValue::Date(d) => HostValue::Date(*d),
            FieldValue::Character(s) | FieldValue::Memo(s) => HostValue::Text(s.clone()),
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Bool(true) => write!(f, "True"),
            HostValue::Bool(false) => write!(f, "False"),
            HostValue::Int(i) => write!(f, "{}", i),
            HostValue::Float(x) => write!(f, "{}", x),
            HostValue::Text(s) => write!(f, "{}", s),
            HostValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            HostValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            HostValue::Bytes(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Configuration for value coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoerceOptions {
    /// Use exact decimal arithmetic; otherwise round through f64
    pub decimal: bool,

    /// Significant figures a decimal may need after rounding
    pub precision: u32,

    /// Decimal places values are rounded to when tested for decimal-ness
    pub max_dp: u32,

    /// Only accept year-first dates
    pub yyyy_mm_dd: bool,

    /// Store the value as given rather than the rounded decimal
    pub keep_floats: bool,

    /// Store uncoercible values as memo text instead of failing
    pub use_memo: bool,
}

impl Default for CoerceOptions {
    fn default() -> Self {
        Self {
            decimal: true,
            precision: 12,
            max_dp: 4,
            yyyy_mm_dd: false,
            keep_floats: true,
            use_memo: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateOrder {
    YearMonthDay,
    DayMonthYear,
    MonthDayYear,
}

const YEAR: &str = r"(\d{4}|\d{2})";
const MONTH: &str = r"(0?[1-9]|1[0-2])";
const DAY: &str = r"(0?[1-9]|[12]\d|3[01])";
const SEP: &str = r"[-.,:/\\ ]";

/// Classifies host values into stored field values.
#[derive(Debug, Clone)]
pub struct TypeCoercer {
    options: CoerceOptions,
    date_patterns: Vec<(DateOrder, Regex)>,
}

impl TypeCoercer {
    /// Creates a coercer with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(CoerceOptions::default())
    }

    /// Creates a coercer with custom configuration
    pub fn with_config(options: CoerceOptions) -> Result<Self> {
        let mut orders = vec![DateOrder::YearMonthDay];
        if !options.yyyy_mm_dd {
            orders.push(DateOrder::DayMonthYear);
            orders.push(DateOrder::MonthDayYear);
        }
        let date_patterns = orders
            .into_iter()
            .map(|order| {
                let (a, b, c) = match order {
                    DateOrder::YearMonthDay => (YEAR, MONTH, DAY),
                    DateOrder::DayMonthYear => (DAY, MONTH, YEAR),
                    DateOrder::MonthDayYear => (MONTH, DAY, YEAR),
                };
                let pattern = format!(r"^{a}{sep}{b}{sep}{c}$", a = a, b = b, c = c, sep = SEP);
                Regex::new(&pattern)
                    .map(|re| (order, re))
                    .map_err(|e| Error::CoercionError(format!("Invalid date pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { options, date_patterns })
    }

    pub fn options(&self) -> &CoerceOptions {
        &self.options
    }

    /// Classifies `value`, returning the value to store and its kind.
    /// The first matching rule wins: boolean, integer, decimal, date, text.
    pub fn coerce(&self, value: &HostValue) -> Result<(FieldValue, FieldKind)> {
        self.coerce_with_source(value).map(|(value, kind, _)| (value, kind))
    }

    /// Like [`coerce`](Self::coerce), but also returns the text a date was
    /// parsed from, so a column later demoted to text can store it as given.
    pub fn coerce_with_source(&self, value: &HostValue) -> Result<(FieldValue, FieldKind, Option<String>)> {
        if let Some(b) = as_bool(value) {
            return Ok((FieldValue::Logical(b), FieldKind::Boolean, None));
        }
        if let Some(i) = as_integer(value) {
            return Ok((FieldValue::Integer(i), FieldKind::Integer, None));
        }
        if let Some(d) = self.as_decimal(value) {
            return Ok((FieldValue::Decimal(d), FieldKind::Decimal, None));
        }

        let text = match value {
            HostValue::Date(date) => return Ok((FieldValue::Date(*date), FieldKind::Date, None)),
            HostValue::List(items) if is_int_triple(items) => items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(":"),
            HostValue::Text(s) => s.clone(),
            // too large for an integer, too precise for a decimal
            HostValue::Float(x) if x.is_finite() => {
                debug!("Storing {:?} as text", x);
                return Ok((FieldValue::Character(format!("{:?}", x)), FieldKind::Text, None));
            }
            other => return self.uncoercible(other).map(|(value, kind)| (value, kind, None)),
        };

        if let Some(date) = self.parse_date(&text) {
            return Ok((FieldValue::Date(date), FieldKind::Date, Some(text.trim().to_string())));
        }
        Ok((FieldValue::Character(text), FieldKind::Text, None))
    }

    fn as_decimal(&self, value: &HostValue) -> Option<Decimal> {
        let (original, rounded) = match value {
            HostValue::Float(x) if self.options.decimal => {
                let d = Decimal::from_f64(*x)?;
                let q = d.quantize(self.options.max_dp, self.options.precision)?;
                (d, q)
            }
            HostValue::Float(x) => {
                let factor = 10f64.powi(self.options.max_dp as i32);
                let r = (x * factor).round() / factor;
                (Decimal::from_f64(*x)?, Decimal::from_f64(r)?.round_dp(self.options.max_dp))
            }
            HostValue::Text(s) => {
                let d: Decimal = s.parse().ok()?;
                let q = if self.options.decimal {
                    d.quantize(self.options.max_dp, self.options.precision)?
                } else {
                    d.round_dp(self.options.max_dp)
                };
                (d, q)
            }
            _ => return None,
        };
        Some(if self.options.keep_floats { original } else { rounded })
    }

    fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        self.date_patterns.iter().find_map(|(order, re)| {
            let caps = re.captures(text)?;
            let nums: Vec<&str> = (1..=3).map(|i| caps.get(i).map_or("", |m| m.as_str())).collect();
            let (y, m, d) = match order {
                DateOrder::YearMonthDay => (nums[0], nums[1], nums[2]),
                DateOrder::DayMonthYear => (nums[2], nums[1], nums[0]),
                DateOrder::MonthDayYear => (nums[2], nums[0], nums[1]),
            };
            let mut year: i32 = y.parse().ok()?;
            if y.len() == 2 {
                year += if year < 70 { 2000 } else { 1900 };
            }
            NaiveDate::from_ymd_opt(year, m.parse().ok()?, d.parse().ok()?)
        })
    }

    fn uncoercible(&self, value: &HostValue) -> Result<(FieldValue, FieldKind)> {
        let msg = format!("Failed to coerce value {} to an attribute type", value);
        if self.options.use_memo {
            warn!("{}. Using Memo.", msg);
            return Ok((FieldValue::Memo(value.to_string()), FieldKind::Memo));
        }
        error!("{}", msg);
        Err(Error::CoercionError(msg))
    }
}

/// Coerces a single value with `options`.
pub fn coerce(value: &HostValue, options: &CoerceOptions) -> Result<(FieldValue, FieldKind)> {
    TypeCoercer::with_config(options.clone())?.coerce(value)
}

fn as_bool(value: &HostValue) -> Option<bool> {
    match value {
        HostValue::Bool(b) => Some(*b),
        HostValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
        HostValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn as_integer(value: &HostValue) -> Option<i64> {
    match value {
        HostValue::Int(i) => Some(*i),
        // 2^63 is exactly representable, so the bounds are exclusive on top
        HostValue::Float(x) if x.is_finite() && x.fract() == 0.0 => {
            if *x >= -9_223_372_036_854_775_808.0 && *x < 9_223_372_036_854_775_808.0 {
                Some(*x as i64)
            } else {
                None
            }
        }
        HostValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_int_triple(items: &[HostValue]) -> bool {
    items.len() == 3 && items.iter().all(|item| matches!(item, HostValue::Int(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coercer() -> TypeCoercer {
        TypeCoercer::new().unwrap()
    }

    fn text(s: &str) -> HostValue {
        HostValue::Text(s.to_string())
    }

    #[test]
    fn test_booleans_before_numbers() {
        let c = coercer();
        assert_eq!(c.coerce(&HostValue::Bool(true)).unwrap(), (FieldValue::Logical(true), FieldKind::Boolean));
        assert_eq!(c.coerce(&text("TRUE")).unwrap(), (FieldValue::Logical(true), FieldKind::Boolean));
        assert_eq!(c.coerce(&text("false")).unwrap(), (FieldValue::Logical(false), FieldKind::Boolean));
        assert_eq!(c.coerce(&HostValue::Int(1)).unwrap().1, FieldKind::Integer);
        assert_eq!(c.coerce(&text("yes")).unwrap().1, FieldKind::Text);
    }

    #[test]
    fn test_integers_are_lossless() {
        let c = coercer();
        assert_eq!(c.coerce(&text(" 42 ")).unwrap(), (FieldValue::Integer(42), FieldKind::Integer));
        assert_eq!(c.coerce(&HostValue::Float(3.0)).unwrap(), (FieldValue::Integer(3), FieldKind::Integer));
        assert_eq!(c.coerce(&HostValue::Float(3.5)).unwrap().1, FieldKind::Decimal);
    }

    #[test]
    fn test_whole_float_beyond_i64_is_text() {
        let c = coercer();
        assert_eq!(
            c.coerce(&HostValue::Float(1e300)).unwrap(),
            (FieldValue::Character("1e300".into()), FieldKind::Text)
        );
        assert_eq!(c.coerce(&HostValue::Float(-1e19)).unwrap().1, FieldKind::Text);
        assert!(matches!(c.coerce(&HostValue::Float(f64::INFINITY)), Err(Error::CoercionError(_))));
    }

    #[test]
    fn test_decimals_keep_or_round() {
        let keep = coercer();
        let (value, kind) = keep.coerce(&text("3.14159")).unwrap();
        assert_eq!(kind, FieldKind::Decimal);
        assert_eq!(value, FieldValue::Decimal("3.14159".parse().unwrap()));

        let round = TypeCoercer::with_config(CoerceOptions { keep_floats: false, ..Default::default() }).unwrap();
        let (value, _) = round.coerce(&HostValue::Float(3.14159)).unwrap();
        assert_eq!(value.render(), "3.1416");

        let floats = TypeCoercer::with_config(CoerceOptions {
            decimal: false,
            keep_floats: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(floats.coerce(&HostValue::Float(2.71828)).unwrap().0.render(), "2.7183");
    }

    #[test]
    fn test_decimal_precision_overflow_falls_through() {
        let c = coercer();
        // 13 significant figures once rounded to 4 places: not a decimal, so text
        let (value, kind) = c.coerce(&text("123456789.5")).unwrap();
        assert_eq!(kind, FieldKind::Text);
        assert_eq!(value, FieldValue::Character("123456789.5".into()));
        // a float falls back to its own rendering
        assert_eq!(
            c.coerce(&HostValue::Float(123456789.5)).unwrap(),
            (FieldValue::Character("123456789.5".into()), FieldKind::Text)
        );
    }

    #[test]
    fn test_dates() {
        let c = coercer();
        let day = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(c.coerce(&text("2021-03-04")).unwrap(), (FieldValue::Date(day), FieldKind::Date));
        assert_eq!(c.coerce(&text("2021/3/4")).unwrap().0, FieldValue::Date(day));
        assert_eq!(c.coerce(&text("04.03.2021")).unwrap().0, FieldValue::Date(day));
        // day 31 cannot be a month, so month-first
        let halloween = NaiveDate::from_ymd_opt(2020, 10, 31).unwrap();
        assert_eq!(c.coerce(&text("10/31/2020")).unwrap().0, FieldValue::Date(halloween));
        assert_eq!(c.coerce(&text("21 3 4")).unwrap().0, FieldValue::Date(day));
        assert_eq!(c.coerce(&HostValue::Date(day)).unwrap().1, FieldKind::Date);
        // valid pattern, impossible date
        assert_eq!(c.coerce(&text("2021-02-30")).unwrap().1, FieldKind::Text);
    }

    #[test]
    fn test_date_keeps_its_source_text() {
        let c = coercer();
        let (value, kind, source) = c.coerce_with_source(&text(" 1/2/03 ")).unwrap();
        assert_eq!(kind, FieldKind::Date);
        assert_eq!(value, FieldValue::Date(NaiveDate::from_ymd_opt(2003, 2, 1).unwrap()));
        assert_eq!(source.as_deref(), Some("1/2/03"));

        let day = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(c.coerce_with_source(&HostValue::Date(day)).unwrap().2, None);
        assert_eq!(c.coerce_with_source(&text("plain")).unwrap().2, None);
    }

    #[test]
    fn test_year_first_only() {
        let c = TypeCoercer::with_config(CoerceOptions { yyyy_mm_dd: true, ..Default::default() }).unwrap();
        assert_eq!(c.coerce(&text("04.03.2021")).unwrap().1, FieldKind::Text);
        assert_eq!(c.coerce(&text("2021.03.04")).unwrap().1, FieldKind::Date);
    }

    #[test]
    fn test_int_triple_becomes_colon_text() {
        let c = coercer();
        let triple = HostValue::List(vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);
        assert_eq!(c.coerce(&triple).unwrap(), (FieldValue::Character("1:2:3".into()), FieldKind::Text));
        let date_like = HostValue::List(vec![HostValue::Int(2021), HostValue::Int(3), HostValue::Int(4)]);
        assert_eq!(c.coerce(&date_like).unwrap().1, FieldKind::Date);
    }

    #[test]
    fn test_uncoercible_values() {
        let blob = HostValue::Bytes(b"\x01raw".to_vec());
        assert!(matches!(coercer().coerce(&blob), Err(Error::CoercionError(_))));

        let memo = TypeCoercer::with_config(CoerceOptions { use_memo: true, ..Default::default() }).unwrap();
        let list = HostValue::List(vec![HostValue::Float(0.5), HostValue::Text("a".into())]);
        assert_eq!(memo.coerce(&list).unwrap(), (FieldValue::Memo("[0.5, a]".into()), FieldKind::Memo));
        assert_eq!(memo.coerce(&HostValue::Float(f64::NAN)).unwrap().1, FieldKind::Memo);
    }

    #[test]
    fn test_from_json() {
        let value: serde_json::Value = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        let list = HostValue::from_json(&value["a"]).unwrap();
        assert_eq!(
            list,
            HostValue::List(vec![
                HostValue::Int(1),
                HostValue::Float(2.5),
                HostValue::Text("x".into()),
                HostValue::Bool(true),
            ])
        );
        assert!(HostValue::from_json(&serde_json::Value::Null).is_none());
        assert!(matches!(HostValue::from_json(&value), Some(HostValue::Bytes(_))));
    }
}
