//! Column types, dynamic-column type inference, and value casting.
//!
//! Dynamic columns are declared with one of four storage types. Inference
//! picks the narrowest type that holds every observed value, in the fixed
//! precedence boolean < integer < float < varchar. Once a column is declared
//! its type never narrows; later writes are cast to it with [`ColumnType::coerce`].
//! Required columns may additionally use [`ColumnType::Timestamp`].

use std::{fmt, str::FromStr};

use crate::{
    data::{
        TIMESTAMP_FORMAT, Value, parse_boolean_token, parse_float_token, parse_integer_token,
        parse_naive_datetime,
    },
    error::{Result, TemplateError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Varchar,
    Timestamp,
}

impl ColumnType {
    /// Engine type name, also the spelling recorded in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "bool",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Varchar => "varchar",
            ColumnType::Timestamp => "timestamp",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["bool", "integer", "float", "varchar", "timestamp"]
    }

    /// Casts a user-supplied value into this type.
    pub fn coerce(&self, column: &str, value: &Value) -> Result<Value> {
        let fail = |reason: &str| TemplateError::TypeCoercion {
            column: column.to_string(),
            value: value.as_display(),
            reason: reason.to_string(),
        };
        let cast = match (self, value) {
            (ColumnType::Varchar, Value::Text(s)) => Value::Text(s.clone()),
            (ColumnType::Varchar, other) => Value::Text(other.as_display()),

            (ColumnType::Integer, Value::Integer(i)) => Value::Integer(*i),
            (ColumnType::Integer, Value::Float(f)) if float_fits_integer(*f) => {
                Value::Integer(*f as i64)
            }
            (ColumnType::Integer, Value::Text(s)) => {
                Value::Integer(parse_integer_token(s).ok_or_else(|| fail("expected an integer"))?)
            }
            (ColumnType::Integer, _) => return Err(fail("expected an integer")),

            (ColumnType::Float, Value::Float(f)) => Value::Float(*f),
            (ColumnType::Float, Value::Integer(i)) => Value::Float(*i as f64),
            (ColumnType::Float, Value::Text(s)) => {
                Value::Float(parse_float_token(s).ok_or_else(|| fail("expected a number"))?)
            }
            (ColumnType::Float, _) => return Err(fail("expected a number")),

            (ColumnType::Boolean, Value::Boolean(b)) => Value::Boolean(*b),
            (ColumnType::Boolean, Value::Text(s)) => {
                Value::Boolean(parse_boolean_token(s).ok_or_else(|| fail("expected True or False"))?)
            }
            (ColumnType::Boolean, _) => return Err(fail("expected True or False")),

            (ColumnType::Timestamp, Value::Timestamp(ts)) => Value::Timestamp(*ts),
            (ColumnType::Timestamp, Value::Text(s)) => Value::Timestamp(
                parse_naive_datetime(s).map_err(|_| fail("expected a timestamp"))?,
            ),
            (ColumnType::Timestamp, _) => return Err(fail("expected a timestamp")),
        };
        Ok(cast)
    }

    /// Restores the typed value from what the engine hands back.
    ///
    /// SQLite keeps booleans as 0/1 and timestamps as text, so the declared
    /// type drives the decoding.
    pub fn from_stored(&self, raw: Value) -> Value {
        match (self, raw) {
            (ColumnType::Boolean, Value::Integer(i)) => Value::Boolean(i != 0),
            (ColumnType::Integer, Value::Float(f)) if float_fits_integer(f) => Value::Integer(f as i64),
            (ColumnType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (ColumnType::Varchar, Value::Text(s)) => Value::Text(s),
            (ColumnType::Varchar, other) => Value::Text(other.as_display()),
            (ColumnType::Timestamp, Value::Text(s)) => match parse_naive_datetime(&s) {
                Ok(ts) => Value::Timestamp(ts),
                Err(_) => Value::Text(s),
            },
            (_, other) => other,
        }
    }

    /// Parameter form handed to the store.
    pub fn to_stored(value: &Value) -> Value {
        match value {
            Value::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "integer" | "int" | "bigint" => Ok(ColumnType::Integer),
            "float" | "double" | "real" => Ok(ColumnType::Float),
            "varchar" | "text" | "string" => Ok(ColumnType::Varchar),
            "timestamp" | "datetime" => Ok(ColumnType::Timestamp),
            _ => Err(TemplateError::Structure(format!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            ))),
        }
    }
}

/// 2^63; every whole float in `[-2^63, 2^63)` converts to `i64` exactly.
const I64_FLOAT_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn float_fits_integer(value: f64) -> bool {
    value.fract() == 0.0 && (-I64_FLOAT_BOUND..I64_FLOAT_BOUND).contains(&value)
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    non_empty: usize,
    possible_boolean: bool,
    possible_integer: bool,
    possible_float: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            non_empty: 0,
            possible_boolean: true,
            possible_integer: true,
            possible_float: true,
        }
    }

    fn update(&mut self, value: &Value) {
        self.non_empty += 1;
        match value {
            Value::Boolean(_) => {
                self.possible_integer = false;
                self.possible_float = false;
            }
            Value::Integer(_) => {
                self.possible_boolean = false;
            }
            Value::Float(_) => {
                self.possible_boolean = false;
                self.possible_integer = false;
            }
            Value::Text(s) => {
                if self.possible_boolean && parse_boolean_token(s).is_none() {
                    self.possible_boolean = false;
                }
                if self.possible_integer && parse_integer_token(s).is_none() {
                    self.possible_integer = false;
                }
                if self.possible_float && parse_float_token(s).is_none() {
                    self.possible_float = false;
                }
            }
            Value::Timestamp(_) => {
                self.possible_boolean = false;
                self.possible_integer = false;
                self.possible_float = false;
            }
        }
    }

    fn decide(&self) -> ColumnType {
        if self.non_empty == 0 {
            ColumnType::Varchar
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else {
            ColumnType::Varchar
        }
    }
}

/// Infers the storage type of a dynamic column from its non-null cells.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    let mut candidate = TypeCandidate::new();
    for value in values.into_iter().flatten() {
        candidate.update(value);
    }
    candidate.decide()
}
