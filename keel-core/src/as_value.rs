use crate::{Error, Result, Value, truncate_long};
use anyhow::Context;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use std::{any, borrow::Cow, str::FromStr};
use time::{PrimitiveDateTime, format_description::parse_borrowed};
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// This is the encoding/decoding capability used at the binding site of
/// statement parameters and when reading cursor cells back: the conversion is
/// picked by the type of the value. Implement it for your own types to make
/// them bindable and readable.
///
/// # Examples
/// ```rust
/// use keel_core::{AsValue, Value};
/// let v = 42i64.as_value();
/// assert!(matches!(v, Value::Int64(Some(42))));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// The typed `NULL` for this type.
    fn as_empty_value() -> Value;
    /// Convert into the owned [`Value`] representation.
    fn as_value(self) -> Value;
    /// Attempt to convert a dynamic [`Value`] into `Self`.
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
    /// Parse the textual representation, drivers storing types as text rely on it.
    fn parse(input: impl AsRef<str>) -> Result<Self>
    where
        Self: Sized,
    {
        Err(Error::msg(format!(
            "Cannot parse `{}` as {}",
            truncate_long!(input.as_ref()),
            any::type_name::<Self>()
        )))
    }
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {:?} to {}",
        value,
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value {
    ($source:ty, $destination:path, $parse:expr $(, $pat_rest:pat => $expr_rest:expr)* $(,)?) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $destination(Some(v)) => Ok(v),
                    $($pat_rest => $expr_rest,)*
                    #[allow(unreachable_patterns)]
                    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
                    _ => Err(mismatch::<Self>(&value)),
                }
            }
            fn parse(input: impl AsRef<str>) -> Result<Self> {
                let input = input.as_ref();
                let result: Result<Self> = ($parse)(input);
                result.with_context(|| {
                    format!(
                        "Cannot parse `{}` as {}",
                        truncate_long!(input),
                        any::type_name::<Self>()
                    )
                })
            }
        }
    };
}

impl_as_value!(
    bool,
    Value::Boolean,
    |v: &str| -> Result<bool> {
        match v.trim() {
            v if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
            v if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
            _ => Err(Error::msg("not a boolean")),
        }
    },
    Value::Int32(Some(v)) => Ok(v != 0),
    Value::Int64(Some(v)) => Ok(v != 0),
);
impl_as_value!(
    i32,
    Value::Int32,
    |v: &str| -> Result<i32> { Ok(i32::from_str(v.trim())?) },
    Value::Int64(Some(v)) => i32::try_from(v).map_err(|_| {
        Error::msg(format!("Value {v}: i64 is out of range for i32"))
    }),
    Value::Boolean(Some(v)) => Ok(v as i32),
);
impl_as_value!(
    i64,
    Value::Int64,
    |v: &str| -> Result<i64> { Ok(i64::from_str(v.trim())?) },
    Value::Int32(Some(v)) => Ok(v as i64),
    Value::Boolean(Some(v)) => Ok(v as i64),
);
impl_as_value!(
    f64,
    Value::Float64,
    |v: &str| -> Result<f64> { Ok(f64::from_str(v.trim())?) },
    Value::Int32(Some(v)) => Ok(v as f64),
    Value::Int64(Some(v)) => Ok(v as f64),
    Value::Decimal(Some(v)) => v
        .to_f64()
        .ok_or_else(|| Error::msg(format!("Cannot convert the Decimal value `{}` to f64", v))),
);
impl_as_value!(
    Decimal,
    Value::Decimal,
    |v: &str| -> Result<Decimal> { Ok(Decimal::from_str(v.trim())?) },
    Value::Int32(Some(v)) => Ok(Decimal::from(v)),
    Value::Int64(Some(v)) => Ok(Decimal::from(v)),
    Value::Float64(Some(v)) => Decimal::from_f64(v)
        .ok_or_else(|| Error::msg(format!("Cannot convert the f64 value `{}` to Decimal", v))),
);
impl_as_value!(
    String,
    Value::Varchar,
    |v: &str| -> Result<String> { Ok(v.to_owned()) },
    Value::Int32(Some(v)) => Ok(v.to_string()),
    Value::Int64(Some(v)) => Ok(v.to_string()),
    Value::Float64(Some(v)) => Ok(v.to_string()),
    Value::Decimal(Some(v)) => Ok(v.to_string()),
    Value::Uuid(Some(v)) => Ok(v.to_string()),
);
impl_as_value!(
    Box<[u8]>,
    Value::Blob,
    |v: &str| -> Result<Box<[u8]>> { Ok(v.as_bytes().into()) },
);
impl_as_value!(
    Uuid,
    Value::Uuid,
    |v: &str| -> Result<Uuid> { Ok(Uuid::parse_str(v.trim())?) },
    Value::Blob(Some(ref v)) => Ok(Uuid::from_slice(v)?),
);

macro_rules! parse_time {
    ($type:ty, $value:ident, $($formats:literal),+ $(,)?) => {
        'value: {
            for format in [$($formats,)+] {
                let format = parse_borrowed::<2>(format)?;
                if let Ok(result) = <$type>::parse($value, &format[..]) {
                    break 'value Ok(result);
                }
            }
            Err(Error::msg(format!(
                "Cannot extract from `{}` as {}",
                $value,
                any::type_name::<$type>()
            )))
        }
    };
}

impl AsValue for time::Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let v = input.as_ref().trim();
        parse_time!(time::Date, v, "[year]-[month]-[day]")
    }
}

impl AsValue for time::Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let v = input.as_ref().trim();
        parse_time!(
            time::Time,
            v,
            "[hour]:[minute]:[second].[subsecond]",
            "[hour]:[minute]:[second]",
            "[hour]:[minute]",
        )
    }
}

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
    fn parse(input: impl AsRef<str>) -> Result<Self> {
        let v = input.as_ref().trim();
        parse_time!(
            PrimitiveDateTime,
            v,
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
            "[year]-[month]-[day]T[hour]:[minute]:[second]",
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
            "[year]-[month]-[day] [hour]:[minute]:[second]",
            "[year]-[month]-[day] [hour]:[minute]",
        )
    }
}

impl<'a> AsValue for Cow<'a, str> {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self.into_owned()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        String::try_from_value(value).map(Cow::Owned)
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Ok(if value.is_null() {
            None
        } else {
            Some(<T as AsValue>::try_from_value(value)?)
        })
    }
}
