use crate::database_error;
use keel_core::{AsValue, Error, KeelError, Result, Value, truncate_long};
use libsqlite3_sys::*;
use rust_decimal::prelude::ToPrimitive;
use std::{
    ffi::{CStr, c_int},
    os::raw::{c_char, c_void},
    slice,
};

pub(crate) fn extract_value(statement: *mut sqlite3_stmt, index: c_int) -> Result<Value> {
    unsafe {
        let column_type = sqlite3_column_type(statement, index);
        Ok(match column_type {
            SQLITE_NULL => Value::Null,
            SQLITE_INTEGER => sqlite3_column_int64(statement, index).as_value(),
            SQLITE_FLOAT => sqlite3_column_double(statement, index).as_value(),
            SQLITE_BLOB => {
                let ptr = sqlite3_column_blob(statement, index) as *const u8;
                let len = sqlite3_column_bytes(statement, index) as usize;
                let bytes: Box<[u8]> = if ptr.is_null() || len == 0 {
                    Box::new([])
                } else {
                    slice::from_raw_parts(ptr, len).into()
                };
                Value::Blob(Some(bytes))
            }
            SQLITE_TEXT => {
                let ptr = sqlite3_column_text(statement, index);
                let len = sqlite3_column_bytes(statement, index) as usize;
                if ptr.is_null() || len == 0 {
                    Value::Varchar(Some(String::new()))
                } else {
                    String::from_utf8_lossy(slice::from_raw_parts(ptr, len))
                        .into_owned()
                        .as_value()
                }
            }
            _ => {
                return Err(KeelError::driver(format!(
                    "Unexpected column type {}",
                    column_type
                ))
                .into());
            }
        })
    }
}

pub(crate) fn extract_name(statement: *mut sqlite3_stmt, index: c_int) -> Result<String> {
    unsafe {
        let name = sqlite3_column_name(statement, index);
        if name.is_null() {
            return Err(KeelError::driver(format!("Missing the name of column {}", index)).into());
        }
        Ok(CStr::from_ptr(name).to_string_lossy().into_owned())
    }
}

/// Sqlite takes lengths and parameter indexes as C ints.
fn as_c_int(value: usize, what: &str) -> Result<c_int> {
    c_int::try_from(value).map_err(|_| {
        let error: Error = KeelError::driver(format!(
            "The {} {} is larger than the sqlite limit of {}",
            what,
            value,
            c_int::MAX
        ))
        .into();
        log::error!("{:#}", error);
        error
    })
}

fn bind_text(statement: *mut sqlite3_stmt, index: c_int, v: &str) -> Result<c_int> {
    let len = as_c_int(v.len(), "text length")?;
    Ok(unsafe {
        sqlite3_bind_text(
            statement,
            index,
            v.as_ptr() as *const c_char,
            len,
            SQLITE_TRANSIENT(),
        )
    })
}

/// Bind `value` at the 1-based `index` of `statement`.
pub(crate) fn bind_value(statement: *mut sqlite3_stmt, index: usize, value: &Value) -> Result<()> {
    let index = as_c_int(index, "parameter index")?;
    unsafe {
        let rc = match value {
            v if v.is_null() => sqlite3_bind_null(statement, index),
            Value::Boolean(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int32(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int64(Some(v)) => sqlite3_bind_int64(statement, index, *v),
            Value::Float64(Some(v)) => sqlite3_bind_double(statement, index, *v),
            Value::Decimal(Some(v)) => sqlite3_bind_double(
                statement,
                index,
                v.to_f64().ok_or_else(|| {
                    Error::from(KeelError::driver(format!(
                        "Cannot convert the Decimal value `{}` to f64",
                        v
                    )))
                })?,
            ),
            Value::Varchar(Some(v)) => bind_text(statement, index, v)?,
            Value::Blob(Some(v)) => sqlite3_bind_blob(
                statement,
                index,
                v.as_ptr() as *const c_void,
                as_c_int(v.len(), "blob length")?,
                SQLITE_TRANSIENT(),
            ),
            Value::Date(Some(v)) => bind_text(statement, index, &v.to_string())?,
            Value::Time(Some(v)) => bind_text(statement, index, &v.to_string())?,
            Value::Timestamp(Some(v)) => bind_text(statement, index, &v.to_string())?,
            Value::Uuid(Some(v)) => bind_text(statement, index, &v.to_string())?,
            _ => {
                let error: Error = KeelError::driver(format!(
                    "Cannot use a {:?} as a query parameter",
                    value
                ))
                .into();
                log::error!("{:#}", error);
                return Err(error);
            }
        };
        if rc != SQLITE_OK {
            let query = sqlite3_sql(statement);
            let error = database_error(sqlite3_db_handle(statement)).context(format!(
                "Cannot bind parameter {} to query:\n{}",
                index,
                truncate_long!(CStr::from_ptr(query).to_string_lossy())
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(())
    }
}
