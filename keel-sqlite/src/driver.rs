use crate::{CBox, SqliteConnection, database_error, sqlite3_close_v2};
use keel_core::{Driver, DriverConnection, Error, KeelError, Properties, Result, as_c_string};
use libsqlite3_sys::{
    SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_MEMORY, SQLITE_OPEN_READONLY,
    SQLITE_OPEN_READWRITE, SQLITE_OPEN_URI, sqlite3, sqlite3_busy_timeout, sqlite3_open_v2,
};
use std::{ffi::c_int, ptr};

const DEFAULT_BUSY_TIMEOUT_MS: c_int = 5000;

/// Sqlite driver, registered as `sqlite`.
///
/// The subname is the database file (`sqlite:../target/debug/app.sqlite`,
/// `sqlite:///tmp/app.sqlite`) or `:memory:`. Recognized properties:
/// * `mode`: `ro`, `rw`, `rwc` (default) or `memory`.
/// * `busy-timeout`: milliseconds to wait on a locked database, 5000 by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver {}

impl SqliteDriver {
    pub const fn new() -> Self {
        Self {}
    }

    /// Open a connection without going through a dbspec.
    pub fn open(&self, path: &str, properties: &Properties) -> Result<SqliteConnection> {
        let flags = match properties.get("mode").map(String::as_str) {
            None | Some("rwc") => SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE,
            Some("rw") => SQLITE_OPEN_READWRITE,
            Some("ro") => SQLITE_OPEN_READONLY,
            Some("memory") => SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE | SQLITE_OPEN_MEMORY,
            Some(mode) => {
                return Err(KeelError::configuration(format!(
                    "Unknown sqlite mode `{}`, expected one of ro, rw, rwc, memory",
                    mode
                ))
                .into());
            }
        } | SQLITE_OPEN_URI;
        let busy_timeout = match properties.get("busy-timeout") {
            Some(value) => value.parse::<c_int>().map_err(|e| {
                Error::from(KeelError::configuration(format!(
                    "`busy-timeout` expects milliseconds, found `{}`: {}",
                    value, e
                )))
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };
        let path = path.strip_prefix("//").unwrap_or(path);
        let filename = as_c_string(path)?;
        let mut connection = CBox::new(ptr::null_mut::<sqlite3>(), |p| unsafe {
            sqlite3_close_v2(p);
        });
        unsafe {
            let rc = sqlite3_open_v2(filename.as_ptr(), &mut *connection, flags, ptr::null());
            if rc != SQLITE_OK {
                let error = if connection.is_null() {
                    Error::from(KeelError::driver_code("Could not open the database", rc))
                } else {
                    database_error(*connection)
                }
                .context(format!("While opening the sqlite database `{}`", path));
                log::error!("{:#}", error);
                return Err(error);
            }
            sqlite3_busy_timeout(*connection, busy_timeout);
        }
        log::debug!("Opened the sqlite database `{}`", path);
        Ok(SqliteConnection::new(connection))
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(
        &self,
        subname: &str,
        properties: &Properties,
    ) -> Result<Box<dyn DriverConnection>> {
        Ok(Box::new(self.open(subname, properties)?))
    }
}
