mod cbox;
mod connection;
mod cursor;
mod driver;
mod extract;
mod statement;

use keel_core::{Error, KeelError};
use libsqlite3_sys::{sqlite3, sqlite3_errmsg, sqlite3_extended_errcode};
use std::{
    ffi::{CStr, c_char, c_int},
    ptr,
};

pub(crate) use cbox::*;
pub use connection::*;
pub use cursor::*;
pub use driver::*;
pub use statement::*;

unsafe extern "C" {
    /// Close `db`, deferred until its last statement is finalized.
    pub(crate) fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

pub(crate) fn error_message_from_ptr(ptr: *const c_char) -> String {
    unsafe {
        if ptr != ptr::null() {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        } else {
            "Unknown error (could not extract the error message)".into()
        }
    }
}

/// Driver error describing the last failure on `db`.
pub(crate) fn database_error(db: *mut sqlite3) -> Error {
    unsafe {
        KeelError::driver_code(
            error_message_from_ptr(sqlite3_errmsg(db)),
            sqlite3_extended_errcode(db),
        )
        .into()
    }
}
