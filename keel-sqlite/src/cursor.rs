use crate::{
    CBox, database_error,
    extract::{extract_name, extract_value},
};
use keel_core::{DriverCursor, KeelError, Result, Value};
use libsqlite3_sys::{
    SQLITE_DONE, SQLITE_ROW, sqlite3_column_count, sqlite3_db_handle, sqlite3_reset, sqlite3_step,
    sqlite3_stmt,
};
use std::{collections::VecDeque, ffi::c_int};

/// Cursor stepping a statement owned by a [`crate::SqliteStatement`].
///
/// It does not finalize the statement, closing only resets it.
pub struct SqliteCursor {
    statement: CBox<*mut sqlite3_stmt>,
    on_row: bool,
}

impl SqliteCursor {
    pub(crate) fn new(statement: *mut sqlite3_stmt) -> Self {
        Self {
            statement: CBox::new(statement, |_| {}),
            on_row: false,
        }
    }

    fn statement(&self) -> Result<*mut sqlite3_stmt> {
        if self.statement.is_null() {
            return Err(KeelError::ClosedCursor.into());
        }
        Ok(*self.statement)
    }
}

impl DriverCursor for SqliteCursor {
    fn column_count(&mut self) -> Result<usize> {
        Ok(unsafe { sqlite3_column_count(self.statement()?) } as usize)
    }

    fn column_label(&mut self, index: usize) -> Result<String> {
        extract_name(self.statement()?, index as c_int)
    }

    fn advance(&mut self) -> Result<bool> {
        let statement = self.statement()?;
        unsafe {
            match sqlite3_step(statement) {
                SQLITE_ROW => self.on_row = true,
                SQLITE_DONE => self.on_row = false,
                _ => {
                    self.on_row = false;
                    let error = database_error(sqlite3_db_handle(statement));
                    log::error!("{:#}", error);
                    return Err(error);
                }
            }
        }
        Ok(self.on_row)
    }

    fn get(&mut self, index: usize) -> Result<Value> {
        let statement = self.statement()?;
        if !self.on_row {
            return Err(KeelError::driver("The cursor is not positioned on a row").into());
        }
        extract_value(statement, index as c_int)
    }

    fn close(&mut self) -> Result<()> {
        let statement = self.statement.take();
        if !statement.is_null() {
            unsafe {
                sqlite3_reset(statement);
            }
        }
        Ok(())
    }
}

/// Cursor over rows already read, used for the rows returned by writes.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    labels: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(labels: Vec<String>, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        Self {
            labels,
            rows: rows.into_iter().collect(),
            current: None,
            closed: false,
        }
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(KeelError::ClosedCursor.into());
        }
        Ok(())
    }
}

impl DriverCursor for BufferedCursor {
    fn column_count(&mut self) -> Result<usize> {
        self.check()?;
        Ok(self.labels.len())
    }

    fn column_label(&mut self, index: usize) -> Result<String> {
        self.check()?;
        self.labels
            .get(index)
            .cloned()
            .ok_or_else(|| KeelError::driver(format!("No column at index {}", index)).into())
    }

    fn advance(&mut self) -> Result<bool> {
        self.check()?;
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn get(&mut self, index: usize) -> Result<Value> {
        self.check()?;
        self.current
            .as_ref()
            .and_then(|row| row.get(index))
            .cloned()
            .ok_or_else(|| KeelError::driver(format!("No value at index {}", index)).into())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rows.clear();
        self.current = None;
        Ok(())
    }
}
