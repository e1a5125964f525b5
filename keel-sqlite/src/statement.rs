use crate::{
    BufferedCursor, CBox, SqliteCursor, database_error,
    extract::{bind_value, extract_name, extract_value},
};
use keel_core::{DriverCursor, DriverStatement, Error, KeelError, Result, Value, truncate_long};
use libsqlite3_sys::*;
use std::{ffi::CStr, mem};

/// A prepared sqlite statement.
///
/// Bindings are kept on the Rust side and applied at execution, so that
/// batch entries can be replayed one after the other.
pub struct SqliteStatement {
    pub(crate) statement: CBox<*mut sqlite3_stmt>,
    returning: bool,
    current: Vec<Value>,
    batch: Vec<Vec<Value>>,
    returned: Option<BufferedCursor>,
}

impl SqliteStatement {
    pub(crate) fn new(statement: CBox<*mut sqlite3_stmt>, returning: bool) -> Self {
        Self {
            statement,
            returning,
            current: Vec::new(),
            batch: Vec::new(),
            returned: None,
        }
    }

    fn statement(&self) -> Result<*mut sqlite3_stmt> {
        if self.statement.is_null() {
            return Err(KeelError::driver("The statement was already closed").into());
        }
        Ok(*self.statement)
    }

    fn sql(&self) -> String {
        if self.statement.is_null() {
            return String::new();
        }
        unsafe {
            let sql = sqlite3_sql(*self.statement);
            if sql.is_null() {
                return String::new();
            }
            CStr::from_ptr(sql).to_string_lossy().into_owned()
        }
    }

    /// Reset the statement and bind `values` from position 1.
    fn apply(&self, values: &[Value]) -> Result<*mut sqlite3_stmt> {
        let statement = self.statement()?;
        unsafe {
            sqlite3_reset(statement);
            sqlite3_clear_bindings(statement);
        }
        for (i, value) in values.iter().enumerate() {
            bind_value(statement, i + 1, value)?;
        }
        Ok(statement)
    }

    /// Run the statement to completion, returning the changed rows count and
    /// the rows it produced.
    fn run(&self, values: &[Value]) -> Result<(u64, Vec<Vec<Value>>)> {
        let statement = self.apply(values)?;
        let mut rows = Vec::new();
        unsafe {
            let db = sqlite3_db_handle(statement);
            let before = sqlite3_total_changes64(db);
            loop {
                match sqlite3_step(statement) {
                    SQLITE_ROW => {
                        if self.returning {
                            let count = sqlite3_column_count(statement);
                            rows.push(
                                (0..count)
                                    .map(|i| extract_value(statement, i))
                                    .collect::<Result<_>>()?,
                            );
                        }
                    }
                    SQLITE_DONE => break,
                    _ => {
                        let error = database_error(db);
                        sqlite3_reset(statement);
                        return Err(error);
                    }
                }
            }
            let changes = sqlite3_total_changes64(db) - before;
            sqlite3_reset(statement);
            Ok((changes.max(0) as u64, rows))
        }
    }
}

impl DriverStatement for SqliteStatement {
    fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        if index == 0 {
            return Err(KeelError::driver("Parameter indexes start at 1").into());
        }
        if self.current.len() < index {
            self.current.resize(index, Value::Null);
        }
        self.current[index - 1] = value.clone();
        Ok(())
    }

    fn add_batch(&mut self) -> Result<()> {
        let entry = mem::take(&mut self.current);
        self.batch.push(entry);
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let batch = mem::take(&mut self.batch);
        let mut counts = Vec::with_capacity(batch.len());
        let mut returned = Vec::new();
        for entry in &batch {
            match self.run(entry) {
                Ok((count, rows)) => {
                    counts.push(count);
                    returned.extend(rows);
                }
                Err(error) => {
                    let error: Error = KeelError::batch(
                        format!(
                            "Entry {} of `{}` failed: {:#}",
                            counts.len() + 1,
                            truncate_long!(self.sql()),
                            error
                        ),
                        Some(counts),
                    )
                    .into();
                    log::error!("{:#}", error);
                    return Err(error);
                }
            }
        }
        if self.returning {
            let statement = self.statement()?;
            let count = unsafe { sqlite3_column_count(statement) };
            let labels = (0..count)
                .map(|i| extract_name(statement, i))
                .collect::<Result<Vec<_>>>()?;
            self.returned = Some(BufferedCursor::new(labels, returned));
        }
        Ok(counts)
    }

    fn generated_keys(&mut self) -> Result<Box<dyn DriverCursor>> {
        match self.returned.take() {
            Some(cursor) => Ok(Box::new(cursor)),
            None => Err(KeelError::driver(
                "No rows were returned, prepare the statement with a returning clause and execute it first",
            )
            .into()),
        }
    }

    fn execute_query(&mut self) -> Result<Box<dyn DriverCursor>> {
        let statement = self.apply(&self.current)?;
        Ok(Box::new(SqliteCursor::new(statement)))
    }

    fn close(&mut self) -> Result<()> {
        let statement = self.statement.take();
        if statement.is_null() {
            return Ok(());
        }
        let rc = unsafe { sqlite3_finalize(statement) };
        if rc != SQLITE_OK {
            let error: Error =
                KeelError::driver_code("Failed to finalize the statement", rc).into();
            log::error!("{:#}", error);
            return Err(error);
        }
        Ok(())
    }
}

pub(crate) fn finalize(statement: *mut sqlite3_stmt) {
    unsafe {
        sqlite3_finalize(statement);
    }
}
