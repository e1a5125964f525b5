use crate::{CBox, SqliteStatement, database_error, sqlite3_close_v2, statement::finalize};
use keel_core::{
    DriverConnection, DriverStatement, Error, IsolationLevel, KeelError, Result, Returning,
    Savepoint, as_c_string, truncate_long,
};
use libsqlite3_sys::{
    SQLITE_DONE, SQLITE_OK, SQLITE_ROW, sqlite3, sqlite3_get_autocommit,
    sqlite3_prepare_v2, sqlite3_reset, sqlite3_step, sqlite3_stmt, sqlite3_total_changes64,
};
use std::{
    ffi::{CStr, c_char, c_int},
    ptr,
};

/// A sqlite database connection.
///
/// Auto commit is emulated: disabling it opens a transaction right away, and
/// a new one is opened after every commit or rollback until it is enabled
/// again.
pub struct SqliteConnection {
    pub(crate) connection: CBox<*mut sqlite3>,
    auto_commit: bool,
    isolation: IsolationLevel,
    read_only: bool,
    savepoints: u64,
}

impl SqliteConnection {
    pub(crate) fn new(connection: CBox<*mut sqlite3>) -> Self {
        Self {
            connection,
            auto_commit: true,
            isolation: IsolationLevel::Serializable,
            read_only: false,
            savepoints: 0,
        }
    }

    fn db(&self) -> Result<*mut sqlite3> {
        if self.connection.is_null() {
            return Err(KeelError::driver("The sqlite connection was already closed").into());
        }
        Ok(*self.connection)
    }

    /// Whether sqlite has a transaction open on this connection.
    pub fn in_transaction(&self) -> bool {
        match self.db() {
            Ok(db) => unsafe { sqlite3_get_autocommit(db) == 0 },
            Err(..) => false,
        }
    }

    /// Run every statement of `sql`, returns the number of rows they changed.
    pub fn run_script(&mut self, sql: &str) -> Result<u64> {
        let db = self.db()?;
        let source = as_c_string(sql)?;
        unsafe {
            let before = sqlite3_total_changes64(db);
            let mut tail: *const c_char = source.as_ptr();
            while !tail.is_null() && *tail != 0 {
                let mut statement = CBox::new(ptr::null_mut::<sqlite3_stmt>(), finalize);
                let mut next: *const c_char = ptr::null();
                let rc = sqlite3_prepare_v2(db, tail, -1, &mut *statement, &mut next);
                if rc != SQLITE_OK {
                    return Err(self.failure(sql));
                }
                tail = next;
                if statement.is_null() {
                    // Only whitespace or comments were left
                    continue;
                }
                loop {
                    match sqlite3_step(*statement) {
                        SQLITE_ROW => continue,
                        SQLITE_DONE => break,
                        _ => {
                            sqlite3_reset(*statement);
                            return Err(self.failure(sql));
                        }
                    }
                }
            }
            Ok((sqlite3_total_changes64(db) - before).max(0) as u64)
        }
    }

    fn failure(&self, sql: &str) -> Error {
        let error = match self.db() {
            Ok(db) => database_error(db),
            Err(e) => e,
        }
        .context(format!("While executing:\n{}", truncate_long!(sql)));
        log::error!("{:#}", error);
        error
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction() {
            self.run_script("BEGIN")?;
        }
        Ok(())
    }

    /// Open a new transaction when auto commit is disabled.
    fn reopen(&mut self) -> Result<()> {
        if !self.auto_commit {
            self.begin()?;
        }
        Ok(())
    }
}

impl DriverConnection for SqliteConnection {
    fn auto_commit(&mut self) -> Result<bool> {
        self.db()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit == self.auto_commit {
            return Ok(());
        }
        if auto_commit {
            if self.in_transaction() {
                self.run_script("COMMIT")?;
            }
        } else {
            self.begin()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn isolation_level(&mut self) -> Result<IsolationLevel> {
        self.db()?;
        Ok(self.isolation)
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        let pragma = match level {
            IsolationLevel::None => return Ok(()),
            IsolationLevel::Serializable => "PRAGMA read_uncommitted = 0",
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1",
            _ => {
                let error: Error = KeelError::driver(format!(
                    "Sqlite does not support the isolation level `{}`",
                    level
                ))
                .into();
                log::error!("{:#}", error);
                return Err(error);
            }
        };
        self.run_script(pragma)?;
        self.isolation = level;
        Ok(())
    }

    fn read_only(&mut self) -> Result<bool> {
        self.db()?;
        Ok(self.read_only)
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.run_script(if read_only {
            "PRAGMA query_only = 1"
        } else {
            "PRAGMA query_only = 0"
        })?;
        self.read_only = read_only;
        Ok(())
    }

    fn set_schema(&mut self, schema: &str) -> Result<()> {
        if schema.eq_ignore_ascii_case("main") {
            return Ok(());
        }
        let error: Error = KeelError::driver(format!(
            "Sqlite cannot switch the schema to `{}`, qualify the tables with the attached database name instead",
            schema
        ))
        .into();
        log::error!("{:#}", error);
        Err(error)
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.run_script("COMMIT")?;
        }
        self.reopen()
    }

    fn rollback(&mut self, savepoint: Option<&Savepoint>) -> Result<()> {
        match savepoint {
            Some(savepoint) => {
                self.run_script(&format!("ROLLBACK TO SAVEPOINT {}", savepoint.name))?;
                Ok(())
            }
            None => {
                if self.in_transaction() {
                    self.run_script("ROLLBACK")?;
                }
                self.reopen()
            }
        }
    }

    fn set_savepoint(&mut self) -> Result<Savepoint> {
        self.savepoints += 1;
        let savepoint = Savepoint::new(self.savepoints, format!("keel_sp_{}", self.savepoints));
        self.run_script(&format!("SAVEPOINT {}", savepoint.name))?;
        Ok(savepoint)
    }

    fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.run_script(&format!("RELEASE SAVEPOINT {}", savepoint.name))?;
        Ok(())
    }

    fn execute_batch(&mut self, commands: &[&str]) -> Result<Vec<u64>> {
        let mut counts = Vec::with_capacity(commands.len());
        for command in commands {
            match self.run_script(command) {
                Ok(count) => counts.push(count),
                Err(error) => {
                    return Err(KeelError::batch(
                        format!("Command {} of the batch failed: {:#}", counts.len() + 1, error),
                        Some(counts),
                    )
                    .into());
                }
            }
        }
        Ok(counts)
    }

    fn prepare(&mut self, sql: &str, returning: &Returning) -> Result<Box<dyn DriverStatement>> {
        let db = self.db()?;
        let sql = match returning {
            Returning::Nothing => sql.to_string(),
            Returning::All => format!("{} RETURNING *", sql.trim_end().trim_end_matches(';')),
            Returning::Columns(columns) => format!(
                "{} RETURNING {}",
                sql.trim_end().trim_end_matches(';'),
                columns.join(", ")
            ),
        };
        let source = as_c_string(sql.as_str())?;
        unsafe {
            let mut statement = CBox::new(ptr::null_mut::<sqlite3_stmt>(), finalize);
            let mut tail: *const c_char = ptr::null();
            let rc = sqlite3_prepare_v2(
                db,
                source.as_ptr(),
                -1 as c_int,
                &mut *statement,
                &mut tail,
            );
            if rc != SQLITE_OK {
                let error = database_error(db)
                    .context(format!("While preparing the query:\n{}", truncate_long!(sql)));
                log::error!("{:#}", error);
                return Err(error);
            }
            if statement.is_null() {
                let error: Error = KeelError::driver("Cannot prepare an empty statement").into();
                log::error!("{:#}", error);
                return Err(error);
            }
            if !tail.is_null() && !CStr::from_ptr(tail).to_string_lossy().trim().is_empty() {
                let error = Error::from(KeelError::driver(
                    "Cannot prepare more than one statement at a time",
                ))
                .context(format!("While preparing the query:\n{}", truncate_long!(sql)));
                log::error!("{:#}", error);
                return Err(error);
            }
            Ok(Box::new(SqliteStatement::new(
                statement,
                !returning.is_nothing(),
            )))
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.connection.is_null() {
            return Ok(());
        }
        // Statements still alive keep the handle open until they are finalized
        let rc = unsafe { sqlite3_close_v2(*self.connection) };
        if rc != SQLITE_OK {
            let error: Error =
                KeelError::driver_code("Failed to close the sqlite connection", rc).into();
            log::error!("{:#}", error);
            return Err(error);
        }
        self.connection.take();
        Ok(())
    }
}
