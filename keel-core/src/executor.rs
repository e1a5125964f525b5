use crate::{
    Connection, Cursor, Identifiers, Result, Returning, Row, Value, lowercase_identifier,
    prepare_returning, truncate_long,
};
use std::{fmt, sync::Arc};

/// Run every command as a single batch, in submission order.
///
/// Returns one affected row count per command. A failing command surfaces a
/// [`crate::KeelError::Batch`] carrying the counts the driver could report.
pub fn execute(connection: &mut Connection, commands: &[&str]) -> Result<Vec<u64>> {
    log::debug!("Executing a batch of {} commands", commands.len());
    connection.raw().execute_batch(commands)
}

/// Options of [`execute_prepared`].
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Columns of the written rows to return instead of update counts.
    pub returning: Returning,
    /// Record key transformation of the returned rows.
    pub identifiers: Identifiers,
    /// Returned rows are positional tuples.
    pub as_arrays: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            returning: Returning::Nothing,
            identifiers: Arc::new(lowercase_identifier),
            as_arrays: false,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    pub fn identifiers<F>(mut self, identifiers: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.identifiers = Arc::new(identifiers);
        self
    }

    pub fn as_arrays(mut self, as_arrays: bool) -> Self {
        self.as_arrays = as_arrays;
        self
    }
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("returning", &self.returning)
            .field("as_arrays", &self.as_arrays)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`execute_prepared`].
#[derive(Debug, Clone, PartialEq)]
pub enum Executed {
    /// One update count per parameter group.
    Counts(Vec<u64>),
    /// Rows returned by the statement, see [`ExecuteOptions::returning`].
    Rows(Vec<Row>),
}

impl Executed {
    pub fn counts(&self) -> Option<&[u64]> {
        match self {
            Executed::Counts(counts) => Some(counts),
            Executed::Rows(..) => None,
        }
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Executed::Rows(rows) => Some(rows),
            Executed::Counts(..) => None,
        }
    }
}

/// Prepare `sql` once and run it for every parameter group as one batch.
///
/// Each group binds positionally starting from 1, groups run in order. With no
/// groups the statement runs once without parameters.
pub fn execute_prepared(
    connection: &mut Connection,
    sql: &str,
    groups: &[Vec<Value>],
    options: &ExecuteOptions,
) -> Result<Executed> {
    let mut prepared = prepare_returning(connection, sql, &options.returning)?;
    log::debug!(
        "Executing `{}` with {} parameter groups",
        truncate_long!(sql),
        groups.len()
    );
    if groups.is_empty() {
        prepared.add_batch()?;
    }
    for group in groups {
        prepared.bind_values(group)?.add_batch()?;
    }
    let counts = prepared.statement()?.execute_batch()?;
    let result = if options.returning.is_nothing() {
        Executed::Counts(counts)
    } else {
        let keys = prepared.statement()?.generated_keys()?;
        let mut cursor = Cursor::new(keys, options.identifiers.as_ref(), options.as_arrays)?;
        let rows = cursor.by_ref().collect::<Result<Vec<_>>>()?;
        cursor.close()?;
        Executed::Rows(rows)
    };
    prepared.close()?;
    Ok(result)
}
