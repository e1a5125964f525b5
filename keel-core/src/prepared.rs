use crate::{
    AsValue, Connection, DriverStatement, KeelError, Result, Returning, Value, truncate_long,
};
use std::fmt::{self, Display};

/// A statement prepared on a connection, reusable by [`crate::query`].
///
/// # Binding Semantics
/// * `bind` sets the next parameter, starting from 1.
/// * `bind_index` sets the parameter at `index` (from 1), following calls to
///   `bind` continue after it.
///
/// Methods return `&mut Self` for fluent chaining:
/// ```rust,ignore
/// prepared.bind(42)?.bind("hello")?;
/// ```
pub struct PreparedStatement {
    statement: Option<Box<dyn DriverStatement>>,
    sql: String,
    index: usize,
}

impl PreparedStatement {
    pub fn new(statement: Box<dyn DriverStatement>, sql: impl Into<String>) -> Self {
        Self {
            statement: Some(statement),
            sql: sql.into(),
            index: 1,
        }
    }

    pub fn bind<V: AsValue>(&mut self, value: V) -> Result<&mut Self> {
        let index = self.index;
        self.bind_index(index, value)
    }

    pub fn bind_index<V: AsValue>(&mut self, index: usize, value: V) -> Result<&mut Self> {
        if index == 0 {
            return Err(KeelError::configuration("parameter indexes start at 1").into());
        }
        let value = value.as_value();
        self.statement()?.bind(index, &value)?;
        self.index = index + 1;
        Ok(self)
    }

    /// Bind already converted values, continuing from the next position.
    pub fn bind_values(&mut self, values: &[Value]) -> Result<&mut Self> {
        for value in values {
            let index = self.index;
            self.statement()?.bind(index, value)?;
            self.index = index + 1;
        }
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_closed(&self) -> bool {
        self.statement.is_none()
    }

    /// Next binding position used by `bind`.
    pub fn next_index(&self) -> usize {
        self.index
    }

    /// Record the current bindings as one batch entry and restart binding from 1.
    pub fn add_batch(&mut self) -> Result<&mut Self> {
        self.statement()?.add_batch()?;
        self.index = 1;
        Ok(self)
    }

    pub fn statement(&mut self) -> Result<&mut dyn DriverStatement> {
        match self.statement.as_mut() {
            Some(statement) => {
                let statement: &mut dyn DriverStatement = statement.as_mut();
                Ok(statement)
            }
            None => Err(KeelError::driver(format!(
                "The statement `{}` was already closed",
                truncate_long!(self.sql)
            ))
            .into()),
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    pub(crate) fn release(&mut self) -> Result<()> {
        match self.statement.take() {
            Some(mut statement) => statement.close(),
            None => Ok(()),
        }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("{:#}", e);
        }
    }
}

impl Display for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("index", &self.index)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Prepare `sql` on the connection for later queries.
pub fn prepare(connection: &mut Connection, sql: &str) -> Result<PreparedStatement> {
    prepare_returning(connection, sql, &Returning::Nothing)
}

/// Prepare `sql`, asking the driver to return the `returning` columns of written rows.
pub fn prepare_returning(
    connection: &mut Connection,
    sql: &str,
    returning: &Returning,
) -> Result<PreparedStatement> {
    let statement = connection.raw().prepare(sql, returning)?;
    Ok(PreparedStatement::new(statement, sql))
}
