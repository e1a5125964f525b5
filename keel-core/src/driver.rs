use crate::{IsolationLevel, Result, Value};
use std::{collections::BTreeMap, fmt::Debug};

/// Properties handed to a driver when opening a connection (user, password
/// and any other leftover dbspec entry).
pub type Properties = BTreeMap<String, String>;

/// A database driver: opens driver connections.
///
/// Drivers are registered in a [`crate::DriverRegistry`] under their name and
/// resolved from the dbspec `classname` or `subprotocol`.
pub trait Driver: Send + Sync + Debug {
    /// Name the driver is registered under.
    fn name(&self) -> &str;

    /// Open a connection, `subname` is the driver specific connection target.
    fn connect(&self, subname: &str, properties: &Properties)
    -> Result<Box<dyn DriverConnection>>;
}

/// A source of already configured connections, usually a connection pool.
///
/// Pool sizing, eviction and health checks belong to the source.
pub trait DataSource: Send + Sync + Debug {
    /// Acquire a connection, optionally with explicit credentials.
    fn connection(&self, credentials: Option<(&str, &str)>) -> Result<Box<dyn DriverConnection>>;
}

/// Marker of a position inside an active transaction that can be rolled back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    pub id: u64,
    pub name: String,
}

impl Savepoint {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Which columns a statement must return after a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Returning {
    /// Return update counts.
    #[default]
    Nothing,
    /// Return every column of the written rows.
    All,
    /// Return only the named columns.
    Columns(Vec<String>),
}

impl Returning {
    pub fn is_nothing(&self) -> bool {
        matches!(self, Returning::Nothing)
    }
}

/// A live driver session, exclusively owned by one [`crate::Connection`].
///
/// Every method performs blocking I/O on the calling thread.
pub trait DriverConnection: Send {
    fn auto_commit(&mut self) -> Result<bool>;
    /// Enabling auto commit while a transaction is open commits it.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;
    fn isolation_level(&mut self) -> Result<IsolationLevel>;
    /// Must fail with a driver error when the level is not supported.
    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;
    fn read_only(&mut self) -> Result<bool>;
    fn set_read_only(&mut self, read_only: bool) -> Result<()>;
    fn set_schema(&mut self, schema: &str) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    /// Roll back the whole transaction, or up to `savepoint` when given.
    fn rollback(&mut self, savepoint: Option<&Savepoint>) -> Result<()>;
    fn set_savepoint(&mut self) -> Result<Savepoint>;
    fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<()>;
    /// Run the commands in submission order as a single batch.
    fn execute_batch(&mut self, commands: &[&str]) -> Result<Vec<u64>>;
    fn prepare(&mut self, sql: &str, returning: &Returning) -> Result<Box<dyn DriverStatement>>;
    fn close(&mut self) -> Result<()>;
}

/// A prepared statement with 1-indexed positional parameters.
pub trait DriverStatement: Send {
    fn bind(&mut self, index: usize, value: &Value) -> Result<()>;
    /// Record the current bindings as one batch entry.
    fn add_batch(&mut self) -> Result<()>;
    /// Run every recorded batch entry in order, one count per entry.
    fn execute_batch(&mut self) -> Result<Vec<u64>>;
    /// Rows returned by the last write, see [`Returning`].
    fn generated_keys(&mut self) -> Result<Box<dyn DriverCursor>>;
    fn execute_query(&mut self) -> Result<Box<dyn DriverCursor>>;
    /// Hint about how many rows to fetch per round trip.
    fn set_fetch_size(&mut self, _rows: u32) -> Result<()> {
        Ok(())
    }
    fn close(&mut self) -> Result<()>;
}

/// Forward only row source of an executed statement.
pub trait DriverCursor: Send {
    fn column_count(&mut self) -> Result<usize>;
    /// Column label, `index` starts at 0.
    fn column_label(&mut self, index: usize) -> Result<String>;
    /// Move to the next row, `false` when exhausted.
    fn advance(&mut self) -> Result<bool>;
    /// Cell of the current row, `index` starts at 0.
    fn get(&mut self, index: usize) -> Result<Value>;
    fn close(&mut self) -> Result<()>;
}
