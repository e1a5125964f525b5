use crate::{
    Connection, DriverCursor, KeelError, PreparedStatement, Result, Value, lowercase_identifier,
    prepare, truncate_long,
};
use std::{fmt, sync::Arc};

/// Column label transformation producing record keys.
pub type Identifiers = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Shared column names of the records of one result.
pub type RowNames = Arc<[String]>;

/// How a query exposes its rows.
#[derive(Clone)]
pub struct QueryOptions {
    /// Rows are read on demand from the cursor instead of collected upfront.
    pub lazy: bool,
    /// Rows are positional tuples instead of keyed records.
    pub as_arrays: bool,
    /// Turns a column label into a record key, lowercase by default.
    pub identifiers: Identifiers,
    /// Forwarded to the driver statement before execution.
    pub fetch_size: Option<u32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            as_arrays: false,
            identifiers: Arc::new(lowercase_identifier),
            fetch_size: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn as_arrays(mut self, as_arrays: bool) -> Self {
        self.as_arrays = as_arrays;
        self
    }

    pub fn identifiers<F>(mut self, identifiers: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.identifiers = Arc::new(identifiers);
        self
    }

    pub fn fetch_size(mut self, rows: u32) -> Self {
        self.fetch_size = Some(rows);
        self
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("lazy", &self.lazy)
            .field("as_arrays", &self.as_arrays)
            .field("fetch_size", &self.fetch_size)
            .finish_non_exhaustive()
    }
}

/// A row keyed by the transformed column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub keys: RowNames,
    pub values: Box<[Value]>,
}

impl Record {
    pub fn new(keys: RowNames, values: Box<[Value]>) -> Self {
        Self { keys, values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Record(Record),
    Tuple(Box<[Value]>),
}

impl Row {
    pub fn values(&self) -> &[Value] {
        match self {
            Row::Record(record) => &record.values,
            Row::Tuple(values) => values,
        }
    }

    /// Value by record key, always `None` for tuples.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Row::Record(record) => record.get(key),
            Row::Tuple(..) => None,
        }
    }

    pub fn into_values(self) -> Box<[Value]> {
        match self {
            Row::Record(record) => record.values,
            Row::Tuple(values) => values,
        }
    }
}

/// What [`query`] runs.
#[derive(Debug)]
pub enum Statement {
    /// Literal sql text.
    Sql(String),
    /// Sql text followed by its positional parameters.
    Parameterized(String, Vec<Value>),
    /// A statement prepared upfront, its bindings are kept.
    Prepared(PreparedStatement),
}

impl From<&str> for Statement {
    fn from(value: &str) -> Self {
        Statement::Sql(value.into())
    }
}

impl From<String> for Statement {
    fn from(value: String) -> Self {
        Statement::Sql(value)
    }
}

impl<S: Into<String>> From<(S, Vec<Value>)> for Statement {
    fn from((sql, params): (S, Vec<Value>)) -> Self {
        Statement::Parameterized(sql.into(), params)
    }
}

impl From<PreparedStatement> for Statement {
    fn from(value: PreparedStatement) -> Self {
        Statement::Prepared(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Not advanced since the last row was read.
    Unknown,
    /// Advanced onto a row not read yet.
    Ready,
    Exhausted,
}

/// Forward only, single pass row source.
///
/// `has_next` advances the driver cursor at most once per row, nothing is
/// fetched until asked. Once closed every read fails with
/// [`KeelError::ClosedCursor`].
pub struct Cursor {
    cursor: Option<Box<dyn DriverCursor>>,
    labels: RowNames,
    keys: RowNames,
    as_arrays: bool,
    position: Position,
    fused: bool,
}

impl Cursor {
    /// Reads the column labels, the cursor is not advanced.
    pub fn new(
        mut cursor: Box<dyn DriverCursor>,
        identifiers: &(dyn Fn(&str) -> String + Send + Sync),
        as_arrays: bool,
    ) -> Result<Self> {
        let count = cursor.column_count()?;
        let labels = (0..count)
            .map(|i| cursor.column_label(i))
            .collect::<Result<Vec<_>>>()?;
        let keys: RowNames = if as_arrays {
            labels.clone().into()
        } else {
            labels.iter().map(|v| identifiers(v)).collect()
        };
        Ok(Self {
            cursor: Some(cursor),
            labels: labels.into(),
            keys,
            as_arrays,
            position: Position::Unknown,
            fused: false,
        })
    }

    /// Column labels as reported by the driver.
    pub fn labels(&self) -> &RowNames {
        &self.labels
    }

    /// Record keys, the labels when rows are tuples.
    pub fn columns(&self) -> &RowNames {
        &self.keys
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    fn driver(&mut self) -> Result<&mut Box<dyn DriverCursor>> {
        self.cursor
            .as_mut()
            .ok_or_else(|| KeelError::ClosedCursor.into())
    }

    pub fn has_next(&mut self) -> Result<bool> {
        let position = self.position;
        let cursor = self.driver()?;
        if position == Position::Unknown {
            let advanced = cursor.advance()?;
            self.position = if advanced {
                Position::Ready
            } else {
                Position::Exhausted
            };
        }
        Ok(self.position == Position::Ready)
    }

    /// Next row, `None` once exhausted.
    pub fn read_next(&mut self) -> Result<Option<Row>> {
        if !self.has_next()? {
            return Ok(None);
        }
        let count = self.keys.len();
        let cursor = self.driver()?;
        let values = (0..count)
            .map(|i| cursor.get(i))
            .collect::<Result<Box<[Value]>>>()?;
        self.position = Position::Unknown;
        Ok(Some(if self.as_arrays {
            Row::Tuple(values)
        } else {
            Row::Record(Record::new(self.keys.clone(), values))
        }))
    }

    pub fn close(&mut self) -> Result<()> {
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.read_next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.fused = true;
                None
            }
            Err(error) => {
                self.fused = true;
                Some(Err(error))
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{:#}", e);
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("labels", &self.labels)
            .field("as_arrays", &self.as_arrays)
            .field("position", &self.position)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Rows of a [`QueryResult`], depending on [`QueryOptions::lazy`].
#[derive(Debug)]
pub enum Data<'a> {
    Realized(&'a [Row]),
    Lazy(&'a mut Cursor),
}

/// A live query: the statement, its cursor and, unless lazy, the collected rows.
///
/// Closing (or dropping) it releases the cursor and the statement together.
#[derive(Debug)]
pub struct QueryResult {
    cursor: Cursor,
    statement: PreparedStatement,
    rows: Option<Vec<Row>>,
}

impl QueryResult {
    pub fn data(&mut self) -> Data<'_> {
        match &self.rows {
            Some(rows) => Data::Realized(rows),
            None => Data::Lazy(&mut self.cursor),
        }
    }

    /// Collected rows, `None` for a lazy result.
    pub fn rows(&self) -> Option<&[Row]> {
        self.rows.as_deref()
    }

    pub fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    pub fn columns(&self) -> &RowNames {
        self.cursor.columns()
    }

    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    /// Every row: the collected ones, or whatever the cursor still yields.
    /// Resources are released before returning.
    pub fn into_rows(mut self) -> Result<Vec<Row>> {
        let rows = match self.rows.take() {
            Some(rows) => rows,
            None => self.cursor.by_ref().collect::<Result<_>>()?,
        };
        self.close()?;
        Ok(rows)
    }

    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let cursor = self.cursor.close();
        let statement = self.statement.release();
        cursor.and(statement)
    }
}

impl Drop for QueryResult {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("{:#}", e);
        }
    }
}

/// Run a query and expose its rows, collected upfront or lazily.
///
/// A lazy result only positions the cursor, rows are fetched while read.
pub fn query(
    connection: &mut Connection,
    statement: impl Into<Statement>,
    options: &QueryOptions,
) -> Result<QueryResult> {
    let mut statement = match statement.into() {
        Statement::Sql(sql) => prepare(connection, &sql)?,
        Statement::Parameterized(sql, params) => {
            let mut prepared = prepare(connection, &sql)?;
            prepared.bind_values(&params)?;
            prepared
        }
        Statement::Prepared(prepared) => prepared,
    };
    log::debug!("Query `{}`", truncate_long!(statement.sql()));
    if let Some(rows) = options.fetch_size {
        statement.statement()?.set_fetch_size(rows)?;
    }
    let raw = statement.statement()?.execute_query()?;
    let mut cursor = Cursor::new(raw, options.identifiers.as_ref(), options.as_arrays)?;
    let rows = if options.lazy {
        None
    } else {
        Some(cursor.by_ref().collect::<Result<Vec<_>>>()?)
    };
    Ok(QueryResult {
        cursor,
        statement,
        rows,
    })
}

/// First row of the query, the remaining ones are never fetched.
pub fn query_one(
    connection: &mut Connection,
    statement: impl Into<Statement>,
    options: &QueryOptions,
) -> Result<Option<Row>> {
    let options = options.clone().lazy(true);
    let mut result = query(connection, statement, &options)?;
    let row = result.cursor().read_next()?;
    result.close()?;
    Ok(row)
}
