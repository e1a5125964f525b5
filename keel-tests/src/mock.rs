use keel_core::{
    DataSource, Driver, DriverConnection, DriverCursor, DriverStatement, Error, IsolationLevel,
    KeelError, Properties, Result, Returning, Savepoint, Value,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

/// Driver interaction recorded by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(String, Properties),
    SetAutoCommit(bool),
    SetIsolation(IsolationLevel),
    SetReadOnly(bool),
    SetSchema(String),
    Commit,
    /// Name of the savepoint, `None` for a full rollback.
    Rollback(Option<String>),
    Savepoint(String),
    Release(String),
    ExecuteBatch(Vec<String>),
    Prepare(String, Returning),
    /// Bindings of every batch entry, in execution order.
    StatementBatch(Vec<Vec<Value>>),
    FetchSize(u32),
    ExecuteQuery(Vec<Value>),
    Advance,
    CloseCursor,
    CloseStatement,
    Close,
}

/// Operations the mock can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    SetAutoCommit,
    SetIsolation,
    SetReadOnly,
    SetSchema,
    Commit,
    Rollback,
    Savepoint,
    Release,
    ExecuteBatch,
    Prepare,
    Advance,
    Close,
}

#[derive(Debug)]
pub struct MockState {
    pub events: Vec<Event>,
    pub auto_commit: bool,
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub labels: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub failing: HashSet<Operation>,
    /// Every simulated failure, in order.
    pub failures: Vec<Operation>,
    pub unsupported: Vec<IsolationLevel>,
    savepoints: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            read_only: false,
            labels: Vec::new(),
            rows: Vec::new(),
            failing: HashSet::new(),
            failures: Vec::new(),
            unsupported: Vec::new(),
            savepoints: 0,
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Record `event`, failing instead when `operation` was configured to fail.
fn record(state: &Shared, operation: Option<Operation>, event: Event) -> Result<()> {
    let mut state = lock(state);
    if let Some(operation) = operation {
        if state.failing.contains(&operation) {
            state.failures.push(operation);
            return Err(KeelError::driver(format!("Simulated failure of {:?}", operation)).into());
        }
    }
    state.events.push(event);
    Ok(())
}

/// Driver registered as `mock`, recording every interaction of the
/// connections it opens. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Shared,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by every query and by writes asking for returned rows.
    pub fn with_rows<L: Into<String>>(
        self,
        labels: impl IntoIterator<Item = L>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        {
            let mut state = lock(&self.state);
            state.labels = labels.into_iter().map(Into::into).collect();
            state.rows = rows;
        }
        self
    }

    pub fn with_auto_commit(self, auto_commit: bool) -> Self {
        lock(&self.state).auto_commit = auto_commit;
        self
    }

    pub fn unsupported(self, level: IsolationLevel) -> Self {
        lock(&self.state).unsupported.push(level);
        self
    }

    pub fn fail_on(&self, operation: Operation) {
        lock(&self.state).failing.insert(operation);
    }

    pub fn succeed_on(&self, operation: Operation) {
        lock(&self.state).failing.remove(&operation);
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.state).events.clone()
    }

    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }

    /// Number of recorded events equal to `event`.
    pub fn count(&self, event: &Event) -> usize {
        lock(&self.state)
            .events
            .iter()
            .filter(|v| *v == event)
            .count()
    }

    /// Number of recorded rollbacks, full or to a savepoint.
    pub fn rollbacks(&self) -> usize {
        lock(&self.state)
            .events
            .iter()
            .filter(|v| matches!(v, Event::Rollback(..)))
            .count()
    }

    pub fn open_connection(&self) -> MockConnection {
        MockConnection {
            state: self.state.clone(),
        }
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(
        &self,
        subname: &str,
        properties: &Properties,
    ) -> Result<Box<dyn DriverConnection>> {
        record(
            &self.state,
            Some(Operation::Connect),
            Event::Connect(subname.into(), properties.clone()),
        )?;
        Ok(Box::new(self.open_connection()))
    }
}

impl DataSource for MockDriver {
    fn connection(&self, credentials: Option<(&str, &str)>) -> Result<Box<dyn DriverConnection>> {
        let mut properties = Properties::new();
        if let Some((user, password)) = credentials {
            properties.insert("user".into(), user.into());
            properties.insert("password".into(), password.into());
        }
        record(
            &self.state,
            Some(Operation::Connect),
            Event::Connect("datasource".into(), properties),
        )?;
        Ok(Box::new(self.open_connection()))
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: Shared,
}

impl DriverConnection for MockConnection {
    fn auto_commit(&mut self) -> Result<bool> {
        Ok(lock(&self.state).auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        record(
            &self.state,
            Some(Operation::SetAutoCommit),
            Event::SetAutoCommit(auto_commit),
        )?;
        lock(&self.state).auto_commit = auto_commit;
        Ok(())
    }

    fn isolation_level(&mut self) -> Result<IsolationLevel> {
        Ok(lock(&self.state).isolation)
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        if lock(&self.state).unsupported.contains(&level) {
            return Err(KeelError::driver_code(
                format!("Isolation level {} is not supported", level),
                1,
            )
            .into());
        }
        record(
            &self.state,
            Some(Operation::SetIsolation),
            Event::SetIsolation(level),
        )?;
        lock(&self.state).isolation = level;
        Ok(())
    }

    fn read_only(&mut self) -> Result<bool> {
        Ok(lock(&self.state).read_only)
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        record(
            &self.state,
            Some(Operation::SetReadOnly),
            Event::SetReadOnly(read_only),
        )?;
        lock(&self.state).read_only = read_only;
        Ok(())
    }

    fn set_schema(&mut self, schema: &str) -> Result<()> {
        record(
            &self.state,
            Some(Operation::SetSchema),
            Event::SetSchema(schema.into()),
        )
    }

    fn commit(&mut self) -> Result<()> {
        record(&self.state, Some(Operation::Commit), Event::Commit)
    }

    fn rollback(&mut self, savepoint: Option<&Savepoint>) -> Result<()> {
        record(
            &self.state,
            Some(Operation::Rollback),
            Event::Rollback(savepoint.map(|v| v.name.clone())),
        )
    }

    fn set_savepoint(&mut self) -> Result<Savepoint> {
        let id = {
            let mut state = lock(&self.state);
            state.savepoints += 1;
            state.savepoints
        };
        let savepoint = Savepoint::new(id, format!("sp{}", id));
        record(
            &self.state,
            Some(Operation::Savepoint),
            Event::Savepoint(savepoint.name.clone()),
        )?;
        Ok(savepoint)
    }

    fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        record(
            &self.state,
            Some(Operation::Release),
            Event::Release(savepoint.name.clone()),
        )
    }

    fn execute_batch(&mut self, commands: &[&str]) -> Result<Vec<u64>> {
        record(
            &self.state,
            Some(Operation::ExecuteBatch),
            Event::ExecuteBatch(commands.iter().map(|v| v.to_string()).collect()),
        )?;
        if commands.iter().any(|v| v.contains("FAIL")) {
            return Err(KeelError::batch("Simulated batch failure", None).into());
        }
        Ok(vec![1; commands.len()])
    }

    fn prepare(&mut self, sql: &str, returning: &Returning) -> Result<Box<dyn DriverStatement>> {
        record(
            &self.state,
            Some(Operation::Prepare),
            Event::Prepare(sql.into(), returning.clone()),
        )?;
        Ok(Box::new(MockStatement {
            state: self.state.clone(),
            current: Vec::new(),
            batch: Vec::new(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        record(&self.state, Some(Operation::Close), Event::Close)
    }
}

#[derive(Debug)]
pub struct MockStatement {
    state: Shared,
    current: Vec<Value>,
    batch: Vec<Vec<Value>>,
}

impl MockStatement {
    fn cursor(&self) -> MockCursor {
        let state = lock(&self.state);
        MockCursor {
            state: self.state.clone(),
            labels: state.labels.clone(),
            rows: state.rows.clone().into_iter(),
            current: None,
        }
    }
}

impl DriverStatement for MockStatement {
    fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        if self.current.len() < index {
            self.current.resize(index, Value::Null);
        }
        self.current[index - 1] = value.clone();
        Ok(())
    }

    fn add_batch(&mut self) -> Result<()> {
        self.batch.push(std::mem::take(&mut self.current));
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let batch = std::mem::take(&mut self.batch);
        let counts = vec![1; batch.len()];
        record(&self.state, None, Event::StatementBatch(batch))?;
        Ok(counts)
    }

    fn generated_keys(&mut self) -> Result<Box<dyn DriverCursor>> {
        Ok(Box::new(self.cursor()))
    }

    fn execute_query(&mut self) -> Result<Box<dyn DriverCursor>> {
        record(&self.state, None, Event::ExecuteQuery(self.current.clone()))?;
        Ok(Box::new(self.cursor()))
    }

    fn set_fetch_size(&mut self, rows: u32) -> Result<()> {
        record(&self.state, None, Event::FetchSize(rows))
    }

    fn close(&mut self) -> Result<()> {
        record(&self.state, None, Event::CloseStatement)
    }
}

#[derive(Debug)]
pub struct MockCursor {
    state: Shared,
    labels: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
    current: Option<Vec<Value>>,
}

impl DriverCursor for MockCursor {
    fn column_count(&mut self) -> Result<usize> {
        Ok(self.labels.len())
    }

    fn column_label(&mut self, index: usize) -> Result<String> {
        self.labels
            .get(index)
            .cloned()
            .ok_or_else(|| Error::msg(format!("No column {}", index)))
    }

    fn advance(&mut self) -> Result<bool> {
        record(&self.state, Some(Operation::Advance), Event::Advance)?;
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get(&mut self, index: usize) -> Result<Value> {
        self.current
            .as_ref()
            .and_then(|v| v.get(index))
            .cloned()
            .ok_or_else(|| Error::msg(format!("No value at {}", index)))
    }

    fn close(&mut self) -> Result<()> {
        record(&self.state, None, Event::CloseCursor)
    }
}
