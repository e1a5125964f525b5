use crate::{
    DriverConnection, IsolationLevel, NestedStrategy, Result, TransactionOptions,
    TransactionStrategy, chain_cleanup, run_in_transaction,
};
use std::{fmt, sync::Arc};

/// Configuration threaded from a [`crate::Connector`] into every connection it opens.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Applied when the dbspec does not carry its own isolation level.
    pub default_isolation: IsolationLevel,
    /// Used when neither the call nor the connection name a strategy.
    pub default_strategy: Arc<dyn TransactionStrategy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::None,
            default_strategy: Arc::new(NestedStrategy),
        }
    }
}

/// One live database session: the driver connection plus the transaction
/// bookkeeping of this layer.
///
/// The flags are scoped to this connection, nothing is shared between
/// connections. A connection must not be used from several threads at the
/// same time.
pub struct Connection {
    raw: Box<dyn DriverConnection>,
    in_transaction: bool,
    rollback_only: bool,
    isolation: IsolationLevel,
    strategy: Option<Arc<dyn TransactionStrategy>>,
    settings: Arc<Settings>,
    closed: bool,
}

impl Connection {
    /// Wrap an already open driver connection, its isolation level is left untouched.
    pub fn new(raw: Box<dyn DriverConnection>) -> Self {
        Self::with_settings(raw, Arc::new(Settings::default()))
    }

    pub(crate) fn with_settings(raw: Box<dyn DriverConnection>, settings: Arc<Settings>) -> Self {
        Self {
            raw,
            in_transaction: false,
            rollback_only: false,
            isolation: IsolationLevel::None,
            strategy: None,
            settings,
            closed: false,
        }
    }

    /// Apply the resolved isolation level, read only flag and schema right
    /// after acquisition. The driver handle is released if any of them fails.
    pub(crate) fn configure(
        mut self,
        isolation: Option<IsolationLevel>,
        read_only: Option<bool>,
        schema: Option<&str>,
    ) -> Result<Self> {
        let level = IsolationLevel::resolve(isolation, self.settings.default_isolation);
        let result = (|| -> Result<()> {
            if !level.is_none() {
                self.raw.set_isolation_level(level)?;
                self.isolation = level;
            }
            if let Some(read_only) = read_only {
                self.raw.set_read_only(read_only)?;
            }
            if let Some(schema) = schema {
                self.raw.set_schema(schema)?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => Ok(self),
            Err(error) => match self.close() {
                Ok(()) => Err(error),
                Err(cleanup) => Err(chain_cleanup(error, cleanup, "closing the connection")),
            },
        }
    }

    /// Attach a transaction strategy, used unless a call supplies its own.
    pub fn with_strategy(mut self, strategy: Arc<dyn TransactionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn set_strategy(&mut self, strategy: Option<Arc<dyn TransactionStrategy>>) {
        self.strategy = strategy;
    }

    /// Strategy attached to this connection, if any.
    pub fn strategy(&self) -> Option<&Arc<dyn TransactionStrategy>> {
        self.strategy.as_ref()
    }

    /// Strategy for a call: `explicit`, then the attached one, then the configured default.
    pub fn resolve_strategy(
        &self,
        explicit: Option<&Arc<dyn TransactionStrategy>>,
    ) -> Arc<dyn TransactionStrategy> {
        explicit
            .or(self.strategy.as_ref())
            .unwrap_or(&self.settings.default_strategy)
            .clone()
    }

    /// Underlying driver connection.
    pub fn raw(&mut self) -> &mut dyn DriverConnection {
        self.raw.as_mut()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Isolation level applied when the connection was opened.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Meant for [`TransactionStrategy`] implementations.
    pub fn set_in_transaction(&mut self, in_transaction: bool) {
        self.in_transaction = in_transaction;
    }

    /// Force the outermost transaction to roll back even if the work succeeds.
    pub fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn unmark_rollback_only(&mut self) {
        self.rollback_only = false;
    }

    /// Only meaningful inside a transaction.
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Shorthand for [`run_in_transaction`] on this connection.
    pub fn transaction<T, F>(&mut self, options: &TransactionOptions, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        run_in_transaction(self, options, work)
    }

    /// Release the driver connection.
    ///
    /// Never commits nor rolls back: closing inside a transaction is a caller
    /// error, the transaction outcome is left to the driver.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.in_transaction {
            log::warn!("Closing a connection while a transaction is still open");
        }
        self.raw.close()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("{:#}", e);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("in_transaction", &self.in_transaction)
            .field("rollback_only", &self.rollback_only)
            .field("isolation", &self.isolation)
            .field("strategy", &self.strategy)
            .field("closed", &self.closed)
            .finish()
    }
}
