use crate::{
    Connection, Error, IsolationLevel, KeelError, Result, Savepoint, chain_cleanup, log_error,
};
use std::{fmt::Debug, sync::Arc};

/// Options of a single [`run_in_transaction`] call.
///
/// `isolation` and `read_only` only apply when the call starts a real
/// transaction, nested calls ignore them.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: Option<bool>,
    /// When `false`, a call made inside a transaction fails with
    /// [`KeelError::NestedTransactionDisabled`].
    pub savepoints: bool,
    /// Overrides the connection strategy for this call.
    pub strategy: Option<Arc<dyn TransactionStrategy>>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation: None,
            read_only: None,
            savepoints: true,
            strategy: None,
        }
    }
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn savepoints(mut self, savepoints: bool) -> Self {
        self.savepoints = savepoints;
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn TransactionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Driver state captured when a real transaction starts, restored when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootScope {
    pub auto_commit: bool,
    /// Isolation level before the transaction, when the call changed it.
    pub isolation: Option<IsolationLevel>,
    /// Read only flag before the transaction, when the call changed it.
    pub read_only: Option<bool>,
}

/// What a [`TransactionStrategy::begin`] call opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A real transaction on an idle connection.
    Root(RootScope),
    /// A savepoint inside an already running transaction.
    Savepoint(Savepoint),
    /// Nothing, the strategy does not manage transactions.
    Unmanaged,
}

/// Policy deciding how a transaction begins, commits and rolls back.
///
/// Strategies update the connection flags themselves through
/// [`Connection::set_in_transaction`] and the rollback only accessors.
pub trait TransactionStrategy: Send + Sync + Debug {
    fn begin(&self, connection: &mut Connection, options: &TransactionOptions) -> Result<Scope>;
    fn commit(
        &self,
        connection: &mut Connection,
        scope: &Scope,
        options: &TransactionOptions,
    ) -> Result<()>;
    fn rollback(
        &self,
        connection: &mut Connection,
        scope: &Scope,
        options: &TransactionOptions,
    ) -> Result<()>;
}

/// Default strategy: a real transaction on an idle connection, a savepoint
/// when one is already running.
#[derive(Debug, Default, Clone, Copy)]
pub struct NestedStrategy;

impl NestedStrategy {
    fn begin_root(connection: &mut Connection, options: &TransactionOptions) -> Result<RootScope> {
        let raw = connection.raw();
        let mut scope = RootScope {
            auto_commit: raw.auto_commit()?,
            isolation: None,
            read_only: None,
        };
        let result = (|| -> Result<()> {
            if let Some(level) = options.isolation.filter(|v| !v.is_none()) {
                let previous = raw.isolation_level()?;
                raw.set_isolation_level(level)?;
                scope.isolation = Some(previous);
            }
            if let Some(read_only) = options.read_only {
                let previous = raw.read_only()?;
                raw.set_read_only(read_only)?;
                scope.read_only = Some(previous);
            }
            raw.set_auto_commit(false)
        })();
        if let Err(error) = result {
            return Err(match Self::restore(connection, &scope, false) {
                Ok(()) => error,
                Err(cleanup) => chain_cleanup(error, cleanup, "restoring the connection"),
            });
        }
        connection.set_in_transaction(true);
        connection.unmark_rollback_only();
        log::debug!("Transaction started (auto commit was {})", scope.auto_commit);
        Ok(scope)
    }

    /// Back to idle, then restore what `begin` changed. Every step runs, the
    /// first failure is returned.
    fn finish(connection: &mut Connection, scope: &RootScope) -> Result<()> {
        connection.set_in_transaction(false);
        connection.unmark_rollback_only();
        Self::restore(connection, scope, true)
    }

    /// Outcome of a full rollback followed by `finish`, the rollback failure wins.
    fn settle(rollback: Result<()>, finish: Result<()>) -> Result<()> {
        match (rollback, finish) {
            (Ok(()), finish) => finish,
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(cleanup)) => {
                Err(chain_cleanup(error, cleanup, "restoring the connection"))
            }
        }
    }

    /// Put back what `begin` changed, auto commit only when `auto_commit` is set.
    fn restore(connection: &mut Connection, scope: &RootScope, auto_commit: bool) -> Result<()> {
        let raw = connection.raw();
        let mut failure: Option<Error> = None;
        let mut collect = |result: Result<()>, action: &str| {
            if let Err(error) = result {
                failure = Some(match failure.take() {
                    None => error,
                    Some(first) => chain_cleanup(first, error, action),
                });
            }
        };
        if auto_commit {
            collect(
                raw.set_auto_commit(scope.auto_commit),
                "restoring auto commit",
            );
        }
        if let Some(level) = scope.isolation {
            collect(
                raw.set_isolation_level(level),
                "restoring the isolation level",
            );
        }
        if let Some(read_only) = scope.read_only {
            collect(raw.set_read_only(read_only), "restoring the read only flag");
        }
        match failure {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

impl TransactionStrategy for NestedStrategy {
    fn begin(&self, connection: &mut Connection, options: &TransactionOptions) -> Result<Scope> {
        if connection.in_transaction() {
            if options.isolation.is_some() || options.read_only.is_some() {
                log::warn!(
                    "Isolation level and read only options are ignored by a nested transaction"
                );
            }
            let savepoint = connection.raw().set_savepoint()?;
            log::debug!("Savepoint `{}` created", savepoint.name);
            return Ok(Scope::Savepoint(savepoint));
        }
        Ok(Scope::Root(Self::begin_root(connection, options)?))
    }

    fn commit(
        &self,
        connection: &mut Connection,
        scope: &Scope,
        _options: &TransactionOptions,
    ) -> Result<()> {
        match scope {
            Scope::Root(root) => {
                if connection.is_rollback_only() {
                    log::debug!("Transaction marked rollback only, rolling back");
                    let rollback = connection.raw().rollback(None);
                    let finish = Self::finish(connection, root);
                    return Self::settle(rollback, finish);
                }
                connection.raw().commit()?;
                log::debug!("Transaction committed");
                Self::finish(connection, root)
            }
            Scope::Savepoint(savepoint) => {
                connection.raw().release_savepoint(savepoint)?;
                log::debug!("Savepoint `{}` released", savepoint.name);
                Ok(())
            }
            Scope::Unmanaged => Ok(()),
        }
    }

    fn rollback(
        &self,
        connection: &mut Connection,
        scope: &Scope,
        _options: &TransactionOptions,
    ) -> Result<()> {
        match scope {
            Scope::Root(root) => {
                let rollback = connection.raw().rollback(None);
                let finish = Self::finish(connection, root);
                log::debug!("Transaction rolled back");
                Self::settle(rollback, finish)
            }
            Scope::Savepoint(savepoint) => {
                connection.raw().rollback(Some(savepoint))?;
                log::debug!("Rolled back to savepoint `{}`", savepoint.name);
                Ok(())
            }
            Scope::Unmanaged => Ok(()),
        }
    }
}

/// Strategy that never touches the driver, for transactions managed
/// elsewhere and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStrategy;

impl TransactionStrategy for NoopStrategy {
    fn begin(&self, _connection: &mut Connection, _options: &TransactionOptions) -> Result<Scope> {
        Ok(Scope::Unmanaged)
    }

    fn commit(
        &self,
        _connection: &mut Connection,
        _scope: &Scope,
        _options: &TransactionOptions,
    ) -> Result<()> {
        Ok(())
    }

    fn rollback(
        &self,
        _connection: &mut Connection,
        _scope: &Scope,
        _options: &TransactionOptions,
    ) -> Result<()> {
        Ok(())
    }
}

/// Runs `work` inside a transaction and returns its result.
///
/// On an idle connection this starts a real transaction, committed when
/// `work` succeeds (or rolled back when the connection was marked rollback
/// only). Inside a running transaction it uses a savepoint instead, so the
/// outer transaction decides the final outcome.
///
/// When `work` or the commit fails the scope is rolled back and the original
/// error is returned, with any rollback failure attached as context.
pub fn run_in_transaction<T, F>(
    connection: &mut Connection,
    options: &TransactionOptions,
    work: F,
) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T>,
{
    if connection.in_transaction() && !options.savepoints {
        return Err(log_error!(KeelError::NestedTransactionDisabled));
    }
    let strategy = connection.resolve_strategy(options.strategy.as_ref());
    let scope = strategy.begin(connection, options)?;
    let result = match work(connection) {
        Ok(value) => match strategy.commit(connection, &scope, options) {
            Ok(()) => return Ok(value),
            Err(error) => {
                // A root scope that already went back to idle has nothing left to roll back
                if matches!(scope, Scope::Root(..)) && !connection.in_transaction() {
                    return Err(error);
                }
                error
            }
        },
        Err(error) => error,
    };
    match strategy.rollback(connection, &scope, options) {
        Ok(()) => Err(result),
        Err(cleanup) => Err(chain_cleanup(result, cleanup, "rolling back")),
    }
}
