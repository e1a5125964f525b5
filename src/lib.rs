//! Explicit connection and transaction management on top of blocking database
//! drivers.
//!
//! A [`Connector`] resolves a dbspec (connection string, field map or data
//! source) to a registered [`Driver`] and hands out [`Connection`] wrappers.
//! Work runs inside [`run_in_transaction`], which nests through savepoints and
//! delegates the begin, commit and rollback policy to a [`TransactionStrategy`].
//! Queries expose their rows eagerly or through a lazy [`Cursor`].
//!
//! ```ignore
//! use keel::{Connector, QueryOptions, TransactionOptions, execute, query};
//! use keel_sqlite::SqliteDriver;
//! use std::sync::Arc;
//!
//! let connector = Connector::new().with_driver(Arc::new(SqliteDriver::new()));
//! let mut connection = connector.open("sqlite::memory:")?;
//! connection.transaction(&TransactionOptions::default(), |connection| {
//!     execute(connection, &["CREATE TABLE t (v INTEGER)", "INSERT INTO t VALUES (1)"])?;
//!     Ok(())
//! })?;
//! let rows = query(&mut connection, "SELECT v FROM t", &QueryOptions::default())?.into_rows()?;
//! ```
pub use keel_core::*;
