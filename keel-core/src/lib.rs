mod as_value;
mod connection;
mod connector;
mod dbspec;
mod driver;
mod error;
mod executor;
mod isolation;
mod prepared;
mod query;
mod transaction;
mod util;
mod value;

pub use ::anyhow::Context;
pub use as_value::*;
pub use connection::*;
pub use connector::*;
pub use dbspec::*;
pub use driver::*;
pub use error::*;
pub use executor::*;
pub use isolation::*;
pub use prepared::*;
pub use query::*;
pub use transaction::*;
pub use util::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
