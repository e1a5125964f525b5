mod batch;
mod mock;
mod prepared;
mod simple;
mod transactions;

pub use mock::*;

use crate::{
    batch::batch,
    prepared::prepared,
    simple::simple,
    transactions::{nested_transactions, rollback_only, transactions},
};
use keel_core::Connection;
use log::LevelFilter;
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Driver agnostic suites, the connection must start idle with auto commit enabled.
pub fn execute_tests(connection: &mut Connection) {
    simple(connection);
    prepared(connection);
    batch(connection);
    transactions(connection);
    nested_transactions(connection);
    rollback_only(connection);
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
