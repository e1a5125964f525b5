#[cfg(test)]
mod tests {
    use keel_core::{
        Connection, Connector, Error, IsolationLevel, KeelError, NestedStrategy, NoopStrategy,
        Result, Scope, TransactionOptions, TransactionStrategy, error_kind, run_in_transaction,
    };
    use keel_tests::{Event, MockDriver, Operation, init_logs, silent_logs};
    use std::sync::Arc;

    fn connect(driver: &MockDriver) -> Connection {
        let connection = Connector::new()
            .with_driver(Arc::new(driver.clone()))
            .open("mock://localhost/app")
            .expect("Could not open the mock connection");
        driver.clear_events();
        connection
    }

    fn default() -> TransactionOptions {
        TransactionOptions::default()
    }

    #[test]
    fn commit_restores_auto_commit() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        let value = run_in_transaction(&mut connection, &default(), |connection| {
            assert!(connection.in_transaction());
            Ok(7)
        })
        .expect("The transaction should commit");
        assert_eq!(value, 7);
        assert!(!connection.in_transaction());
        assert_eq!(
            driver.events(),
            [
                Event::SetAutoCommit(false),
                Event::Commit,
                Event::SetAutoCommit(true),
            ]
        );
        assert!(driver.state().auto_commit);
    }

    #[test]
    fn auto_commit_restored_to_previous_value() {
        init_logs();
        let driver = MockDriver::new().with_auto_commit(false);
        let mut connection = connect(&driver);
        run_in_transaction(&mut connection, &default(), |_| Ok(()))
            .expect("The transaction should commit");
        assert_eq!(
            driver.events(),
            [
                Event::SetAutoCommit(false),
                Event::Commit,
                Event::SetAutoCommit(false),
            ]
        );
        assert!(!driver.state().auto_commit);
    }

    #[test]
    fn failure_rolls_back_once() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        silent_logs! {
            let error = run_in_transaction(&mut connection, &default(), |_| -> Result<()> {
                Err(Error::msg("work failed"))
            })
            .expect_err("The work failure must propagate");
            assert_eq!(error.to_string(), "work failed");
        }
        assert!(!connection.in_transaction());
        assert_eq!(driver.rollbacks(), 1);
        assert_eq!(
            driver.events(),
            [
                Event::SetAutoCommit(false),
                Event::Rollback(None),
                Event::SetAutoCommit(true),
            ]
        );
    }

    #[test]
    fn nested_uses_savepoints() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        run_in_transaction(&mut connection, &default(), |connection| {
            run_in_transaction(connection, &default(), |connection| {
                assert!(connection.in_transaction());
                Ok(())
            })?;
            silent_logs! {
                let inner = run_in_transaction(connection, &default(), |_| -> Result<()> {
                    Err(Error::msg("inner failed"))
                });
                assert!(inner.is_err());
            }
            assert!(connection.in_transaction());
            Ok(())
        })
        .expect("The outer transaction should commit");
        assert_eq!(
            driver.events(),
            [
                Event::SetAutoCommit(false),
                Event::Savepoint("sp1".into()),
                Event::Release("sp1".into()),
                Event::Savepoint("sp2".into()),
                Event::Rollback(Some("sp2".into())),
                Event::Commit,
                Event::SetAutoCommit(true),
            ]
        );
    }

    #[test]
    fn propagated_failure_rolls_back_each_scope_once() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        silent_logs! {
            let error = run_in_transaction(&mut connection, &default(), |connection| {
                run_in_transaction(connection, &default(), |_| -> Result<()> {
                    Err(KeelError::driver("constraint violated").into())
                })
            })
            .expect_err("The inner failure must reach the caller");
            assert!(matches!(error_kind(&error), Some(KeelError::Driver { .. })));
        }
        assert_eq!(
            driver.events(),
            [
                Event::SetAutoCommit(false),
                Event::Savepoint("sp1".into()),
                Event::Rollback(Some("sp1".into())),
                Event::Rollback(None),
                Event::SetAutoCommit(true),
            ]
        );
        assert!(!connection.in_transaction());
    }

    #[test]
    fn rollback_only_at_any_level() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        let value = run_in_transaction(&mut connection, &default(), |connection| {
            run_in_transaction(connection, &default(), |connection| {
                run_in_transaction(connection, &default(), |connection| {
                    connection.mark_rollback_only();
                    Ok(())
                })
            })?;
            Ok("result")
        })
        .expect("Work returning normally must not fail");
        assert_eq!(value, "result");
        assert_eq!(driver.count(&Event::Commit), 0);
        assert_eq!(driver.count(&Event::Rollback(None)), 1);
        assert!(!connection.is_rollback_only());
        assert!(!connection.in_transaction());
    }

    #[test]
    fn rollback_only_reset_by_new_transaction() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        connection.mark_rollback_only();
        assert!(connection.is_rollback_only());
        run_in_transaction(&mut connection, &default(), |_| Ok(()))
            .expect("The transaction should commit");
        assert_eq!(driver.count(&Event::Commit), 1);
    }

    #[test]
    fn savepoints_disabled() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        let options = TransactionOptions::new().savepoints(false);
        run_in_transaction(&mut connection, &options, |connection| {
            let before = driver.events();
            let mut called = false;
            let error = run_in_transaction(connection, &options, |_| {
                called = true;
                Ok(())
            })
            .expect_err("Nested transactions are disabled");
            assert!(!called);
            assert!(matches!(
                error_kind(&error),
                Some(KeelError::NestedTransactionDisabled)
            ));
            assert_eq!(driver.events(), before);
            Ok(())
        })
        .expect("The outer transaction is not affected");
        assert_eq!(driver.count(&Event::Commit), 1);
    }

    #[test]
    fn commit_failure_rolls_back() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        driver.fail_on(Operation::Commit);
        silent_logs! {
            let error = run_in_transaction(&mut connection, &default(), |_| Ok(()))
                .expect_err("The commit failure must propagate");
            assert_eq!(error.to_string(), "Driver error: Simulated failure of Commit");
        }
        assert_eq!(
            driver.events(),
            [
                Event::SetAutoCommit(false),
                Event::Rollback(None),
                Event::SetAutoCommit(true),
            ]
        );
        assert!(!connection.in_transaction());
    }

    #[test]
    fn rollback_failure_keeps_original_error() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        driver.fail_on(Operation::Rollback);
        silent_logs! {
            let error = run_in_transaction(&mut connection, &default(), |_| -> Result<()> {
                Err(KeelError::configuration("original").into())
            })
            .expect_err("The work failure must propagate");
            assert!(matches!(
                error_kind(&error),
                Some(KeelError::Configuration { message }) if message == "original"
            ));
            let message = format!("{:#}", error);
            assert!(message.contains("Simulated failure of Rollback"), "{}", message);
            assert!(message.contains("original"), "{}", message);
        }
        // Still back to idle with auto commit restored
        assert!(!connection.in_transaction());
        assert_eq!(driver.count(&Event::SetAutoCommit(true)), 1);
    }

    #[test]
    fn rollback_only_failure_rolls_back_once() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        silent_logs! {
            let error = run_in_transaction(&mut connection, &default(), |connection| {
                connection.mark_rollback_only();
                driver.fail_on(Operation::Rollback);
                Ok(())
            })
            .expect_err("The rollback failure must be reported");
            let message = format!("{:#}", error);
            assert!(message.contains("Simulated failure of Rollback"), "{}", message);
            assert!(!message.contains("additionally"), "{}", message);
        }
        assert_eq!(driver.state().failures, [Operation::Rollback]);
        assert_eq!(driver.count(&Event::Commit), 0);
        assert!(!connection.in_transaction());
        assert!(!connection.is_rollback_only());
        assert_eq!(driver.count(&Event::SetAutoCommit(true)), 1);
    }

    #[test]
    fn restore_failure_after_commit() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        silent_logs! {
            let error = run_in_transaction(&mut connection, &default(), |_| {
                driver.fail_on(Operation::SetAutoCommit);
                Ok(())
            })
            .expect_err("The restore failure must be reported");
            assert!(error.to_string().contains("SetAutoCommit"));
        }
        assert!(!connection.in_transaction());
        assert_eq!(driver.count(&Event::Commit), 1);
        assert_eq!(driver.rollbacks(), 0);
    }

    #[test]
    fn begin_failure_skips_work() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        driver.fail_on(Operation::SetAutoCommit);
        let mut called = false;
        silent_logs! {
            run_in_transaction(&mut connection, &default(), |_| {
                called = true;
                Ok(())
            })
            .expect_err("The begin failure must propagate");
        }
        assert!(!called);
        assert!(!connection.in_transaction());
        assert!(driver.events().is_empty());
    }

    #[test]
    fn begin_failure_restores_isolation() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        driver.fail_on(Operation::SetReadOnly);
        silent_logs! {
            run_in_transaction(
                &mut connection,
                &TransactionOptions::new()
                    .isolation(IsolationLevel::Serializable)
                    .read_only(true),
                |_| Ok(()),
            )
            .expect_err("The begin failure must propagate");
        }
        assert_eq!(
            driver.events(),
            [
                Event::SetIsolation(IsolationLevel::Serializable),
                Event::SetIsolation(IsolationLevel::ReadCommitted),
            ]
        );
    }

    #[test]
    fn transaction_isolation_and_read_only() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        let options = TransactionOptions::new()
            .isolation(IsolationLevel::Serializable)
            .read_only(true);
        run_in_transaction(&mut connection, &options, |connection| {
            // Savepoints cannot change them, nested options are ignored
            run_in_transaction(
                connection,
                &TransactionOptions::new().isolation(IsolationLevel::ReadUncommitted),
                |_| Ok(()),
            )
        })
        .expect("The transaction should commit");
        assert_eq!(
            driver.events(),
            [
                Event::SetIsolation(IsolationLevel::Serializable),
                Event::SetReadOnly(true),
                Event::SetAutoCommit(false),
                Event::Savepoint("sp1".into()),
                Event::Release("sp1".into()),
                Event::Commit,
                Event::SetAutoCommit(true),
                Event::SetIsolation(IsolationLevel::ReadCommitted),
                Event::SetReadOnly(false),
            ]
        );
        assert_eq!(driver.state().isolation, IsolationLevel::ReadCommitted);
    }

    #[test]
    fn noop_strategy_never_touches_the_driver() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver).with_strategy(Arc::new(NoopStrategy));
        let value = run_in_transaction(&mut connection, &default(), |connection| {
            assert!(!connection.in_transaction());
            Ok(1)
        })
        .expect("Noop transactions succeed");
        assert_eq!(value, 1);
        silent_logs! {
            run_in_transaction(&mut connection, &default(), |_| -> Result<()> {
                Err(Error::msg("failed"))
            })
            .expect_err("The failure still propagates");
        }
        assert!(driver.events().is_empty());
    }

    #[test]
    fn strategy_precedence() {
        init_logs();
        let driver = MockDriver::new();
        let connector = Connector::new()
            .with_driver(Arc::new(driver.clone()))
            .with_default_strategy(Arc::new(NoopStrategy));
        let mut connection = connector
            .open("mock://localhost/app")
            .expect("Could not open the mock connection");
        driver.clear_events();

        // Process default
        run_in_transaction(&mut connection, &default(), |_| Ok(())).unwrap();
        assert!(driver.events().is_empty());

        // Connection attached beats the default
        connection.set_strategy(Some(Arc::new(NestedStrategy)));
        run_in_transaction(&mut connection, &default(), |_| Ok(())).unwrap();
        assert_eq!(driver.count(&Event::Commit), 1);

        // Explicit argument beats the attached one
        driver.clear_events();
        run_in_transaction(
            &mut connection,
            &TransactionOptions::new().strategy(Arc::new(NoopStrategy)),
            |_| Ok(()),
        )
        .unwrap();
        assert!(driver.events().is_empty());
    }

    #[test]
    fn close_inside_transaction() {
        init_logs();
        let driver = MockDriver::new();
        let mut connection = connect(&driver);
        let scope = NestedStrategy
            .begin(&mut connection, &default())
            .expect("Could not begin");
        assert!(matches!(scope, Scope::Root(..)));
        assert!(connection.in_transaction());
        silent_logs! {
            connection.close().expect("Closing never fails because of the transaction");
        }
        assert_eq!(
            driver.events(),
            [Event::SetAutoCommit(false), Event::Close]
        );
    }

    #[test]
    fn drop_closes_once() {
        init_logs();
        let driver = MockDriver::new();
        {
            let _connection = connect(&driver);
        }
        assert_eq!(driver.events(), [Event::Close]);
    }
}
