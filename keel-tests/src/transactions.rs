use crate::silent_logs;
use keel_core::{
    AsValue, Connection, Error, KeelError, QueryOptions, Result, TransactionOptions, Value,
    error_kind, execute, query_one, run_in_transaction,
};

fn reset(connection: &mut Connection) {
    execute(
        connection,
        &[
            "DROP TABLE IF EXISTS keel_accounts",
            "CREATE TABLE keel_accounts (name VARCHAR(30) PRIMARY KEY, balance INTEGER NOT NULL)",
        ],
    )
    .expect("Failed to create keel_accounts");
}

fn insert(connection: &mut Connection, name: &str, balance: i64) -> Result<()> {
    keel_core::execute_prepared(
        connection,
        "INSERT INTO keel_accounts (name, balance) VALUES (?, ?)",
        &[vec![Value::from(name), Value::from(balance)]],
        &Default::default(),
    )?;
    Ok(())
}

fn balance(connection: &mut Connection, name: &str) -> Option<i64> {
    query_one(
        connection,
        (
            "SELECT balance FROM keel_accounts WHERE name = ?",
            vec![Value::from(name)],
        ),
        &QueryOptions::default(),
    )
    .expect("Failed to read keel_accounts")
    .map(|row| {
        i64::try_from_value(row.values()[0].clone()).expect("The balance must be an integer")
    })
}

fn assert_idle(connection: &mut Connection) {
    assert!(!connection.in_transaction());
    assert!(
        connection
            .raw()
            .auto_commit()
            .expect("Failed to read auto commit")
    );
}

pub fn transactions(connection: &mut Connection) {
    reset(connection);

    let result = run_in_transaction(connection, &TransactionOptions::default(), |connection| {
        assert!(connection.in_transaction());
        insert(connection, "alice", 100)?;
        insert(connection, "bob", 50)?;
        Ok(42)
    })
    .expect("The transaction should commit");
    assert_eq!(result, 42);
    assert_idle(connection);
    assert_eq!(balance(connection, "alice"), Some(100));
    assert_eq!(balance(connection, "bob"), Some(50));

    silent_logs! {
        let error = connection
            .transaction(&TransactionOptions::default(), |connection| -> Result<()> {
                insert(connection, "carol", 10)?;
                Err(Error::msg("carol is not welcome"))
            })
            .expect_err("The transaction should fail");
        assert_eq!(error.to_string(), "carol is not welcome");
    }
    assert_idle(connection);
    assert_eq!(balance(connection, "carol"), None);

    // A failing statement rolls back the statements before it
    silent_logs! {
        let error = connection
            .transaction(&TransactionOptions::default(), |connection| {
                insert(connection, "dave", 10)?;
                insert(connection, "alice", 1)
            })
            .expect_err("The duplicated key should fail the transaction");
        assert!(error_kind(&error).is_some());
    }
    assert_idle(connection);
    assert_eq!(balance(connection, "dave"), None);
}

pub fn nested_transactions(connection: &mut Connection) {
    reset(connection);

    run_in_transaction(connection, &TransactionOptions::default(), |connection| {
        insert(connection, "outer", 1)?;
        silent_logs! {
            let inner = run_in_transaction(connection, &TransactionOptions::default(), |connection| -> Result<()> {
                insert(connection, "inner", 2)?;
                Err(Error::msg("inner failure"))
            });
            assert_eq!(
                inner.expect_err("The inner transaction should fail").to_string(),
                "inner failure"
            );
        }
        assert!(connection.in_transaction());
        run_in_transaction(connection, &TransactionOptions::default(), |connection| {
            insert(connection, "second", 3)
        })?;
        let disabled = run_in_transaction(
            connection,
            &TransactionOptions::new().savepoints(false),
            |_| Ok(()),
        );
        assert!(matches!(
            disabled.as_ref().map_err(error_kind),
            Err(Some(KeelError::NestedTransactionDisabled))
        ));
        Ok(())
    })
    .expect("The outer transaction should commit");
    assert_idle(connection);
    assert_eq!(balance(connection, "outer"), Some(1));
    assert_eq!(balance(connection, "inner"), None);
    assert_eq!(balance(connection, "second"), Some(3));
}

pub fn rollback_only(connection: &mut Connection) {
    reset(connection);

    let value = run_in_transaction(connection, &TransactionOptions::default(), |connection| {
        insert(connection, "kept", 1)?;
        run_in_transaction(connection, &TransactionOptions::default(), |connection| {
            insert(connection, "marked", 2)?;
            connection.mark_rollback_only();
            Ok(())
        })?;
        assert!(connection.is_rollback_only());
        Ok("done")
    })
    .expect("A rollback only transaction still returns the work result");
    assert_eq!(value, "done");
    assert!(!connection.is_rollback_only());
    assert_idle(connection);
    assert_eq!(balance(connection, "kept"), None);
    assert_eq!(balance(connection, "marked"), None);

    run_in_transaction(connection, &TransactionOptions::default(), |connection| {
        connection.mark_rollback_only();
        connection.unmark_rollback_only();
        insert(connection, "unmarked", 3)
    })
    .expect("The transaction should commit");
    assert_eq!(balance(connection, "unmarked"), Some(3));
}
