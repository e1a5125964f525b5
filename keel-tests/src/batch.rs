use crate::silent_logs;
use keel_core::{Connection, KeelError, QueryOptions, error_kind, execute, query};

pub fn batch(connection: &mut Connection) {
    execute(
        connection,
        &[
            "DROP TABLE IF EXISTS keel_batch",
            "CREATE TABLE keel_batch (id INTEGER PRIMARY KEY, name VARCHAR(20))",
        ],
    )
    .expect("Failed to create keel_batch");

    silent_logs! {
        let error = execute(
            connection,
            &[
                "INSERT INTO keel_batch (id, name) VALUES (1, 'first')",
                "INSERT INTO keel_batch (id, name) VALUES (1, 'duplicate')",
                "INSERT INTO keel_batch (id, name) VALUES (2, 'never')",
            ],
        )
        .expect_err("A duplicated key must fail the batch");
        let Some(KeelError::Batch { counts, .. }) = error_kind(&error) else {
            panic!("Expected a batch error, found: {:#}", error);
        };
        // Drivers that report partial counts only know about the first command
        if let Some(counts) = counts {
            assert!(counts.len() <= 1, "Unexpected counts {:?}", counts);
        }
    }

    let rows = query(
        connection,
        "SELECT name FROM keel_batch WHERE id = 2",
        &QueryOptions::default(),
    )
    .and_then(|v| v.into_rows())
    .expect("Failed to read keel_batch");
    assert!(rows.is_empty(), "Commands after the failure must not run");
}
