use indoc::indoc;
use keel_core::{
    AsValue, Connection, ExecuteOptions, Executed, QueryOptions, Value, execute, execute_prepared,
    query,
};

pub fn prepared(connection: &mut Connection) {
    execute(
        connection,
        &[
            "DROP TABLE IF EXISTS keel_prepared",
            indoc! {"
                CREATE TABLE keel_prepared (
                    x INTEGER,
                    y INTEGER NOT NULL
                )
            "},
        ],
    )
    .expect("Failed to create keel_prepared");

    let inserted = execute_prepared(
        connection,
        "INSERT INTO keel_prepared (x, y) VALUES (?, ?)",
        &[
            vec![Value::from(0), Value::from(1)],
            vec![Value::from(0), Value::from(2)],
            vec![Value::from(0), Value::from(2)],
            vec![Value::from(0), Value::from(3)],
        ],
        &ExecuteOptions::default(),
    )
    .expect("Failed to insert into keel_prepared");
    assert_eq!(inserted, Executed::Counts(vec![1, 1, 1, 1]));

    // Groups run in order, the second one sees the first
    let updated = execute_prepared(
        connection,
        "UPDATE keel_prepared SET x = ? WHERE y = ?",
        &[
            vec![Value::from(1), Value::from(2)],
            vec![Value::from(2), Value::from(3)],
        ],
        &ExecuteOptions::default(),
    )
    .expect("Failed to update keel_prepared");
    assert_eq!(updated.counts(), Some(&[2, 1][..]));

    let rows = query(
        connection,
        "SELECT x, y FROM keel_prepared ORDER BY y, x",
        &QueryOptions::new().as_arrays(true),
    )
    .and_then(|v| v.into_rows())
    .expect("Failed to read keel_prepared");
    let values = rows
        .iter()
        .map(|row| {
            row.values()
                .iter()
                .map(|v| i64::try_from_value(v.clone()).expect("Expected an integer"))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    assert_eq!(values, [[0, 1], [1, 2], [1, 2], [2, 3]]);

    // No parameter groups, the statement runs once
    let deleted = execute_prepared(
        connection,
        "DELETE FROM keel_prepared WHERE x = 1",
        &[],
        &ExecuteOptions::default(),
    )
    .expect("Failed to delete from keel_prepared");
    assert_eq!(deleted, Executed::Counts(vec![2]));
}
