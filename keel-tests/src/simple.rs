use indoc::indoc;
use keel_core::{
    AsValue, Connection, Data, QueryOptions, Row, Value, execute, prepare, query, query_one,
};

pub fn simple(connection: &mut Connection) {
    let counts = execute(
        connection,
        &[
            "DROP TABLE IF EXISTS keel_simple",
            indoc! {"
                CREATE TABLE keel_simple (
                    id INTEGER PRIMARY KEY,
                    name VARCHAR(60) NOT NULL,
                    score INTEGER
                )
            "},
            "INSERT INTO keel_simple (id, name, score) VALUES (1, 'alpha', 10)",
            "INSERT INTO keel_simple (id, name, score) VALUES (2, 'beta', 20)",
            "INSERT INTO keel_simple (id, name, score) VALUES (3, 'gamma', NULL)",
        ],
    )
    .expect("Failed to create and populate keel_simple");
    assert_eq!(counts.len(), 5);
    assert_eq!(&counts[2..], &[1, 1, 1]);

    // Eager
    let mut result = query(
        connection,
        "SELECT id, name AS Name, score FROM keel_simple ORDER BY id",
        &QueryOptions::default(),
    )
    .expect("Failed to query keel_simple");
    assert_eq!(&result.columns()[..], ["id", "name", "score"]);
    let eager = match result.data() {
        Data::Realized(rows) => rows.to_vec(),
        Data::Lazy(..) => panic!("The result should be realized"),
    };
    result.close().expect("Failed to close the result");
    assert_eq!(eager.len(), 3);
    let names = eager
        .iter()
        .map(|row| {
            String::try_from_value(row.get("name").expect("Missing name").clone())
                .expect("Name is not a string")
        })
        .collect::<Vec<_>>();
    assert_eq!(names, ["alpha", "beta", "gamma"]);
    assert!(eager[2].get("score").expect("Missing score").is_null());
    assert_eq!(
        i64::try_from_value(eager[1].get("score").expect("Missing score").clone())
            .expect("Score is not an integer"),
        20
    );

    // Lazy over the same data
    let mut result = query(
        connection,
        "SELECT id, name AS Name, score FROM keel_simple ORDER BY id",
        &QueryOptions::new().lazy(true),
    )
    .expect("Failed to query keel_simple lazily");
    assert!(result.rows().is_none());
    let lazy = match result.data() {
        Data::Lazy(cursor) => cursor
            .collect::<keel_core::Result<Vec<_>>>()
            .expect("Failed to read the cursor"),
        Data::Realized(..) => panic!("The result should be lazy"),
    };
    result.close().expect("Failed to close the result");
    assert_eq!(lazy, eager);

    // Positional tuples
    let rows = query(
        connection,
        "SELECT name, score FROM keel_simple WHERE id = 1",
        &QueryOptions::new().as_arrays(true),
    )
    .and_then(|v| v.into_rows())
    .expect("Failed to query keel_simple as arrays");
    assert_eq!(
        rows,
        [Row::Tuple(
            [Value::Varchar(Some("alpha".into())), Value::Int64(Some(10))].into()
        )]
    );

    // Parameters
    let row = query_one(
        connection,
        (
            "SELECT name FROM keel_simple WHERE score > ? ORDER BY id",
            vec![Value::from(15)],
        ),
        &QueryOptions::default(),
    )
    .expect("Failed to query with parameters")
    .expect("Expected one row");
    assert_eq!(row.get("name"), Some(&Value::Varchar(Some("beta".into()))));
    let none = query_one(
        connection,
        ("SELECT name FROM keel_simple WHERE score > ?", vec![Value::from(1000)]),
        &QueryOptions::default(),
    )
    .expect("Failed to query with parameters");
    assert!(none.is_none());

    // Prepared
    let mut prepared = prepare(connection, "SELECT name FROM keel_simple WHERE id = ?")
        .expect("Failed to prepare the query");
    prepared.bind(3).expect("Failed to bind the id");
    let rows = query(connection, prepared, &QueryOptions::default())
        .and_then(|v| v.into_rows())
        .expect("Failed to run the prepared query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values(), &[Value::Varchar(Some("gamma".into()))]);

    // Custom identifiers
    let row = query_one(
        connection,
        "SELECT id, name FROM keel_simple WHERE id = 1",
        &QueryOptions::new().identifiers(|v| format!("keel_{}", v.to_uppercase())),
    )
    .expect("Failed to query with custom identifiers")
    .expect("Expected one row");
    assert!(row.get("keel_NAME").is_some());
    assert!(row.get("name").is_none());
}
