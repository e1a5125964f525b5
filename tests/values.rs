#[cfg(test)]
mod tests {
    use keel::{
        AsValue, Connector, ExecuteOptions, QueryOptions, Value, execute, execute_prepared,
        query_one,
    };
    use keel_sqlite::SqliteDriver;
    use keel_tests::init_logs;
    use rust_decimal::Decimal;
    use std::{str::FromStr, sync::Arc};
    use time::macros::{date, datetime, time};
    use uuid::Uuid;

    #[test]
    fn typed_values_through_sqlite() {
        init_logs();
        let mut connection = Connector::new()
            .with_driver(Arc::new(SqliteDriver::new()))
            .open("sqlite::memory:")
            .expect("Could not open the database");
        execute(
            &mut connection,
            &[indoc::indoc! {"
                CREATE TABLE payments (
                    id TEXT PRIMARY KEY,
                    amount REAL NOT NULL,
                    due DATE NOT NULL,
                    cutoff TIME,
                    created TIMESTAMP NOT NULL,
                    settled BOOLEAN NOT NULL,
                    note TEXT
                )
            "}],
        )
        .expect("Failed to create payments");

        let id = Uuid::from_str("4d3b2a8e-7f26-4c09-9b3e-1f0d6c5a2e71").unwrap();
        let amount = Decimal::from_str("12.50").unwrap();
        execute_prepared(
            &mut connection,
            "INSERT INTO payments VALUES (?, ?, ?, ?, ?, ?, ?)",
            &[vec![
                id.as_value(),
                amount.as_value(),
                date!(2024 - 03 - 01).as_value(),
                time!(13:45:30).as_value(),
                datetime!(2024-02-28 19:15:00).as_value(),
                true.as_value(),
                None::<String>.as_value(),
            ]],
            &ExecuteOptions::default(),
        )
        .expect("Failed to insert the payment");

        let row = query_one(
            &mut connection,
            "SELECT * FROM payments",
            &QueryOptions::default(),
        )
        .expect("Failed to read the payment")
        .expect("Expected one payment");
        let get = |key: &str| row.get(key).cloned().expect("Missing column");
        assert_eq!(Uuid::try_from_value(get("id")).unwrap(), id);
        assert_eq!(Decimal::try_from_value(get("amount")).unwrap(), amount);
        assert_eq!(
            time::Date::try_from_value(get("due")).unwrap(),
            date!(2024 - 03 - 01)
        );
        assert_eq!(
            time::Time::try_from_value(get("cutoff")).unwrap(),
            time!(13:45:30)
        );
        assert_eq!(
            time::PrimitiveDateTime::try_from_value(get("created")).unwrap(),
            datetime!(2024-02-28 19:15:00)
        );
        assert!(bool::try_from_value(get("settled")).unwrap());
        assert_eq!(Option::<String>::try_from_value(get("note")).unwrap(), None);
        assert!(get("note").is_null());
        assert_eq!(get("amount"), Value::Float64(Some(12.5)));
    }
}
