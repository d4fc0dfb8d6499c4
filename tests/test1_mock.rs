use std::sync::Arc;

use sql_gateway::prelude::*;

fn mock_client(init_ok: bool) -> (Arc<MockAdapter>, SqlClient) {
    let adapter = Arc::new(MockAdapter::new(init_ok));
    let client = SqlClientBuilder::new(Arc::clone(&adapter) as Arc<dyn EngineAdapter>).build();
    (adapter, client)
}

#[tokio::test]
async fn open_fails_when_the_double_is_programmed_to_fail() {
    let (_, client) = mock_client(false);
    let err = client.open().await.expect_err("open must fail");
    assert!(matches!(err, SqlGatewayError::ConnectionFailed));
}

#[tokio::test]
async fn open_succeeds_when_the_double_is_programmed_to_succeed() -> Result<(), SqlGatewayError> {
    let (_, client) = mock_client(true);
    client.open().await?;
    client.close().await
}

#[tokio::test]
async fn patched_exec_returns_its_error() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    let query = "INSERT INTO customers (name, cust_group) VALUES ('verylongname',1)";
    adapter.patch_exec(query, Err(SqlGatewayError::ValueTooLargeForColumn));

    let err = client.execute(query, &[]).await.expect_err("exec must fail");
    assert!(matches!(err, SqlGatewayError::ValueTooLargeForColumn));

    client.close().await
}

#[tokio::test]
async fn patched_query_returns_its_error() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    let query = "SELECT name FROM customers WHERE id = (SELECT id FROM customers)";
    adapter.patch_query(query, Err(SqlGatewayError::SubqueryReturnsMoreThanOneRow));

    let err = client.query(query, &[]).await.expect_err("query must fail");
    assert!(matches!(err, SqlGatewayError::SubqueryReturnsMoreThanOneRow));

    client.close().await
}

#[tokio::test]
async fn patched_exec_matches_on_bound_arguments() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    let query = "UPDATE customers SET age = :1 WHERE name = :2";
    adapter.patch_exec_with_args(
        query,
        vec![
            SqlValue::Text("twelve".to_string()),
            SqlValue::Text("Pablo".to_string()),
        ],
        Err(SqlGatewayError::InvalidNumericValue),
    );

    let err = client
        .execute(
            query,
            &[
                SqlValue::Text("twelve".to_string()),
                SqlValue::Text("Pablo".to_string()),
            ],
        )
        .await
        .expect_err("exec must fail");
    assert!(matches!(err, SqlGatewayError::InvalidNumericValue));

    client.close().await
}

#[tokio::test]
async fn patched_precision_error_surfaces() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    let query = "UPDATE customers SET age = :1 WHERE name = :2";
    adapter.patch_exec_with_args(
        query,
        vec![
            SqlValue::Float(949.0044),
            SqlValue::Text("Pablo".to_string()),
        ],
        Err(SqlGatewayError::ValueLargerThanPrecision),
    );

    let err = client
        .execute(
            query,
            &[
                SqlValue::Float(949.0044),
                SqlValue::Text("Pablo".to_string()),
            ],
        )
        .await
        .expect_err("exec must fail");
    assert!(matches!(err, SqlGatewayError::ValueLargerThanPrecision));

    client.close().await
}

#[tokio::test]
async fn patched_query_returns_rows_exactly_once() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    let query = "SELECT id, name FROM customers";
    adapter.patch_query(
        query,
        Ok(MockAdapter::rows(
            &["id", "name"],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("Juan".to_string())],
                vec![SqlValue::Int(2), SqlValue::Text("Pedro".to_string())],
            ],
        )),
    );

    let rows = client.query(query, &[]).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows.rows[0].get("name").and_then(SqlValue::as_text),
        Some("Juan")
    );

    // The expectation was consumed; a second round trip is unexpected.
    assert!(client.query(query, &[]).await.is_err());
    assert_eq!(adapter.remaining_expectations(), 0);

    client.close().await
}

#[tokio::test]
async fn transaction_calls_consume_their_patches() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    adapter.patch_begin(Ok(()));
    adapter.patch_exec_with_args(
        "DELETE FROM customers WHERE id = :1",
        vec![SqlValue::Int(7)],
        Ok(1),
    );
    adapter.patch_commit(Ok(()));

    let tx = client.begin_transaction().await?;
    let affected = tx
        .execute("DELETE FROM customers WHERE id = :1", &[SqlValue::Int(7)])
        .await?;
    assert_eq!(affected, 1);
    tx.commit().await?;

    assert_eq!(adapter.remaining_expectations(), 0);
    client.close().await
}

#[tokio::test]
async fn rollback_consumes_its_patch() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    adapter.patch_begin(Ok(()));
    adapter.patch_rollback(Ok(()));

    let tx = client.begin_transaction().await?;
    tx.rollback().await?;

    assert_eq!(adapter.remaining_expectations(), 0);
    client.close().await
}

#[tokio::test]
async fn begin_error_is_surfaced() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    adapter.patch_begin(Err(SqlGatewayError::ConnectionClosed));
    let err = client
        .begin_transaction()
        .await
        .err()
        .expect("begin must fail");
    assert!(matches!(err, SqlGatewayError::ConnectionClosed));

    client.close().await
}

#[tokio::test]
async fn next_sequence_value_scans_an_integer() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    adapter.patch_query_row("CUSTOMERS_SEQ", &["nextval"], vec![SqlValue::Int(42)]);
    assert_eq!(client.next_sequence_value("CUSTOMERS_SEQ").await?, 42);

    client.close().await
}

#[tokio::test]
async fn next_sequence_value_fails_on_a_non_integer() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    adapter.patch_query_row(
        "CUSTOMERS_SEQ",
        &["nextval"],
        vec![SqlValue::Text("forty-two".to_string())],
    );
    let err = client
        .next_sequence_value("CUSTOMERS_SEQ")
        .await
        .expect_err("scan must fail");
    assert!(matches!(err, SqlGatewayError::NextValueFailed));

    client.close().await
}

#[tokio::test]
async fn prepared_statement_routes_through_the_patches() -> Result<(), SqlGatewayError> {
    let (adapter, client) = mock_client(true);
    client.open().await?;

    let query = "INSERT INTO customers (name) VALUES (:1)";
    adapter.patch_exec_with_args(query, vec![SqlValue::Text("Juan".to_string())], Ok(1));
    adapter.patch_exec_with_args(
        query,
        vec![SqlValue::Text("Juan".to_string())],
        Err(SqlGatewayError::UniqueConstraintViolation),
    );

    let mut stmt = client.prepare(query).await?;
    assert_eq!(
        stmt.execute(&[SqlValue::Text("Juan".to_string())]).await?,
        1
    );
    let err = stmt
        .execute(&[SqlValue::Text("Juan".to_string())])
        .await
        .expect_err("duplicate must fail");
    assert!(matches!(err, SqlGatewayError::UniqueConstraintViolation));

    client.close().await
}
