//! Query cancellation example.
//!
//! This example runs a statement that never finishes against the in-process
//! mock server, cancels it from another task, and shows that the kill went
//! out on a second pooled session.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=debug cargo run -p mysql-driver --example cancellation
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mysql_driver::{Driver, DriverConfig, DriverError};
use mysql_testing::{MockServer, fixtures};

#[tokio::main]
async fn main() -> Result<(), DriverError> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let server = fixtures::with_long_query(MockServer::builder()).build();
    let config = DriverConfig::from_env()?
        .connect(fixtures::mock_options())
        .store_timezone("+05:00")
        .max_pool(2);
    let driver = Driver::new(server.clone(), config)?;

    driver.test_connection().await?;
    println!("Connection check passed");

    let rows = driver.query("SELECT 1 + 1", vec![]).await?;
    println!("Plain query returned {} row(s)", rows.rows.len());

    let query = driver.query(fixtures::LONG_QUERY, vec![]);
    let cancel = query.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        println!("Cancelling query on server session {:?}", cancel.target());
        cancel.cancel();
    });

    match query.await {
        Err(DriverError::Cancelled) => println!("Query was cancelled"),
        other => println!("Unexpected outcome: {other:?}"),
    }

    for statement in server.executed_matching("KILL") {
        println!("Session {} sent: {}", statement.session, statement.sql);
    }
    println!("Pool status: {:?}", driver.status());

    driver.close().await;
    Ok(())
}
