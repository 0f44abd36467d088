#![cfg(feature = "sqlite")]

use std::time::Duration;

use sql_dispatch::prelude::*;
use sql_dispatch::sqlite::rusqlite;
use sql_dispatch::test_utils::wait_ready;

fn recover_ready<R: Send + 'static>(
    pool: &DispatchPool<SqliteConnector>,
    callable: Callable<R>,
) -> R {
    assert!(wait_ready(&callable, Duration::from_secs(10)));
    match pool.recover(callable) {
        Ok(value) => value,
        Err(err) => panic!("operation failed: {err}"),
    }
}

#[test]
fn ban_operations_roundtrip_through_a_real_database() -> Result<(), SqlDispatchError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("stats.db").to_string_lossy().into_owned();

    let pool = DispatchPool::new(
        PoolOptions::builder(Endpoint::new("", db_path)).tenant_id(1).finish(),
        SqliteConnector::new(),
    )?;

    let create = pool.dispatch("schema_init", |conn, _scope| {
        conn.execute_batch(
            "CREATE TABLE bans (
                botid INTEGER NOT NULL,
                name TEXT NOT NULL,
                admin TEXT NOT NULL,
                reason TEXT
            );",
        )?;
        Ok(())
    });
    recover_ready(&pool, create);

    let insert = pool.dispatch("ban_add", |conn, scope| {
        let inserted = conn.execute(
            "INSERT INTO bans (botid, name, admin, reason) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![scope.tenant_id, "grubby", "tower", "spoofed realm"],
        )?;
        Ok(inserted)
    });
    assert_eq!(recover_ready(&pool, insert), 1);

    let check = pool.dispatch("ban_check", |conn, scope| {
        let mut stmt =
            conn.prepare("SELECT admin, reason FROM bans WHERE botid = ?1 AND name = ?2")?;
        let mut rows = stmt.query(rusqlite::params![scope.tenant_id, "grubby"])?;
        match rows.next()? {
            Some(row) => Ok(Some((row.get::<_, String>(0)?, row.get::<_, String>(1)?))),
            None => Ok(None),
        }
    });
    let ban = recover_ready(&pool, check).expect("the ban should be found");
    assert_eq!(ban.0, "tower");
    assert_eq!(ban.1, "spoofed realm");

    // A different tenant sees nothing.
    let count = pool.dispatch("ban_count", |conn, _scope| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM bans WHERE botid = ?1",
            [999u32],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    });
    assert_eq!(recover_ready(&pool, count), 0);

    let status = pool.status();
    assert_eq!(status.outstanding, 0);
    assert_eq!(status.idle, 1, "one connection served every operation");
    pool.shutdown();
    Ok(())
}

#[test]
fn unreachable_database_fails_at_construction() {
    let endpoint = Endpoint::new("", "/nonexistent-dir-for-sql-dispatch/stats.db");
    match DispatchPool::new(PoolOptions::builder(endpoint).finish(), SqliteConnector::new()) {
        Err(SqlDispatchError::ConnectionError(_)) => {}
        other => panic!("expected a connection error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn driver_error_in_a_query_function_evicts_the_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("stats.db").to_string_lossy().into_owned();
    let pool = DispatchPool::new(
        PoolOptions::builder(Endpoint::new("", db_path)).finish(),
        SqliteConnector::new(),
    )
    .expect("pool construction");

    let callable: Callable<usize> = pool.dispatch("ban_add", |conn, _scope| {
        let inserted = conn.execute("INSERT INTO missing_table (x) VALUES (1)", [])?;
        Ok(inserted)
    });
    assert!(wait_ready(&callable, Duration::from_secs(10)));
    match pool.recover(callable) {
        Err(RecoverError::Failed(SqlDispatchError::SqliteError(_))) => {}
        other => panic!("expected a sqlite error, got {other:?}"),
    }

    let status = pool.status();
    assert_eq!(status.idle, 0, "the errored connection was evicted");
    assert_eq!(status.total, 0);
}
