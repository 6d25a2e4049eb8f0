//! Measurement persistence.
//!
//! Measurements are append-only: rows are inserted and read back, never updated.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error_handling::DatabaseError;
use crate::models::Measurement;

use super::ms_to_datetime;

/// Inserts one probe attempt and returns its id.
pub async fn insert_measurement(
    pool: &SqlitePool,
    measurement: &Measurement,
) -> Result<i64, DatabaseError> {
    let row = sqlx::query(
        "INSERT INTO measurements (
            client_id, server_id, time_ms, protocol, session_id, retry_number,
            prefix_used, error_msg, error_msg_verbose, error_op, duration_ms, full_report
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id",
    )
    .bind(measurement.client_id)
    .bind(measurement.server_id)
    .bind(measurement.time.timestamp_millis())
    .bind(measurement.protocol.as_str())
    .bind(&measurement.session_id)
    .bind(measurement.retry_number as i64)
    .bind(&measurement.prefix_used)
    .bind(&measurement.error_msg)
    .bind(&measurement.error_msg_verbose)
    .bind(&measurement.error_op)
    .bind(measurement.duration_ms)
    .bind(measurement.full_report.as_deref())
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    Ok(row.get::<i64, _>("id"))
}

/// Loads the attempts of one session with the given retry number, in insertion order.
pub async fn get_measurements_by_session(
    pool: &SqlitePool,
    session_id: &str,
    retry_number: u32,
) -> Result<Vec<Measurement>, DatabaseError> {
    let rows = sqlx::query(
        "SELECT * FROM measurements WHERE session_id = ? AND retry_number = ? ORDER BY id",
    )
    .bind(session_id)
    .bind(retry_number as i64)
    .fetch_all(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    rows.iter().map(measurement_from_row).collect()
}

fn measurement_from_row(row: &SqliteRow) -> Result<Measurement, DatabaseError> {
    let protocol: String = row.get("protocol");
    Ok(Measurement {
        id: row.get("id"),
        client_id: row.get("client_id"),
        server_id: row.get("server_id"),
        time: ms_to_datetime(row.get("time_ms"))?,
        protocol: protocol.parse().map_err(DatabaseError::InvalidValue)?,
        session_id: row.get("session_id"),
        retry_number: row.get::<i64, _>("retry_number") as u32,
        prefix_used: row.get("prefix_used"),
        error_msg: row.get("error_msg"),
        error_msg_verbose: row.get("error_msg_verbose"),
        error_op: row.get("error_op"),
        duration_ms: row.get("duration_ms"),
        full_report: row.get("full_report"),
    })
}
