//! Client persistence.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error_handling::DatabaseError;
use crate::models::Client;

use super::ms_to_datetime;

/// Inserts a leased client and returns its assigned id.
pub async fn insert_client(pool: &SqlitePool, client: &Client) -> Result<i64, DatabaseError> {
    let row = sqlx::query(
        "INSERT INTO clients (
            ip, network_type, session_id, session_length_secs, created_at_ms,
            expiration_time_ms, ip_version, carrier, city, country_code, country_name,
            as_number, as_org, isp, proxy, last_seen_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id",
    )
    .bind(&client.ip)
    .bind(client.network_type.as_str())
    .bind(client.session_id as i64)
    .bind(client.session_length_secs as i64)
    .bind(client.created_at.timestamp_millis())
    .bind(client.expiration_time.timestamp_millis())
    .bind(&client.ip_version)
    .bind(&client.carrier)
    .bind(&client.city)
    .bind(&client.country_code)
    .bind(&client.country_name)
    .bind(&client.as_number)
    .bind(&client.as_org)
    .bind(&client.isp)
    .bind(&client.proxy)
    .bind(client.last_seen.timestamp_millis())
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    Ok(row.get::<i64, _>("id"))
}

/// Overwrites the expiration time of a client.
///
/// Returns `DatabaseError::NotFound` when no client has this id.
pub async fn update_client_expiration(
    pool: &SqlitePool,
    client_id: i64,
    expiration_time: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE clients SET expiration_time_ms = ?, last_seen_ms = ? WHERE id = ?",
    )
    .bind(expiration_time.timestamp_millis())
    .bind(Utc::now().timestamp_millis())
    .bind(client_id)
    .execute(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!("client {}", client_id)));
    }
    Ok(())
}

/// Loads one client by id.
pub async fn get_client(pool: &SqlitePool, client_id: i64) -> Result<Client, DatabaseError> {
    let row = sqlx::query("SELECT * FROM clients WHERE id = ?")
        .bind(client_id)
        .fetch_optional(pool)
        .await
        .map_err(DatabaseError::SqlError)?
        .ok_or_else(|| DatabaseError::NotFound(format!("client {}", client_id)))?;

    client_from_row(&row)
}

fn client_from_row(row: &SqliteRow) -> Result<Client, DatabaseError> {
    let network_type: String = row.get("network_type");
    Ok(Client {
        id: row.get("id"),
        ip: row.get("ip"),
        network_type: network_type
            .parse()
            .map_err(DatabaseError::InvalidValue)?,
        session_id: row.get::<i64, _>("session_id") as u32,
        session_length_secs: row.get::<i64, _>("session_length_secs") as u64,
        created_at: ms_to_datetime(row.get("created_at_ms"))?,
        expiration_time: ms_to_datetime(row.get("expiration_time_ms"))?,
        ip_version: row.get("ip_version"),
        carrier: row.get("carrier"),
        city: row.get("city"),
        country_code: row.get("country_code"),
        country_name: row.get("country_name"),
        as_number: row.get("as_number"),
        as_org: row.get("as_org"),
        isp: row.get("isp"),
        proxy: row.get("proxy"),
        last_seen: ms_to_datetime(row.get("last_seen_ms"))?,
    })
}
