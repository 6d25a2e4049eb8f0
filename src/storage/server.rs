//! Server persistence and selection queries.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error_handling::DatabaseError;
use crate::models::Server;

use super::ms_to_datetime;

/// Inserts a server or updates the existing row with the same access link.
///
/// Returns the id of the inserted or updated row.
pub async fn upsert_server(pool: &SqlitePool, server: &Server) -> Result<i64, DatabaseError> {
    let now_ms = Utc::now().timestamp_millis();
    let row = sqlx::query(
        "INSERT INTO servers (
            ip, port, user_info, full_access_link, scheme, domain_name, name, ip_type,
            as_number, as_org, city, region, country, last_test_time_ms,
            tcp_error_msg, tcp_error_op, udp_error_msg, udp_error_op,
            created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(full_access_link) DO UPDATE SET
            ip=excluded.ip,
            port=excluded.port,
            user_info=excluded.user_info,
            scheme=excluded.scheme,
            domain_name=excluded.domain_name,
            name=excluded.name,
            ip_type=excluded.ip_type,
            as_number=excluded.as_number,
            as_org=excluded.as_org,
            city=excluded.city,
            region=excluded.region,
            country=excluded.country,
            last_test_time_ms=excluded.last_test_time_ms,
            tcp_error_msg=excluded.tcp_error_msg,
            tcp_error_op=excluded.tcp_error_op,
            udp_error_msg=excluded.udp_error_msg,
            udp_error_op=excluded.udp_error_op,
            updated_at_ms=excluded.updated_at_ms
        RETURNING id",
    )
    .bind(&server.ip)
    .bind(&server.port)
    .bind(&server.user_info)
    .bind(&server.full_access_link)
    .bind(&server.scheme)
    .bind(&server.domain_name)
    .bind(&server.name)
    .bind(&server.ip_type)
    .bind(&server.as_number)
    .bind(&server.as_org)
    .bind(&server.city)
    .bind(&server.region)
    .bind(&server.country)
    .bind(server.last_test_time.map(|t| t.timestamp_millis()))
    .bind(&server.tcp_error_msg)
    .bind(&server.tcp_error_op)
    .bind(&server.udp_error_msg)
    .bind(&server.udp_error_op)
    .bind(now_ms)
    .bind(now_ms)
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::SqlError)?;

    Ok(row.get::<i64, _>("id"))
}

/// Loads exactly the servers with the given ids, ordered by id.
///
/// Returns `DatabaseError::NotFound` naming the missing ids if any id matches no row.
pub async fn get_servers_by_ids(
    pool: &SqlitePool,
    ids: &[i64],
) -> Result<Vec<Server>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT * FROM servers WHERE id IN ({}) ORDER BY id",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    let servers = rows
        .iter()
        .map(server_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !servers.iter().any(|s| s.id == **id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DatabaseError::NotFound(format!(
            "server ids {}",
            missing.join(", ")
        )));
    }

    log::debug!(
        "Retrieved {} servers for {} requested ids",
        servers.len(),
        ids.len()
    );
    Ok(servers)
}

/// Loads every server whose name is one of `names`, ordered by id.
///
/// A name is a group tag, so one name may select several rows. Returns
/// `DatabaseError::NotFound` naming the unmatched names if any name selects nothing.
pub async fn get_servers_by_names(
    pool: &SqlitePool,
    names: &[String],
) -> Result<Vec<Server>, DatabaseError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT * FROM servers WHERE name IN ({}) ORDER BY id",
        placeholders(names.len())
    );
    let mut query = sqlx::query(&sql);
    for name in names {
        query = query.bind(name);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    let servers = rows
        .iter()
        .map(server_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let missing: Vec<&str> = names
        .iter()
        .filter(|name| !servers.iter().any(|s| &s.name == *name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(DatabaseError::NotFound(format!(
            "server names {}",
            missing.join(", ")
        )));
    }

    Ok(servers)
}

/// Loads servers with at least one protocol free of recorded errors, on an allowed port.
///
/// An empty `allowed_ports` slice places no restriction on the port.
pub async fn get_working_servers(
    pool: &SqlitePool,
    allowed_ports: &[String],
) -> Result<Vec<Server>, DatabaseError> {
    let mut sql = String::from(
        "SELECT * FROM servers WHERE (tcp_error_msg = '' OR udp_error_msg = '')",
    );
    if !allowed_ports.is_empty() {
        sql.push_str(&format!(" AND port IN ({})", placeholders(allowed_ports.len())));
    }
    sql.push_str(" ORDER BY id");

    let mut query = sqlx::query(&sql);
    for port in allowed_ports {
        query = query.bind(port);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;

    log::debug!(
        "Working servers query returned {} rows (allowed ports: {:?})",
        rows.len(),
        allowed_ports
    );

    rows.iter().map(server_from_row).collect()
}

/// Loads the servers a retest should probe.
///
/// `tcp` selects servers whose TCP error is anything but a connect failure,
/// `udp` selects servers with a recorded UDP error; both together select
/// either. With neither flag every server is returned.
pub async fn get_servers_for_retest(
    pool: &SqlitePool,
    tcp: bool,
    udp: bool,
) -> Result<Vec<Server>, DatabaseError> {
    let tcp_filter = "(tcp_error_op != '' AND tcp_error_op != 'connect')";
    let udp_filter = "udp_error_msg != ''";
    let filter = match (tcp, udp) {
        (true, true) => format!(" WHERE {} OR {}", tcp_filter, udp_filter),
        (true, false) => format!(" WHERE {}", tcp_filter),
        (false, true) => format!(" WHERE {}", udp_filter),
        (false, false) => String::new(),
    };
    let sql = format!("SELECT * FROM servers{} ORDER BY id", filter);

    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    log::debug!(
        "Retest selection (tcp: {}, udp: {}) returned {} servers",
        tcp,
        udp,
        rows.len()
    );

    rows.iter().map(server_from_row).collect()
}

/// Deletes a server and, through the foreign key, its measurements.
pub async fn delete_server(pool: &SqlitePool, server_id: i64) -> Result<(), DatabaseError> {
    let result = sqlx::query("DELETE FROM servers WHERE id = ?")
        .bind(server_id)
        .execute(pool)
        .await
        .map_err(DatabaseError::SqlError)?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!("server id {}", server_id)));
    }
    Ok(())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn server_from_row(row: &SqliteRow) -> Result<Server, DatabaseError> {
    let last_test_time = row
        .get::<Option<i64>, _>("last_test_time_ms")
        .map(ms_to_datetime)
        .transpose()?;

    Ok(Server {
        id: row.get("id"),
        ip: row.get("ip"),
        port: row.get("port"),
        user_info: row.get("user_info"),
        full_access_link: row.get("full_access_link"),
        scheme: row.get("scheme"),
        domain_name: row.get("domain_name"),
        name: row.get("name"),
        ip_type: row.get("ip_type"),
        as_number: row.get("as_number"),
        as_org: row.get("as_org"),
        city: row.get("city"),
        region: row.get("region"),
        country: row.get("country"),
        last_test_time,
        tcp_error_msg: row.get("tcp_error_msg"),
        tcp_error_op: row.get("tcp_error_op"),
        udp_error_msg: row.get("udp_error_msg"),
        udp_error_op: row.get("udp_error_op"),
    })
}
