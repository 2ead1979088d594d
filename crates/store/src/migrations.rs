use sqlx::SqlitePool;

/// Create every table this crate needs, if absent.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            totp_secret_encrypted TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            is_temporary INTEGER NOT NULL DEFAULT 0,
            password_change_required INTEGER NOT NULL DEFAULT 0,
            permissions TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            last_login TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            expires_utc TEXT NOT NULL,
            totp_verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS sessions_username_idx ON sessions (username)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS pending_setups (
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            new_password_hash TEXT NOT NULL,
            totp_secret_encrypted TEXT NOT NULL,
            expires_utc TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            agent_type TEXT NOT NULL,
            hostname TEXT NOT NULL,
            ip TEXT NOT NULL,
            mac TEXT,
            machine_id TEXT,
            devices TEXT NOT NULL DEFAULT '[]',
            api_key_hash TEXT,
            status TEXT NOT NULL DEFAULT 'offline',
            enabled INTEGER NOT NULL DEFAULT 1,
            last_heartbeat TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS enrollment_tokens (
            token TEXT PRIMARY KEY,
            runner_name TEXT NOT NULL,
            created_by TEXT NOT NULL,
            expires_utc TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            used_at TEXT,
            used_by_runner_id TEXT,
            re_enrollment_for TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS provisioning_keys (
            key_id TEXT PRIMARY KEY,
            api_key_hash TEXT NOT NULL,
            description TEXT NOT NULL,
            created_by TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS challenges (
            challenge_id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            config TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'queued',
            priority INTEGER NOT NULL DEFAULT 0,
            assigned_to TEXT,
            assigned_at TEXT,
            assignment_expires TEXT,
            last_tx_time TEXT,
            transmission_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS challenges_status_idx ON challenges (status, enabled)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transmissions (
            id TEXT PRIMARY KEY,
            challenge_id TEXT NOT NULL,
            runner_id TEXT NOT NULL,
            device_id TEXT,
            frequency_hz INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL,
            error_message TEXT
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS transmissions_challenge_idx ON transmissions (challenge_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recordings (
            id TEXT PRIMARY KEY,
            challenge_id TEXT NOT NULL,
            transmission_id TEXT NOT NULL,
            listener_id TEXT NOT NULL,
            frequency_hz INTEGER NOT NULL,
            sample_rate INTEGER NOT NULL,
            expected_duration_s REAL NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            success INTEGER,
            image_path TEXT,
            image_width INTEGER,
            image_height INTEGER,
            error_message TEXT
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS recordings_transmission_idx ON recordings (transmission_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS files (
            file_hash TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            size INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            path TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS system_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
