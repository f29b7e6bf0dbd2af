/// DDL applied at startup, in order. Every statement is idempotent.
pub const SCHEMA: &[&str] = &[
    // `singleton` can only ever hold 1 and is unique, so the table holds at most one row.
    r#"CREATE TABLE IF NOT EXISTS instances (
        id BLOB PRIMARY KEY NOT NULL,
        singleton INTEGER NOT NULL DEFAULT 1 UNIQUE CHECK (singleton = 1),
        instance_name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        whitelist_emails TEXT,
        namespace TEXT,
        version TEXT NOT NULL,
        is_telemetry_enabled INTEGER NOT NULL DEFAULT 1,
        is_support_required INTEGER NOT NULL DEFAULT 1,
        is_verified INTEGER NOT NULL DEFAULT 0,
        is_setup_done INTEGER NOT NULL DEFAULT 0,
        is_signup_screen_visited INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        display_name TEXT NOT NULL DEFAULT '',
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        avatar TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        is_password_autoset INTEGER NOT NULL DEFAULT 0,
        last_active TEXT,
        last_login_time TEXT,
        last_login_ip TEXT,
        last_login_uagent TEXT,
        token_updated_at TEXT,
        date_joined TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS instance_admins (
        id BLOB PRIMARY KEY NOT NULL,
        instance_id BLOB NOT NULL REFERENCES instances(id) ON DELETE CASCADE,
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role INTEGER NOT NULL DEFAULT 20,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (instance_id, user_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS instance_configurations (
        id BLOB PRIMARY KEY NOT NULL,
        "key" TEXT NOT NULL UNIQUE,
        value TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT '',
        is_encrypted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
];
