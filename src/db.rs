use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

const SCHEMA: [&str; 6] = [
    r#"CREATE TABLE IF NOT EXISTS gva_fans_club (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        avatar TEXT NOT NULL DEFAULT '',
        owner_id INTEGER NOT NULL,
        member_count INTEGER NOT NULL DEFAULT 1,
        level INTEGER NOT NULL DEFAULT 1,
        status INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS gva_fans_club_member (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        club_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        role TEXT NOT NULL DEFAULT 'member',
        level INTEGER NOT NULL DEFAULT 1,
        points INTEGER NOT NULL DEFAULT 0,
        joined_at TEXT NOT NULL,
        UNIQUE (club_id, user_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_fans_club_member_user ON gva_fans_club_member (user_id)",
    r#"CREATE TABLE IF NOT EXISTS gva_fans_club_post (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        club_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        images TEXT NOT NULL DEFAULT '[]',
        like_count INTEGER NOT NULL DEFAULT 0,
        comment_count INTEGER NOT NULL DEFAULT 0
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_fans_club_post_club ON gva_fans_club_post (club_id)",
    "CREATE INDEX IF NOT EXISTS idx_fans_club_post_user ON gva_fans_club_post (user_id)",
];

pub async fn connect(database_url: &str) -> sqlx::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    migrate(&db_pool).await?;

    info!(event = "database_ready", url = database_url);
    Ok(db_pool)
}

/// Creates the fan-club tables. Safe to run on every start.
pub async fn migrate(db_pool: &SqlitePool) -> sqlx::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}
