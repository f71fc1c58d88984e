use super::model::{QrHistoryEntry, UserAuth};
use crate::model::ResolvedContent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match path.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", expanded, q),
        None => format!("sqlite://{}", expanded),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert a new user. Returns `None` when the email is already taken.
#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, email: &str, password_hash: &str) -> Result<Option<i64>> {
    let row = sqlx::query(
        "INSERT INTO users (email, password_hash) VALUES (?, ?) \
         ON CONFLICT(email) DO NOTHING RETURNING id",
    )
    .bind(email)
    .bind(password_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.get::<i64, _>("id")))
}

#[instrument(skip_all)]
pub async fn find_user_by_email(pool: &Pool, email: &str) -> Result<Option<UserAuth>> {
    let row = sqlx::query("SELECT id, email, password_hash FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| UserAuth {
        id: r.get("id"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
    }))
}

#[instrument(skip_all)]
pub async fn create_session(
    pool: &Pool,
    token: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await
        .context("failed to persist session")?;
    Ok(())
}

/// Owner of an unexpired session token, or `None` for unknown/expired.
#[instrument(skip_all)]
pub async fn session_user_id(pool: &Pool, token: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM sessions WHERE token = ? AND datetime(expires_at) > CURRENT_TIMESTAMP",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn delete_session(pool: &Pool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Startup housekeeping: drop sessions past their expiry.
#[instrument(skip_all)]
pub async fn delete_expired_sessions(pool: &Pool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE datetime(expires_at) <= CURRENT_TIMESTAMP")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[instrument(skip_all)]
pub async fn insert_qr_code(pool: &Pool, user_id: i64, content: &ResolvedContent) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO qr_codes (user_id, kind, display_text, color, size, frame, logo_url, shape) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(content.kind.as_str())
    .bind(&content.display_text)
    .bind(&content.styling.color)
    .bind(content.styling.size as i64)
    .bind(content.styling.frame.map(|f| f.as_str()))
    .bind(content.styling.logo_url.as_deref())
    .bind(content.styling.shape.map(|s| s.as_str()))
    .fetch_one(pool)
    .await
    .context("failed to persist qr code")?;
    Ok(rec.get::<i64, _>("id"))
}

/// A user's history, newest first. Ties on the second-resolution timestamp
/// fall back to insertion order.
#[instrument(skip_all)]
pub async fn list_qr_history(pool: &Pool, user_id: i64) -> Result<Vec<QrHistoryEntry>> {
    let rows = sqlx::query(
        "SELECT id, kind, display_text, color, size, frame, logo_url, shape, created_at \
         FROM qr_codes WHERE user_id = ? \
         ORDER BY datetime(created_at) DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(history_entry_from_row).collect())
}

#[instrument(skip_all)]
pub async fn get_qr_code(pool: &Pool, user_id: i64, id: i64) -> Result<Option<QrHistoryEntry>> {
    let row = sqlx::query(
        "SELECT id, kind, display_text, color, size, frame, logo_url, shape, created_at \
         FROM qr_codes WHERE user_id = ? AND id = ?",
    )
    .bind(user_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(history_entry_from_row))
}

/// Owner-scoped delete. Returns whether a row was actually removed, so the
/// caller can distinguish "deleted" from "absent or not yours".
#[instrument(skip_all)]
pub async fn delete_qr_code(pool: &Pool, user_id: i64, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM qr_codes WHERE user_id = ? AND id = ?")
        .bind(user_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn history_entry_from_row(row: sqlx::sqlite::SqliteRow) -> QrHistoryEntry {
    QrHistoryEntry {
        id: row.get("id"),
        kind: row.get("kind"),
        display_text: row.get("display_text"),
        color: row.get("color"),
        size: row.get("size"),
        frame: row.try_get::<Option<String>, _>("frame").ok().flatten(),
        logo_url: row.try_get::<Option<String>, _>("logo_url").ok().flatten(),
        shape: row.try_get::<Option<String>, _>("shape").ok().flatten(),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentKind, StylingOptions};
    use chrono::Duration;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_content(display: &str) -> ResolvedContent {
        ResolvedContent {
            kind: ContentKind::Text,
            payload: display.to_string(),
            display_text: display.to_string(),
            styling: StylingOptions::default(),
        }
    }

    #[tokio::test]
    async fn create_user_rejects_duplicate_email() {
        let pool = setup_pool().await;
        let id = create_user(&pool, "a@example.com", "hash").await.unwrap();
        assert!(id.is_some());

        let dup = create_user(&pool, "a@example.com", "other").await.unwrap();
        assert!(dup.is_none());

        let auth = find_user_by_email(&pool, "a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth.id, id.unwrap());
        assert_eq!(auth.password_hash, "hash");
    }

    #[tokio::test]
    async fn session_round_trip_and_expiry() {
        let pool = setup_pool().await;
        let uid = create_user(&pool, "s@example.com", "hash")
            .await
            .unwrap()
            .unwrap();

        create_session(&pool, "tok-live", uid, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(session_user_id(&pool, "tok-live").await.unwrap(), Some(uid));
        assert_eq!(session_user_id(&pool, "tok-unknown").await.unwrap(), None);

        create_session(&pool, "tok-stale", uid, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(session_user_id(&pool, "tok-stale").await.unwrap(), None);

        delete_session(&pool, "tok-live").await.unwrap();
        assert_eq!(session_user_id(&pool, "tok-live").await.unwrap(), None);

        let removed = delete_expired_sessions(&pool).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_owner_scoped() {
        let pool = setup_pool().await;
        let alice = create_user(&pool, "alice@example.com", "h")
            .await
            .unwrap()
            .unwrap();
        let bob = create_user(&pool, "bob@example.com", "h")
            .await
            .unwrap()
            .unwrap();

        let first = insert_qr_code(&pool, alice, &sample_content("first")).await.unwrap();
        let second = insert_qr_code(&pool, alice, &sample_content("second")).await.unwrap();
        insert_qr_code(&pool, bob, &sample_content("other")).await.unwrap();

        let history = list_qr_history(&pool, alice).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second);
        assert_eq!(history[1].id, first);
        assert_eq!(history[0].display_text, "second");

        // Bob cannot delete Alice's record.
        assert!(!delete_qr_code(&pool, bob, first).await.unwrap());
        assert!(delete_qr_code(&pool, alice, first).await.unwrap());
        assert!(!delete_qr_code(&pool, alice, first).await.unwrap());
        assert_eq!(list_qr_history(&pool, alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_qr_code_is_owner_scoped() {
        let pool = setup_pool().await;
        let alice = create_user(&pool, "a2@example.com", "h")
            .await
            .unwrap()
            .unwrap();
        let bob = create_user(&pool, "b2@example.com", "h")
            .await
            .unwrap()
            .unwrap();

        let mut content = sample_content("styled");
        content.styling.color = "#FF0000".into();
        content.styling.size = 400;
        let id = insert_qr_code(&pool, alice, &content).await.unwrap();

        let entry = get_qr_code(&pool, alice, id).await.unwrap().unwrap();
        assert_eq!(entry.color, "#FF0000");
        assert_eq!(entry.size, 400);
        assert_eq!(entry.kind, "text");
        assert!(entry.frame.is_none());

        assert!(get_qr_code(&pool, bob, id).await.unwrap().is_none());
    }

    #[test]
    fn prepare_sqlite_url_passthrough() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }

    #[test]
    fn prepare_sqlite_url_normalizes_file_paths() {
        let td = tempfile::tempdir().unwrap();
        let nested = td.path().join("deep/dir/app.db");
        let url = format!("sqlite://{}", nested.display());
        let rebuilt = prepare_sqlite_url(&url);
        assert_eq!(rebuilt, url);
        assert!(nested.parent().unwrap().exists());
    }
}
