use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            repo TEXT NOT NULL,
            installation_id INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(owner, repo)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT 'open',
            author TEXT NOT NULL DEFAULT 'unknown',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(repo_id, number),
            FOREIGN KEY (repo_id) REFERENCES repositories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issue_embeddings (
            id TEXT PRIMARY KEY,
            issue_id TEXT NOT NULL,
            vector BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (issue_id) REFERENCES issues(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similar_links (
            issue_id TEXT NOT NULL,
            similar_issue_id TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (issue_id, similar_issue_id),
            FOREIGN KEY (issue_id) REFERENCES issues(id),
            FOREIGN KEY (similar_issue_id) REFERENCES issues(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS triage_suggestions (
            id TEXT PRIMARY KEY,
            issue_id TEXT NOT NULL,
            labels_json TEXT NOT NULL DEFAULT '[]',
            assignees_json TEXT NOT NULL DEFAULT '[]',
            priority_score REAL NOT NULL DEFAULT 0,
            confidence_json TEXT NOT NULL DEFAULT '{}',
            rationale TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (issue_id) REFERENCES issues(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decision_logs (
            id TEXT PRIMARY KEY,
            issue_id TEXT NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (issue_id) REFERENCES issues(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_issue_created ON issue_embeddings(issue_id, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_created_at ON issue_embeddings(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_issue_created ON triage_suggestions(issue_id, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_issue ON decision_logs(issue_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_issues_number ON issues(number)")
        .execute(pool)
        .await?;

    Ok(())
}
