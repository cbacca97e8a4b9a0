//! SQLite-backed [`TriageStore`] implementation.
//!
//! Every mutating operation is one statement. Identity invariants
//! (`(owner, repo)`, `(repo_id, number)`, `(issue_id, similar_issue_id)`)
//! are enforced by UNIQUE/PRIMARY KEY constraints and `ON CONFLICT`
//! upserts, so concurrent deliveries of the same event cannot create
//! duplicate rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use triage_core::embedding::{blob_to_vec, vec_to_blob};
use triage_core::models::{
    DecisionLog, Issue, IssueRecord, NewSuggestion, RepoRef, SimilarLink, StoredEmbedding,
    TriageSuggestion,
};
use triage_core::store::TriageStore;

/// SQLite implementation of the [`TriageStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Release pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn issue_from_row(row: &SqliteRow) -> Issue {
    let number: i64 = row.get("number");
    Issue {
        id: row.get("id"),
        repo_id: row.get("repo_id"),
        number: number as u64,
        title: row.get("title"),
        body: row.get("body"),
        state: row.get("state"),
        author: row.get("author"),
        updated_at: row.get("updated_at"),
    }
}

fn suggestion_from_row(row: &SqliteRow) -> Result<TriageSuggestion> {
    let labels_json: String = row.get("labels_json");
    let assignees_json: String = row.get("assignees_json");
    let confidence_json: String = row.get("confidence_json");
    Ok(TriageSuggestion {
        id: row.get("id"),
        issue_id: row.get("issue_id"),
        labels: serde_json::from_str(&labels_json).context("corrupt suggestion labels")?,
        assignees: serde_json::from_str(&assignees_json)
            .context("corrupt suggestion assignees")?,
        priority_score: row.get("priority_score"),
        confidence: serde_json::from_str(&confidence_json)
            .context("corrupt suggestion confidence")?,
        rationale: row.get("rationale"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl TriageStore for SqliteStore {
    async fn upsert_repository(
        &self,
        repo: &RepoRef,
        installation_id: Option<u64>,
    ) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO repositories (id, owner, repo, installation_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(owner, repo) DO UPDATE SET
                installation_id = COALESCE(excluded.installation_id, repositories.installation_id)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(installation_id.map(|id| id as i64))
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    async fn upsert_issue(&self, repo_id: &str, issue: &IssueRecord) -> Result<Issue> {
        let now = now_ms();
        let row = sqlx::query(
            r#"
            INSERT INTO issues (id, repo_id, number, title, body, state, author,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repo_id, number) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                state = excluded.state,
                author = excluded.author,
                updated_at = excluded.updated_at
            RETURNING id, repo_id, number, title, body, state, author, updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(repo_id)
        .bind(issue.number as i64)
        .bind(&issue.title)
        .bind(&issue.body)
        .bind(&issue.state)
        .bind(&issue.author)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(issue_from_row(&row))
    }

    async fn insert_embedding(
        &self,
        issue_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO issue_embeddings (id, issue_id, vector, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(issue_id)
        .bind(vec_to_blob(vector))
        .bind(model)
        .bind(vector.len() as i64)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn recent_embeddings(
        &self,
        exclude_issue_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredEmbedding>> {
        // Keep only the newest embedding of each issue; rowid breaks
        // same-millisecond ties in insertion order.
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.issue_id, e.vector, e.model, e.created_at,
                   i.number, i.title
            FROM issue_embeddings e
            JOIN issues i ON i.id = e.issue_id
            WHERE e.issue_id != ?
              AND NOT EXISTS (
                  SELECT 1 FROM issue_embeddings n
                  WHERE n.issue_id = e.issue_id
                    AND (n.created_at > e.created_at
                         OR (n.created_at = e.created_at AND n.rowid > e.rowid))
              )
            ORDER BY e.created_at DESC, e.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(exclude_issue_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let number: i64 = row.get("number");
                StoredEmbedding {
                    id: row.get("id"),
                    issue_id: row.get("issue_id"),
                    issue_number: number as u64,
                    issue_title: row.get("title"),
                    vector: blob_to_vec(&blob),
                    model: row.get("model"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    async fn upsert_similar_link(
        &self,
        issue_id: &str,
        similar_issue_id: &str,
        score: f32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO similar_links (issue_id, similar_issue_id, score, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(issue_id, similar_issue_id) DO UPDATE SET
                score = excluded.score,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(issue_id)
        .bind(similar_issue_id)
        .bind(score as f64)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_suggestion(&self, suggestion: &NewSuggestion) -> Result<TriageSuggestion> {
        let row = TriageSuggestion {
            id: Uuid::new_v4().to_string(),
            issue_id: suggestion.issue_id.clone(),
            labels: suggestion.labels.clone(),
            assignees: suggestion.assignees.clone(),
            priority_score: suggestion.priority_score,
            confidence: suggestion.confidence.clone(),
            rationale: suggestion.rationale.clone(),
            created_at: now_ms(),
        };

        sqlx::query(
            r#"
            INSERT INTO triage_suggestions (id, issue_id, labels_json, assignees_json,
                                            priority_score, confidence_json, rationale, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.issue_id)
        .bind(serde_json::to_string(&row.labels)?)
        .bind(serde_json::to_string(&row.assignees)?)
        .bind(row.priority_score)
        .bind(row.confidence.to_string())
        .bind(&row.rationale)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert_decision_log(
        &self,
        issue_id: &str,
        action: &str,
        actor: &str,
        payload: &serde_json::Value,
    ) -> Result<DecisionLog> {
        let row = DecisionLog {
            id: Uuid::new_v4().to_string(),
            issue_id: issue_id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            payload: payload.clone(),
            created_at: now_ms(),
        };

        sqlx::query(
            r#"
            INSERT INTO decision_logs (id, issue_id, action, actor, payload_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.issue_id)
        .bind(&row.action)
        .bind(&row.actor)
        .bind(row.payload.to_string())
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_issue_by_number(&self, number: u64) -> Result<Option<Issue>> {
        let row = sqlx::query(
            r#"
            SELECT id, repo_id, number, title, body, state, author, updated_at
            FROM issues
            WHERE number = ?
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
            "#,
        )
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(issue_from_row))
    }

    async fn latest_suggestion(&self, issue_id: &str) -> Result<Option<TriageSuggestion>> {
        let row = sqlx::query(
            r#"
            SELECT id, issue_id, labels_json, assignees_json, priority_score,
                   confidence_json, rationale, created_at
            FROM triage_suggestions
            WHERE issue_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(issue_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(suggestion_from_row).transpose()
    }

    async fn similar_links(&self, issue_id: &str) -> Result<Vec<SimilarLink>> {
        let rows = sqlx::query(
            r#"
            SELECT l.issue_id, l.similar_issue_id, l.score, i.number
            FROM similar_links l
            JOIN issues i ON i.id = l.similar_issue_id
            WHERE l.issue_id = ?
            ORDER BY l.score DESC
            "#,
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let score: f64 = row.get("score");
                let number: i64 = row.get("number");
                SimilarLink {
                    issue_id: row.get("issue_id"),
                    similar_issue_id: row.get("similar_issue_id"),
                    similar_issue_number: number as u64,
                    score: score as f32,
                }
            })
            .collect())
    }

    async fn decision_logs(&self, issue_id: &str) -> Result<Vec<DecisionLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, issue_id, action, actor, payload_json, created_at
            FROM decision_logs
            WHERE issue_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payload_json: String = row.get("payload_json");
                Ok(DecisionLog {
                    id: row.get("id"),
                    issue_id: row.get("issue_id"),
                    action: row.get("action"),
                    actor: row.get("actor"),
                    payload: serde_json::from_str(&payload_json)
                        .context("corrupt decision payload")?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use serde_json::json;
    use tempfile::TempDir;

    async fn test_store(tmp: &TempDir) -> SqliteStore {
        let mut config = crate::config::Config::minimal();
        config.db.path = tmp.path().join("triage.sqlite");
        let pool = crate::db::connect(&config).await.unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(number: u64, title: &str, body: &str) -> IssueRecord {
        IssueRecord {
            repo: RepoRef::new("acme", "widgets"),
            number,
            title: title.to_string(),
            body: body.to_string(),
            state: "open".to_string(),
            author: "octocat".to_string(),
        }
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reingest_updates_single_issue_row() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let repo = RepoRef::new("acme", "widgets");

        let repo_id = store.upsert_repository(&repo, None).await.unwrap();
        let first = store
            .upsert_issue(&repo_id, &record(42, "Crash", "old body"))
            .await
            .unwrap();
        let repo_id_again = store.upsert_repository(&repo, Some(9)).await.unwrap();
        let second = store
            .upsert_issue(&repo_id_again, &record(42, "Crash on startup", "new body"))
            .await
            .unwrap();

        assert_eq!(repo_id, repo_id_again);
        assert_eq!(first.id, second.id);
        assert_eq!(count(&store, "issues").await, 1);
        assert_eq!(count(&store, "repositories").await, 1);

        let found = store.find_issue_by_number(42).await.unwrap().unwrap();
        assert_eq!(found.title, "Crash on startup");
        assert_eq!(found.body, "new body");
    }

    #[tokio::test]
    async fn test_recent_embeddings_newest_per_other_issue() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let a = store.upsert_issue(&repo_id, &record(1, "a", "")).await.unwrap();
        let b = store.upsert_issue(&repo_id, &record(2, "b", "")).await.unwrap();
        let target = store.upsert_issue(&repo_id, &record(3, "t", "")).await.unwrap();

        store.insert_embedding(&a.id, &[1.0, 0.0], "m").await.unwrap();
        store.insert_embedding(&b.id, &[0.0, 1.0], "m").await.unwrap();
        store.insert_embedding(&a.id, &[0.6, 0.8], "m").await.unwrap();
        store.insert_embedding(&target.id, &[1.0, 1.0], "m").await.unwrap();

        let recent = store.recent_embeddings(&target.id, 50).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].issue_number, 1);
        assert_eq!(recent[0].vector, vec![0.6, 0.8]);
        assert_eq!(recent[1].issue_number, 2);
        assert_eq!(count(&store, "issue_embeddings").await, 4);
    }

    #[tokio::test]
    async fn test_similar_link_upsert_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let a = store.upsert_issue(&repo_id, &record(1, "a", "")).await.unwrap();
        let b = store.upsert_issue(&repo_id, &record(2, "b", "")).await.unwrap();

        store.upsert_similar_link(&a.id, &b.id, 0.25).await.unwrap();
        store.upsert_similar_link(&a.id, &b.id, -0.5).await.unwrap();

        let links = store.similar_links(&a.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].score, -0.5);
        assert_eq!(links[0].similar_issue_number, 2);
    }

    #[tokio::test]
    async fn test_suggestion_and_decision_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let issue = store.upsert_issue(&repo_id, &record(7, "t", "")).await.unwrap();

        assert!(store.latest_suggestion(&issue.id).await.unwrap().is_none());

        for rationale in ["older", "newer"] {
            store
                .insert_suggestion(&NewSuggestion {
                    issue_id: issue.id.clone(),
                    labels: vec![],
                    assignees: vec![],
                    priority_score: 0.0,
                    confidence: json!({ "retrieval": { "k": 0 } }),
                    rationale: rationale.to_string(),
                })
                .await
                .unwrap();
        }

        let current = store.latest_suggestion(&issue.id).await.unwrap().unwrap();
        assert_eq!(current.rationale, "newer");
        assert_eq!(current.confidence["retrieval"]["k"], 0);

        let payload = serde_json::to_value(&current).unwrap();
        store
            .insert_decision_log(&issue.id, "APPLY_SUGGESTION", "system", &payload)
            .await
            .unwrap();
        let logs = store.decision_logs(&issue.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].payload["rationale"], "newer");
    }

    #[tokio::test]
    async fn test_corrupt_confidence_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let issue = store.upsert_issue(&repo_id, &record(7, "t", "")).await.unwrap();
        let suggestion = store
            .insert_suggestion(&NewSuggestion {
                issue_id: issue.id.clone(),
                labels: vec![],
                assignees: vec![],
                priority_score: 0.0,
                confidence: json!({}),
                rationale: "r".to_string(),
            })
            .await
            .unwrap();

        sqlx::query("UPDATE triage_suggestions SET confidence_json = 'not json' WHERE id = ?")
            .bind(&suggestion.id)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.latest_suggestion(&issue.id).await.unwrap_err();
        assert!(format!("{:#}", err).contains("corrupt suggestion confidence"));
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;
        migrate_pool(store.pool()).await.unwrap();
        assert_eq!(count(&store, "issues").await, 0);
    }
}
