//! Persisted label state
//!
//! The store records which (identity, label) pairs are currently asserted.
//! It is the only durable state the reconciliation engine reads.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::task;

use super::LabelPlan;
use crate::error::Result;
use crate::fortune::{Identity, Outcome};

/// One row of the label table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub uri: String,
    pub val: String,
    pub cts: String,
    pub neg: bool,
}

#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Distinct identities with any row, asserted or negated.
    ///
    /// All-negated rows only survive a removal whose purge failed, so they
    /// stay tracked until a later pass purges them.
    async fn list_tracked_identities(&self) -> Result<Vec<Identity>>;

    /// Labels currently asserted for `identity`.
    async fn asserted_outcomes(&self, identity: &str) -> Result<BTreeSet<Outcome>>;

    /// Record a plan atomically: both lists land or neither does.
    async fn apply_plan(&self, identity: &str, plan: &LabelPlan) -> Result<()>;

    /// Remove every row for `identity`.
    async fn purge_identity(&self, identity: &str) -> Result<()>;

    /// Rows matching any pattern; a trailing `*` matches by prefix.
    async fn query_labels(&self, patterns: &[String]) -> Result<Vec<LabelRecord>>;
}

/// SQLite implementation sharing the labeler's `labels` table layout.
#[derive(Clone)]
pub struct SqliteLabelStore {
    db_path: PathBuf,
}

impl SqliteLabelStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let path_clone = path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone)?;
            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS labels (
                    uri TEXT NOT NULL,
                    val TEXT NOT NULL,
                    cts TEXT NOT NULL,
                    neg INTEGER DEFAULT 0,
                    PRIMARY KEY (uri, val)
                );
                "#,
                [],
            )?;
            Ok::<_, crate::error::LabelerError>(())
        })
        .await??;

        Ok(Self { db_path: path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

fn now_cts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl LabelStore for SqliteLabelStore {
    async fn list_tracked_identities(&self) -> Result<Vec<Identity>> {
        let path = self.db_path.clone();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            let mut stmt = conn.prepare(
                "SELECT DISTINCT uri FROM labels WHERE uri LIKE 'did:%' ORDER BY uri",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let ids = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await?
    }

    async fn asserted_outcomes(&self, identity: &str) -> Result<BTreeSet<Outcome>> {
        let path = self.db_path.clone();
        let uri = identity.to_string();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            let mut stmt = conn.prepare("SELECT val FROM labels WHERE uri = ?1 AND neg = 0")?;
            let rows = stmt.query_map(params![&uri], |row| row.get::<_, String>(0))?;
            let mut asserted = BTreeSet::new();
            for val in rows {
                asserted.insert(Outcome::new(val?));
            }
            Ok(asserted)
        })
        .await?
    }

    async fn apply_plan(&self, identity: &str, plan: &LabelPlan) -> Result<()> {
        let path = self.db_path.clone();
        let uri = identity.to_string();
        let plan = plan.clone();

        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            let tx = conn.transaction()?;
            let cts = now_cts();

            for outcome in &plan.create {
                tx.execute(
                    "INSERT INTO labels (uri, val, cts, neg) VALUES (?1, ?2, ?3, 0)
                     ON CONFLICT(uri, val) DO UPDATE SET neg = 0, cts = excluded.cts
                     WHERE labels.neg != 0",
                    params![&uri, outcome.as_str(), &cts],
                )?;
            }
            for outcome in &plan.negate {
                tx.execute(
                    "UPDATE labels SET neg = 1, cts = ?3 WHERE uri = ?1 AND val = ?2 AND neg = 0",
                    params![&uri, outcome.as_str(), &cts],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await?
    }

    async fn purge_identity(&self, identity: &str) -> Result<()> {
        let path = self.db_path.clone();
        let uri = identity.to_string();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.execute("DELETE FROM labels WHERE uri = ?1", params![&uri])?;
            Ok(())
        })
        .await?
    }

    async fn query_labels(&self, patterns: &[String]) -> Result<Vec<LabelRecord>> {
        let path = self.db_path.clone();
        let patterns = patterns.to_vec();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            let mut found: BTreeMap<(String, String), LabelRecord> = BTreeMap::new();

            for pattern in &patterns {
                let (sql, arg) = match pattern.strip_suffix('*') {
                    Some(prefix) => (
                        "SELECT uri, val, cts, neg FROM labels WHERE substr(uri, 1, length(?1)) = ?1",
                        prefix.to_string(),
                    ),
                    None => (
                        "SELECT uri, val, cts, neg FROM labels WHERE uri = ?1",
                        pattern.clone(),
                    ),
                };
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map(params![&arg], |row| {
                    Ok(LabelRecord {
                        uri: row.get(0)?,
                        val: row.get(1)?,
                        cts: row.get(2)?,
                        neg: row.get::<_, i64>(3)? != 0,
                    })
                })?;
                for record in rows {
                    let record = record?;
                    found.insert((record.uri.clone(), record.val.clone()), record);
                }
            }

            Ok(found.into_values().collect())
        })
        .await?
    }
}
