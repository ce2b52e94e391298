use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::{ConnectionRecord, JobFlag, StoredJob};

/// Column order of the jobs table. The first fourteen are the exported
/// schema; the rest record how the score was reached.
const JOB_COLUMNS: &str = "posting_id, title, company, location, job_url, source, applicants,
    posted_date, scraped_date, match_score, viewed, saved, applied, emailed,
    match_reason, model_used, reranked, first_score, reason_first, reason_rerank,
    model_used_rerank, description";

const CONNECTION_COLUMNS: &str = "date, name, title, profile_url, company, country,
    role_searched, role_match, message_available, connected, status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total: u64,
    pub viewed: u64,
    pub saved: u64,
    pub applied: u64,
    pub emailed: u64,
    pub reranked: u64,
    pub average_score: Option<f64>,
    pub connections: u64,
}

/// Accepted postings and the outreach log, in SQLite.
pub struct JobStore {
    conn: Connection,
    path: PathBuf,
}

impl JobStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                posting_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                job_url TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                applicants INTEGER,
                posted_date TEXT NOT NULL DEFAULT '',
                scraped_date TEXT NOT NULL,
                match_score REAL NOT NULL,
                viewed INTEGER NOT NULL DEFAULT 0,
                saved INTEGER NOT NULL DEFAULT 0,
                applied INTEGER NOT NULL DEFAULT 0,
                emailed INTEGER NOT NULL DEFAULT 0,
                match_reason TEXT NOT NULL DEFAULT '',
                model_used TEXT,
                reranked INTEGER NOT NULL DEFAULT 0,
                first_score REAL NOT NULL DEFAULT 0,
                reason_first TEXT NOT NULL DEFAULT '',
                reason_rerank TEXT,
                model_used_rerank TEXT,
                description TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                profile_url TEXT NOT NULL DEFAULT '',
                company TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                role_searched TEXT NOT NULL DEFAULT '',
                role_match INTEGER NOT NULL DEFAULT 0,
                message_available INTEGER NOT NULL DEFAULT 0,
                connected INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_score ON jobs(match_score);
            "#,
        )?;
        Ok(())
    }

    // --- Job operations ---

    /// Insert a new posting, or refresh the mutable fields of an existing one.
    /// Flags and the first-scraped date survive an update.
    pub fn upsert(&mut self, job: &StoredJob) -> Result<UpsertOutcome> {
        let tx = self.conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM jobs WHERE posting_id = ?1",
                [&job.posting_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let outcome = if exists {
            tx.execute(
                "UPDATE jobs SET title = ?2, company = ?3, location = ?4, job_url = ?5,
                        source = ?6, applicants = ?7, posted_date = ?8, match_score = ?9,
                        match_reason = ?10, model_used = ?11, reranked = ?12, first_score = ?13,
                        reason_first = ?14, reason_rerank = ?15, model_used_rerank = ?16,
                        description = ?17, updated_at = datetime('now')
                 WHERE posting_id = ?1",
                params![
                    job.posting_id,
                    job.title,
                    job.company,
                    job.location,
                    job.job_url,
                    job.source,
                    job.applicants,
                    job.posted_date,
                    job.match_score,
                    job.match_reason,
                    job.model_used,
                    job.reranked,
                    job.first_score,
                    job.reason_first,
                    job.reason_rerank,
                    job.model_used_rerank,
                    job.description,
                ],
            )?;
            UpsertOutcome::Updated
        } else {
            tx.execute(
                &format!(
                    "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                        0, 0, 0, 0, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                    JOB_COLUMNS
                ),
                params![
                    job.posting_id,
                    job.title,
                    job.company,
                    job.location,
                    job.job_url,
                    job.source,
                    job.applicants,
                    job.posted_date,
                    job.scraped_date,
                    job.match_score,
                    job.match_reason,
                    job.model_used,
                    job.reranked,
                    job.first_score,
                    job.reason_first,
                    job.reason_rerank,
                    job.model_used_rerank,
                    job.description,
                ],
            )?;
            UpsertOutcome::Inserted
        };
        tx.commit()?;

        debug!(posting_id = %job.posting_id, ?outcome, "stored job");
        Ok(outcome)
    }

    pub fn get(&self, posting_id: &str) -> Result<Option<StoredJob>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE posting_id = ?1", JOB_COLUMNS),
                [posting_id],
                Self::row_to_job,
            )
            .optional()
            .context("Failed to load job")
    }

    /// Jobs at or above `min_score`, best first.
    pub fn list(&self, min_score: Option<f64>) -> Result<Vec<StoredJob>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE match_score >= ?1
             ORDER BY match_score DESC, scraped_date DESC",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([min_score.unwrap_or(f64::MIN)], Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")
    }

    /// Returns false when no job has that id.
    pub fn set_flag(&mut self, posting_id: &str, flag: JobFlag, value: bool) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            &format!(
                "UPDATE jobs SET {} = ?1, updated_at = datetime('now') WHERE posting_id = ?2",
                flag.column()
            ),
            params![value, posting_id],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<StoredJob> {
        Ok(StoredJob {
            posting_id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            location: row.get(3)?,
            job_url: row.get(4)?,
            source: row.get(5)?,
            applicants: row.get(6)?,
            posted_date: row.get(7)?,
            scraped_date: row.get(8)?,
            match_score: row.get(9)?,
            viewed: row.get(10)?,
            saved: row.get(11)?,
            applied: row.get(12)?,
            emailed: row.get(13)?,
            match_reason: row.get(14)?,
            model_used: row.get(15)?,
            reranked: row.get(16)?,
            first_score: row.get(17)?,
            reason_first: row.get(18)?,
            reason_rerank: row.get(19)?,
            model_used_rerank: row.get(20)?,
            description: row.get(21)?,
        })
    }

    // --- Connection log ---

    pub fn append_connection(&mut self, record: &ConnectionRecord) -> Result<()> {
        if record.name.trim().is_empty() {
            return Err(anyhow!("connection record has no name"));
        }
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO connections ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                CONNECTION_COLUMNS
            ),
            params![
                record.timestamp,
                record.name,
                record.title,
                record.profile_url,
                record.company,
                record.country,
                record.role_searched,
                record.role_match,
                record.message_available,
                record.connected,
                record.status,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM connections ORDER BY id",
            CONNECTION_COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ConnectionRecord {
                timestamp: row.get(0)?,
                name: row.get(1)?,
                title: row.get(2)?,
                profile_url: row.get(3)?,
                company: row.get(4)?,
                country: row.get(5)?,
                role_searched: row.get(6)?,
                role_match: row.get(7)?,
                message_available: row.get(8)?,
                connected: row.get(9)?,
                status: row.get(10)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list connections")
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(viewed), 0), COALESCE(SUM(saved), 0),
                    COALESCE(SUM(applied), 0), COALESCE(SUM(emailed), 0),
                    COALESCE(SUM(reranked), 0), AVG(match_score)
             FROM jobs",
            [],
            |row| {
                Ok(StoreStats {
                    total: row.get::<_, i64>(0)? as u64,
                    viewed: row.get::<_, i64>(1)? as u64,
                    saved: row.get::<_, i64>(2)? as u64,
                    applied: row.get::<_, i64>(3)? as u64,
                    emailed: row.get::<_, i64>(4)? as u64,
                    reranked: row.get::<_, i64>(5)? as u64,
                    average_score: row.get(6)?,
                    connections: 0,
                })
            },
        )?;
        stats.connections =
            self.conn
                .query_row("SELECT COUNT(*) FROM connections", [], |row| row.get::<_, i64>(0))? as u64;
        Ok(stats)
    }
}
