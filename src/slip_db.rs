use crate::sheet_store::SubmitPayload;
use rusqlite::{Connection, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// Local audit trail of what a run saw and sent. Never used for dedup;
/// the spreadsheet stays the source of truth for known POs.
pub struct SlipJournal {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Text,
    Error,
}

impl DocumentStatus {
    fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Text => "text",
            DocumentStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted,
    Duplicate,
    Failed,
}

impl SubmissionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            SubmissionOutcome::Submitted => "submitted",
            SubmissionOutcome::Duplicate => "duplicate",
            SubmissionOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct StoredSubmission {
    pub id: i64,
    pub purchase_order: String,
    pub item_number: String,
    pub quantity: String,
    pub order_date: String,
    pub province: String,
    pub ship_to: String,
    pub outcome: String,
    pub error: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct JournalCounts {
    pub documents: usize,
    pub failed_documents: usize,
    pub submitted: usize,
    pub duplicates: usize,
    pub failed_submissions: usize,
}

impl SlipJournal {
    /// Open (or create) the journal at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                uid TEXT PRIMARY KEY,
                location TEXT NOT NULL,
                status TEXT NOT NULL,
                pages INTEGER NOT NULL DEFAULT 0,
                extracted_text TEXT,
                error TEXT,
                seen_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_uid TEXT NOT NULL,
                purchase_order TEXT NOT NULL,
                item_number TEXT NOT NULL,
                quantity TEXT NOT NULL,
                order_date TEXT NOT NULL,
                province TEXT NOT NULL,
                ship_to TEXT NOT NULL,
                outcome TEXT NOT NULL,
                error TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (document_uid) REFERENCES documents(uid)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_submissions_document_uid ON submissions(document_uid)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_submissions_purchase_order ON submissions(purchase_order)",
            [],
        )?;

        info!("Journal initialized successfully");
        Ok(Self { conn })
    }

    /// Stable id for a document location.
    pub fn document_uid(location: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(location.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Insert or refresh a document row; returns its uid.
    pub fn record_document(
        &self,
        location: &str,
        status: DocumentStatus,
        pages: usize,
        extracted_text: Option<&str>,
        error: Option<&str>,
    ) -> SqliteResult<String> {
        let uid = Self::document_uid(location);
        self.conn.execute(
            "INSERT INTO documents (uid, location, status, pages, extracted_text, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uid) DO UPDATE SET
                status = excluded.status,
                pages = excluded.pages,
                extracted_text = excluded.extracted_text,
                error = excluded.error,
                seen_at = CURRENT_TIMESTAMP",
            params![uid, location, status.as_str(), pages as i64, extracted_text, error],
        )?;
        info!(uid = %uid, status = status.as_str(), "Document journaled");
        Ok(uid)
    }

    pub fn record_submission(
        &self,
        document_uid: &str,
        payload: &SubmitPayload,
        outcome: SubmissionOutcome,
        error: Option<&str>,
    ) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO submissions
                (document_uid, purchase_order, item_number, quantity, order_date, province, ship_to, outcome, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                document_uid,
                payload.purchase_order,
                payload.item_number,
                payload.quantity,
                payload.order_date,
                payload.province,
                payload.ship_to,
                outcome.as_str(),
                error,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All submissions logged for one document, oldest first.
    pub fn submissions_for(&self, document_uid: &str) -> SqliteResult<Vec<StoredSubmission>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, purchase_order, item_number, quantity, order_date, province, ship_to, outcome, error
             FROM submissions
             WHERE document_uid = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![document_uid], |row| Self::row_to_submission(row))?;
        rows.collect()
    }

    fn row_to_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredSubmission> {
        Ok(StoredSubmission {
            id: row.get(0)?,
            purchase_order: row.get(1)?,
            item_number: row.get(2)?,
            quantity: row.get(3)?,
            order_date: row.get(4)?,
            province: row.get(5)?,
            ship_to: row.get(6)?,
            outcome: row.get(7)?,
            error: row.get(8)?,
        })
    }

    pub fn counts(&self) -> SqliteResult<JournalCounts> {
        let count = |sql: &str| -> SqliteResult<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(JournalCounts {
            documents: count("SELECT COUNT(*) FROM documents")?,
            failed_documents: count("SELECT COUNT(*) FROM documents WHERE status = 'error'")?,
            submitted: count("SELECT COUNT(*) FROM submissions WHERE outcome = 'submitted'")?,
            duplicates: count("SELECT COUNT(*) FROM submissions WHERE outcome = 'duplicate'")?,
            failed_submissions: count("SELECT COUNT(*) FROM submissions WHERE outcome = 'failed'")?,
        })
    }
}
