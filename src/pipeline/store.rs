use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::model::{ExtractedRecord, FormRecord};
use crate::util::{ensure_directory, now_utc_string};

const DB_SCHEMA_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub cards: i64,
    pub properties: i64,
    pub last_imported_at: Option<String>,
}

/// Product cards keyed by card number; a later import of the same card
/// replaces the earlier one.
pub struct CardStore {
    connection: Connection,
}

impl CardStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Writes the card and replaces its property rows. Returns the key used.
    pub fn upsert_card(
        &mut self,
        record: &ExtractedRecord,
        form: &FormRecord,
        source_sha256: &str,
    ) -> Result<String> {
        let card_no = card_key(record)?;
        let form_json = serde_json::to_string(form).context("failed to serialize card form")?;
        let imported_at = now_utc_string();

        let tx = self.connection.transaction()?;
        tx.execute(
            "
            INSERT INTO cards(card_no, article_index, source_file, source_sha256, prepared_by, imported_at, form_json)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(card_no) DO UPDATE SET
              article_index=excluded.article_index,
              source_file=excluded.source_file,
              source_sha256=excluded.source_sha256,
              prepared_by=excluded.prepared_by,
              imported_at=excluded.imported_at,
              form_json=excluded.form_json
            ",
            params![
                card_no,
                record.article_index,
                record.source_file,
                source_sha256,
                record.prepared_by,
                imported_at,
                form_json,
            ],
        )?;

        tx.execute("DELETE FROM card_properties WHERE card_no = ?1", [&card_no])?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO card_properties(card_no, parameter, name, method, value, value_num, minus, plus, unit)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;
            for row in &form.properties {
                statement.execute(params![
                    card_no,
                    row.parameter.as_str(),
                    row.name,
                    row.method,
                    row.value,
                    record.parameter(row.parameter).numeric(),
                    row.minus,
                    row.plus,
                    row.unit,
                ])?;
            }
        }

        tx.commit()?;
        Ok(card_no)
    }

    pub fn load_card(&self, card_no: &str) -> Result<Option<FormRecord>> {
        let raw: Option<String> = self
            .connection
            .query_row(
                "SELECT form_json FROM cards WHERE card_no = ?1",
                [card_no],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to load card {card_no}"))?;

        raw.map(|json| {
            serde_json::from_str::<FormRecord>(&json)
                .with_context(|| format!("failed to parse stored card {card_no}"))
        })
        .transpose()
    }

    pub fn count_cards(&self) -> Result<i64> {
        count_rows(&self.connection, "SELECT COUNT(*) FROM cards")
    }

    pub fn count_properties(&self) -> Result<i64> {
        count_rows(&self.connection, "SELECT COUNT(*) FROM card_properties")
    }

    pub fn last_imported_at(&self) -> Result<Option<String>> {
        let value = self
            .connection
            .query_row("SELECT MAX(imported_at) FROM cards", [], |row| row.get(0))
            .context("failed to read last import time")?;
        Ok(value)
    }

    pub fn summary(&self) -> Result<StoreSummary> {
        Ok(StoreSummary {
            cards: self.count_cards()?,
            properties: self.count_properties()?,
            last_imported_at: self.last_imported_at()?,
        })
    }
}

fn card_key(record: &ExtractedRecord) -> Result<String> {
    let card_no = record.card_no.trim();
    if !card_no.is_empty() {
        return Ok(card_no.to_string());
    }

    if record.source_stem.is_empty() {
        bail!("record has neither a card number nor a source file name");
    }

    warn!(
        file = %record.source_file,
        "card number missing, keying card by source file stem"
    );
    Ok(record.source_stem.clone())
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cards (
          card_no TEXT PRIMARY KEY,
          article_index TEXT,
          source_file TEXT,
          source_sha256 TEXT,
          prepared_by TEXT,
          imported_at TEXT NOT NULL,
          form_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS card_properties (
          card_no TEXT NOT NULL,
          parameter TEXT NOT NULL,
          name TEXT NOT NULL,
          method TEXT,
          value TEXT,
          value_num REAL,
          minus TEXT,
          plus TEXT,
          unit TEXT,
          PRIMARY KEY (card_no, parameter),
          FOREIGN KEY(card_no) REFERENCES cards(card_no) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_cards_article_index ON cards(article_index);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}

fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
