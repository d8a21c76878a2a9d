//! SQLite persistence for smart transaction records.

use parking_lot::Mutex;
use rusqlite::{params, Connection, Result as SqliteResult};
use smart_tx_types::SmartTransaction;

use crate::error::{Result, SmartTxError};
use crate::store::{ChainId, RecordSink};

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS smart_transactions (
                chain_id TEXT NOT NULL,
                uuid TEXT NOT NULL,
                position INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (chain_id, uuid)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stx_chain_position ON smart_transactions(chain_id, position)",
            [],
        )?;

        Ok(())
    }

    /// Replace every row of `chain` with `records`, in one transaction.
    pub fn replace_chain(&self, chain: &ChainId, records: &[SmartTransaction]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM smart_transactions WHERE chain_id = ?1",
            params![chain.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO smart_transactions (chain_id, uuid, position, record_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            )?;
            for (position, record) in records.iter().enumerate() {
                let json = serde_json::to_string(record)?;
                stmt.execute(params![chain.as_str(), record.uuid, position as i64, json])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All persisted chains with their records in stored order.
    pub fn load_all(&self) -> Result<Vec<(ChainId, Vec<SmartTransaction>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT chain_id, uuid, record_json FROM smart_transactions ORDER BY chain_id, position",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut chains: Vec<(ChainId, Vec<SmartTransaction>)> = Vec::new();
        for (raw_chain, uuid, json) in rows {
            let chain = match ChainId::parse(&raw_chain) {
                Ok(chain) => chain,
                Err(e) => {
                    log::warn!("[STX_DB] Skipping row {} with bad chain id: {}", uuid, e);
                    continue;
                }
            };
            let record: SmartTransaction = match serde_json::from_str(&json) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("[STX_DB] Skipping undecodable record {}: {}", uuid, e);
                    continue;
                }
            };
            match chains.last_mut() {
                Some((last, records)) if *last == chain => records.push(record),
                _ => chains.push((chain, vec![record])),
            }
        }
        Ok(chains)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM smart_transactions", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| SmartTxError::InvalidRequest(e.to_string()))
    }
}

impl RecordSink for Db {
    fn save_chain(&self, chain: &ChainId, records: &[SmartTransaction]) {
        if let Err(e) = self.replace_chain(chain, records) {
            log::error!("[STX_DB] Failed to persist chain {}: {}", chain, e);
        }
    }
}
