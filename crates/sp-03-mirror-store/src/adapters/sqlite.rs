//! # SQLite Mirror Store
//!
//! Single-connection SQLite adapter. Every port call takes the connection
//! lock for the duration of one statement or one transaction.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row, Transaction};
use shared_types::{Address, ContentRecord, Slot, TokenAmount, TxSignature};
use tracing::{debug, info};

use crate::domain::{
    ChunkPaymentRecord, InsertOutcome, SessionApproval, SessionProgress, SessionRecord,
    SettlementRecord, StoreError,
};
use crate::ports::{ContentDirectory, MirrorStore};

const WATERMARK_KEY: &str = "last_processed_slot";

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS videos (
    local_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id     TEXT    NOT NULL UNIQUE,
    creator         TEXT    NOT NULL,
    price_per_chunk INTEGER NOT NULL,
    ledger_address  TEXT    UNIQUE,
    is_active       INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS sessions (
    session_address          TEXT    PRIMARY KEY,
    content_id               INTEGER NOT NULL REFERENCES videos(local_id),
    viewer                   TEXT    NOT NULL,
    max_approved_chunks      INTEGER NOT NULL,
    chunks_consumed          INTEGER NOT NULL DEFAULT 0,
    total_spent              INTEGER NOT NULL DEFAULT 0,
    approved_price_per_chunk INTEGER NOT NULL,
    last_paid_chunk_index    INTEGER,
    session_start            INTEGER NOT NULL,
    last_activity            INTEGER NOT NULL,
    is_active                INTEGER NOT NULL DEFAULT 1,
    CHECK (chunks_consumed <= max_approved_chunks)
);

CREATE INDEX IF NOT EXISTS idx_sessions_content_viewer
    ON sessions (content_id, viewer);

CREATE TABLE IF NOT EXISTS chunk_payments (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_address TEXT    NOT NULL REFERENCES sessions(session_address),
    content_id      INTEGER NOT NULL,
    chunk_index     INTEGER NOT NULL,
    sequence        INTEGER NOT NULL,
    amount_paid     INTEGER NOT NULL,
    platform_fee    INTEGER NOT NULL,
    creator_amount  INTEGER NOT NULL,
    signature       TEXT    NOT NULL,
    viewer          TEXT    NOT NULL,
    creator         TEXT    NOT NULL,
    paid_at         INTEGER NOT NULL,
    UNIQUE (session_address, chunk_index),
    CHECK (creator_amount + platform_fee = amount_paid)
);

CREATE TABLE IF NOT EXISTS settlements (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    session_address       TEXT    NOT NULL REFERENCES sessions(session_address),
    content_id            INTEGER NOT NULL,
    viewer                TEXT    NOT NULL,
    creator               TEXT    NOT NULL,
    chunk_count           INTEGER NOT NULL,
    total_payment         INTEGER NOT NULL,
    platform_fee          INTEGER NOT NULL,
    creator_amount        INTEGER NOT NULL,
    signature             TEXT    NOT NULL UNIQUE,
    block_time            INTEGER,
    slot                  INTEGER,
    chunks_consumed_after INTEGER NOT NULL,
    chunks_remaining      INTEGER NOT NULL,
    settled_at            INTEGER NOT NULL,
    UNIQUE (session_address, chunks_consumed_after),
    CHECK (creator_amount + platform_fee = total_payment)
);

CREATE TABLE IF NOT EXISTS sync_state (
    key   TEXT    PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

const SESSION_COLUMNS: &str = "session_address, content_id, viewer, max_approved_chunks, \
     chunks_consumed, total_spent, approved_price_per_chunk, last_paid_chunk_index, \
     session_start, last_activity, is_active";

const CONTENT_COLUMNS: &str =
    "local_id, external_id, creator, price_per_chunk, ledger_address, is_active";

/// Mirror store backed by a single SQLite connection.
pub struct SqliteMirrorStore {
    conn: Mutex<Connection>,
}

impl SqliteMirrorStore {
    /// Open or create a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::initialize(conn)?;
        info!("[sp-03] mirror store opened at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

fn is_duplicate(err: &rusqlite::Error) -> bool {
    matches!(
        constraint_code(err),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

fn classify(err: rusqlite::Error, context: &str) -> StoreError {
    match constraint_code(&err) {
        Some(ffi::SQLITE_CONSTRAINT_CHECK) => StoreError::Invariant(format!("{context}: {err}")),
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
            StoreError::MissingParent(format!("{context}: {err}"))
        }
        _ => StoreError::Database(err),
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn address_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Address> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_address_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Address>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session: address_at(row, 0)?,
        content_id: row.get(1)?,
        viewer: address_at(row, 2)?,
        max_approved_chunks: row.get(3)?,
        chunks_consumed: row.get(4)?,
        total_spent: row.get(5)?,
        approved_price_per_chunk: row.get(6)?,
        last_paid_chunk_index: row.get(7)?,
        session_start: row.get(8)?,
        last_activity: row.get(9)?,
        is_active: row.get(10)?,
    })
}

fn row_to_content(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
    Ok(ContentRecord {
        local_id: row.get(0)?,
        external_id: row.get(1)?,
        creator: row.get(2)?,
        price_per_chunk: row.get(3)?,
        ledger_address: optional_address_at(row, 4)?,
        is_active: row.get(5)?,
    })
}

fn row_to_settlement(row: &Row<'_>) -> rusqlite::Result<SettlementRecord> {
    Ok(SettlementRecord {
        session: address_at(row, 0)?,
        content_id: row.get(1)?,
        viewer: address_at(row, 2)?,
        creator: row.get(3)?,
        chunk_count: row.get(4)?,
        total_payment: row.get(5)?,
        platform_fee: row.get(6)?,
        creator_amount: row.get(7)?,
        signature: TxSignature::new(row.get::<_, String>(8)?),
        block_time: row.get(9)?,
        slot: row.get(10)?,
        chunks_consumed_after: row.get(11)?,
        chunks_remaining: row.get(12)?,
        settled_at: row.get(13)?,
    })
}

fn row_to_chunk_payment(row: &Row<'_>) -> rusqlite::Result<ChunkPaymentRecord> {
    Ok(ChunkPaymentRecord {
        session: address_at(row, 0)?,
        content_id: row.get(1)?,
        chunk_index: row.get(2)?,
        sequence: row.get(3)?,
        amount_paid: row.get(4)?,
        platform_fee: row.get(5)?,
        creator_amount: row.get(6)?,
        signature: TxSignature::new(row.get::<_, String>(7)?),
        viewer: address_at(row, 8)?,
        creator: row.get(9)?,
        paid_at: row.get(10)?,
    })
}

/// Move session counters forward to the ledger-reported values.
fn advance_session(
    tx: &Transaction<'_>,
    session: &Address,
    progress: &SessionProgress,
) -> Result<(), StoreError> {
    let updated = tx
        .execute(
            "UPDATE sessions SET
                max_approved_chunks = MAX(max_approved_chunks, ?2),
                chunks_consumed = MAX(chunks_consumed, ?3),
                total_spent = MAX(total_spent, ?4),
                last_paid_chunk_index = CASE
                    WHEN ?5 IS NULL THEN last_paid_chunk_index
                    WHEN last_paid_chunk_index IS NULL THEN ?5
                    ELSE MAX(last_paid_chunk_index, ?5)
                END,
                last_activity = MAX(last_activity, ?6)
             WHERE session_address = ?1",
            params![
                session.to_string(),
                progress.max_approved_chunks,
                progress.chunks_consumed,
                progress.total_spent,
                progress.last_paid_chunk_index,
                progress.last_activity,
            ],
        )
        .map_err(|e| classify(e, "advance session"))?;
    if updated == 0 {
        return Err(StoreError::MissingParent(format!("session {session}")));
    }
    Ok(())
}

// =============================================================================
// MIRROR STORE
// =============================================================================

impl MirrorStore for SqliteMirrorStore {
    fn insert_session(&self, session: &SessionRecord) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            &format!(
                "INSERT INTO sessions ({SESSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                session.session.to_string(),
                session.content_id,
                session.viewer.to_string(),
                session.max_approved_chunks,
                session.chunks_consumed,
                session.total_spent,
                session.approved_price_per_chunk,
                session.last_paid_chunk_index,
                session.session_start,
                session.last_activity,
                session.is_active,
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate(&e) => {
                debug!("[sp-03] session {} already mirrored", session.session);
                Ok(InsertOutcome::AlreadyRecorded)
            }
            Err(e) => Err(classify(e, "insert session")),
        }
    }

    fn apply_reapproval(
        &self,
        session: &Address,
        approval: &SessionApproval,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE sessions SET
                    max_approved_chunks = MAX(max_approved_chunks, ?2),
                    approved_price_per_chunk = ?3,
                    last_activity = MAX(last_activity, ?4),
                    is_active = 1
                 WHERE session_address = ?1",
                params![
                    session.to_string(),
                    approval.max_approved_chunks,
                    approval.approved_price_per_chunk,
                    approval.last_activity,
                ],
            )
            .map_err(|e| classify(e, "apply reapproval"))?;
        Ok(updated > 0)
    }

    fn find_session(&self, session: &Address) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_address = ?1"),
                params![session.to_string()],
                row_to_session,
            )
            .optional()?)
    }

    fn find_session_for_viewer(
        &self,
        content_id: i64,
        viewer: &Address,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE content_id = ?1 AND viewer = ?2
                     ORDER BY is_active DESC, last_activity DESC
                     LIMIT 1"
                ),
                params![content_id, viewer.to_string()],
                row_to_session,
            )
            .optional()?)
    }

    fn deactivate_session(
        &self,
        session: &Address,
        last_activity: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE sessions SET is_active = 0, last_activity = MAX(last_activity, ?2)
             WHERE session_address = ?1",
            params![session.to_string(), last_activity],
        )?;
        Ok(updated > 0)
    }

    fn record_settlement(
        &self,
        settlement: &SettlementRecord,
        progress: &SessionProgress,
    ) -> Result<InsertOutcome, StoreError> {
        let expected_before = settlement
            .chunks_consumed_after
            .checked_sub(settlement.chunk_count)
            .ok_or_else(|| {
                StoreError::Invariant(format!(
                    "settlement {} counts {} chunks past consumed {}",
                    settlement.signature, settlement.chunk_count, settlement.chunks_consumed_after
                ))
            })?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO settlements (
                session_address, content_id, viewer, creator, chunk_count, total_payment,
                platform_fee, creator_amount, signature, block_time, slot,
                chunks_consumed_after, chunks_remaining, settled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                settlement.session.to_string(),
                settlement.content_id,
                settlement.viewer.to_string(),
                settlement.creator,
                settlement.chunk_count,
                settlement.total_payment,
                settlement.platform_fee,
                settlement.creator_amount,
                settlement.signature.as_str(),
                settlement.block_time,
                settlement.slot,
                settlement.chunks_consumed_after,
                settlement.chunks_remaining,
                settlement.settled_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            // Dropping the transaction rolls it back.
            Err(e) if is_duplicate(&e) => return Ok(InsertOutcome::AlreadyRecorded),
            Err(e) => return Err(classify(e, "insert settlement")),
        }

        let current: Option<u32> = tx
            .query_row(
                "SELECT chunks_consumed FROM sessions WHERE session_address = ?1",
                params![settlement.session.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(current) = current {
            if current != expected_before {
                debug!(
                    session = %settlement.session,
                    expected_before,
                    current,
                    "[sp-03] settlement computed against a stale session, rolled back"
                );
                return Ok(InsertOutcome::Superseded);
            }
        }

        advance_session(&tx, &settlement.session, progress)?;
        tx.commit()?;
        Ok(InsertOutcome::Inserted)
    }

    fn record_chunk_payment(
        &self,
        payment: &ChunkPaymentRecord,
        progress: &SessionProgress,
    ) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO chunk_payments (
                session_address, content_id, chunk_index, sequence, amount_paid,
                platform_fee, creator_amount, signature, viewer, creator, paid_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                payment.session.to_string(),
                payment.content_id,
                payment.chunk_index,
                payment.sequence,
                payment.amount_paid,
                payment.platform_fee,
                payment.creator_amount,
                payment.signature.as_str(),
                payment.viewer.to_string(),
                payment.creator,
                payment.paid_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_duplicate(&e) => return Ok(InsertOutcome::AlreadyRecorded),
            Err(e) => return Err(classify(e, "insert chunk payment")),
        }

        advance_session(&tx, &payment.session, progress)?;
        tx.commit()?;
        Ok(InsertOutcome::Inserted)
    }

    fn settlements_for_session(
        &self,
        session: &Address,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_address, content_id, viewer, creator, chunk_count, total_payment,
                    platform_fee, creator_amount, signature, block_time, slot,
                    chunks_consumed_after, chunks_remaining, settled_at
             FROM settlements WHERE session_address = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![session.to_string()], row_to_settlement)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn chunk_payments_for_session(
        &self,
        session: &Address,
    ) -> Result<Vec<ChunkPaymentRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_address, content_id, chunk_index, sequence, amount_paid,
                    platform_fee, creator_amount, signature, viewer, creator, paid_at
             FROM chunk_payments WHERE session_address = ?1 ORDER BY chunk_index ASC",
        )?;
        let rows = stmt
            .query_map(params![session.to_string()], row_to_chunk_payment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn load_watermark(&self) -> Result<Option<Slot>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![WATERMARK_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn save_watermark(&self, slot: Slot) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
            params![WATERMARK_KEY, slot],
        )?;
        Ok(())
    }
}

// =============================================================================
// CONTENT DIRECTORY
// =============================================================================

impl ContentDirectory for SqliteMirrorStore {
    fn find_content_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ContentRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM videos WHERE external_id = ?1"),
                params![external_id],
                row_to_content,
            )
            .optional()?)
    }

    fn find_content_by_id(&self, local_id: i64) -> Result<Option<ContentRecord>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM videos WHERE local_id = ?1"),
                params![local_id],
                row_to_content,
            )
            .optional()?)
    }

    fn upsert_content(
        &self,
        external_id: &str,
        creator: &str,
        price_per_chunk: TokenAmount,
    ) -> Result<ContentRecord, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO videos (external_id, creator, price_per_chunk) VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO UPDATE SET
                creator = excluded.creator,
                price_per_chunk = excluded.price_per_chunk",
            params![external_id, creator, price_per_chunk],
        )?;
        Ok(conn.query_row(
            &format!("SELECT {CONTENT_COLUMNS} FROM videos WHERE external_id = ?1"),
            params![external_id],
            row_to_content,
        )?)
    }

    fn link_content(
        &self,
        external_id: &str,
        ledger_address: &Address,
        price_per_chunk: TokenAmount,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE videos SET ledger_address = ?2, price_per_chunk = ?3
                 WHERE external_id = ?1",
                params![external_id, ledger_address.to_string(), price_per_chunk],
            )
            .map_err(|e| classify(e, "link content"))?;
        Ok(updated > 0)
    }

    fn update_content_listing(
        &self,
        external_id: &str,
        price_per_chunk: TokenAmount,
        is_active: bool,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE videos SET price_per_chunk = ?2, is_active = ?3 WHERE external_id = ?1",
            params![external_id, price_per_chunk, is_active],
        )?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 32])
    }

    fn seeded() -> (SqliteMirrorStore, ContentRecord) {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let content = store.upsert_content("vid-1", "creator-1", 1_000).unwrap();
        (store, content)
    }

    fn session(content_id: i64) -> SessionRecord {
        SessionRecord {
            session: addr(1),
            content_id,
            viewer: addr(2),
            max_approved_chunks: 100,
            chunks_consumed: 0,
            total_spent: 0,
            approved_price_per_chunk: 1_000,
            last_paid_chunk_index: None,
            session_start: 1_000,
            last_activity: 1_000,
            is_active: true,
        }
    }

    fn settlement(content_id: i64, sig: &str, chunk_count: u32, after: u32) -> SettlementRecord {
        let total = u64::from(chunk_count) * 1_000;
        let fee = total * 250 / 10_000;
        SettlementRecord {
            session: addr(1),
            content_id,
            viewer: addr(2),
            creator: "creator-1".into(),
            chunk_count,
            total_payment: total,
            platform_fee: fee,
            creator_amount: total - fee,
            signature: TxSignature::new(sig),
            block_time: Some(2_000),
            slot: Some(10),
            chunks_consumed_after: after,
            chunks_remaining: 100 - after,
            settled_at: 2_000,
        }
    }

    fn progress(consumed: u32) -> SessionProgress {
        SessionProgress {
            max_approved_chunks: 100,
            chunks_consumed: consumed,
            total_spent: u64::from(consumed) * 1_000,
            last_paid_chunk_index: None,
            last_activity: 2_000,
        }
    }

    #[test]
    fn test_session_insert_is_idempotent() {
        let (store, content) = seeded();
        let s = session(content.local_id);
        assert_eq!(store.insert_session(&s).unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            store.insert_session(&s).unwrap(),
            InsertOutcome::AlreadyRecorded
        );
        assert_eq!(store.find_session(&s.session).unwrap(), Some(s));
    }

    #[test]
    fn test_session_requires_known_content() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let err = store.insert_session(&session(999)).unwrap_err();
        assert!(matches!(err, StoreError::MissingParent(_)));
    }

    #[test]
    fn test_settlement_advances_session_once() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();

        let record = settlement(content.local_id, "sig-1", 40, 40);
        assert_eq!(
            store.record_settlement(&record, &progress(40)).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.record_settlement(&record, &progress(40)).unwrap(),
            InsertOutcome::AlreadyRecorded
        );

        let mirrored = store.find_session(&addr(1)).unwrap().unwrap();
        assert_eq!(mirrored.chunks_consumed, 40);
        assert_eq!(mirrored.chunks_remaining(), 60);
        assert_eq!(store.settlements_for_session(&addr(1)).unwrap(), vec![record]);
    }

    #[test]
    fn test_duplicate_settlement_leaves_session_untouched() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();
        store
            .record_settlement(&settlement(content.local_id, "sig-1", 10, 10), &progress(10))
            .unwrap();

        // Same signature with a later snapshot must not move the counters.
        store
            .record_settlement(&settlement(content.local_id, "sig-1", 10, 10), &progress(30))
            .unwrap();
        assert_eq!(
            store.find_session(&addr(1)).unwrap().unwrap().chunks_consumed,
            10
        );
    }

    #[test]
    fn test_counters_never_move_backwards() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();
        store
            .record_settlement(&settlement(content.local_id, "a", 50, 50), &progress(50))
            .unwrap();
        assert_eq!(
            store
                .record_settlement(&settlement(content.local_id, "b", 20, 20), &progress(20))
                .unwrap(),
            InsertOutcome::Superseded
        );

        let mirrored = store.find_session(&addr(1)).unwrap().unwrap();
        assert_eq!(mirrored.chunks_consumed, 50);
        assert_eq!(mirrored.total_spent, 50_000);
    }

    #[test]
    fn test_stale_settlement_is_rolled_back() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();

        // Computed from a read at 0 while another writer moved the session to 60.
        store
            .record_settlement(&settlement(content.local_id, "feed", 60, 60), &progress(60))
            .unwrap();
        let stale = settlement(content.local_id, "poll", 40, 40);
        assert_eq!(
            store.record_settlement(&stale, &progress(40)).unwrap(),
            InsertOutcome::Superseded
        );

        let rows = store.settlements_for_session(&addr(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].signature.as_str(), "feed");
        assert_eq!(
            store.find_session(&addr(1)).unwrap().unwrap().chunks_consumed,
            60
        );
    }

    #[test]
    fn test_chunk_count_past_consumed_is_rejected() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();
        let err = store
            .record_settlement(&settlement(content.local_id, "x", 30, 20), &progress(20))
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[test]
    fn test_same_consumption_level_recorded_once() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();
        store
            .record_settlement(&settlement(content.local_id, "ledger-sig", 40, 40), &progress(40))
            .unwrap();

        let local = settlement(content.local_id, "local:session:40", 40, 40);
        assert_eq!(
            store.record_settlement(&local, &progress(40)).unwrap(),
            InsertOutcome::AlreadyRecorded
        );
        assert_eq!(store.settlements_for_session(&addr(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_consumed_above_approval_is_rejected() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();

        let mut over = progress(150);
        over.max_approved_chunks = 100;
        let err = store
            .record_settlement(&settlement(content.local_id, "x", 150, 150), &over)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
        // Rolled back with the failed update.
        assert!(store.settlements_for_session(&addr(1)).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_payment_unique_per_index() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();
        let payment = ChunkPaymentRecord {
            session: addr(1),
            content_id: content.local_id,
            chunk_index: 3,
            sequence: 1,
            amount_paid: 1_000,
            platform_fee: 25,
            creator_amount: 975,
            signature: TxSignature::new("p-1"),
            viewer: addr(2),
            creator: "creator-1".into(),
            paid_at: 1_500,
        };
        let mut p = progress(1);
        p.last_paid_chunk_index = Some(3);

        assert!(store.record_chunk_payment(&payment, &p).unwrap().is_inserted());
        let mut replay = payment.clone();
        replay.signature = TxSignature::new("p-2");
        assert_eq!(
            store.record_chunk_payment(&replay, &p).unwrap(),
            InsertOutcome::AlreadyRecorded
        );
        assert_eq!(store.chunk_payments_for_session(&addr(1)).unwrap().len(), 1);
        assert_eq!(
            store
                .find_session(&addr(1))
                .unwrap()
                .unwrap()
                .last_paid_chunk_index,
            Some(3)
        );
    }

    #[test]
    fn test_reapproval_and_deactivation() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();

        let approval = SessionApproval {
            max_approved_chunks: 150,
            approved_price_per_chunk: 1_000,
            last_activity: 3_000,
        };
        assert!(store.apply_reapproval(&addr(1), &approval).unwrap());
        assert!(!store.apply_reapproval(&addr(9), &approval).unwrap());

        assert!(store.deactivate_session(&addr(1), 4_000).unwrap());
        let mirrored = store.find_session(&addr(1)).unwrap().unwrap();
        assert_eq!(mirrored.max_approved_chunks, 150);
        assert!(!mirrored.is_active);
        assert_eq!(mirrored.last_activity, 4_000);
    }

    #[test]
    fn test_find_session_for_viewer() {
        let (store, content) = seeded();
        store.insert_session(&session(content.local_id)).unwrap();
        let found = store
            .find_session_for_viewer(content.local_id, &addr(2))
            .unwrap();
        assert_eq!(found.map(|s| s.session), Some(addr(1)));
        assert!(store
            .find_session_for_viewer(content.local_id, &addr(3))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_watermark_only_moves_forward() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        assert_eq!(store.load_watermark().unwrap(), None);
        store.save_watermark(50).unwrap();
        store.save_watermark(20).unwrap();
        assert_eq!(store.load_watermark().unwrap(), Some(50));
    }

    #[test]
    fn test_content_link_and_listing() {
        let (store, content) = seeded();
        assert!(store.link_content("vid-1", &addr(7), 2_000).unwrap());
        assert!(!store.link_content("missing", &addr(8), 2_000).unwrap());
        assert!(store.update_content_listing("vid-1", 3_000, false).unwrap());

        let reloaded = store.find_content_by_id(content.local_id).unwrap().unwrap();
        assert_eq!(reloaded.ledger_address, Some(addr(7)));
        assert_eq!(reloaded.price_per_chunk, 3_000);
        assert!(!reloaded.is_active);
    }
}
