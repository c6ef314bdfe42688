//! Transaction operations

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};

use super::{from_document, Database};
use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::store::TransactionQuery;

impl Database {
    /// Insert a new transaction document
    pub fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        insert_transaction(&conn, tx)
    }

    /// Get a transaction by id
    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM transactions WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        document.map(|doc| from_document(&doc)).transpose()
    }

    /// Replace an existing transaction document
    pub fn update_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        update_transaction(&conn, tx)
    }

    /// Delete a transaction by id
    pub fn delete_transaction(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        delete_transaction(&conn, id)
    }

    /// Transactions matching a query, ordered by scheduled date
    pub fn query_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let filter = query.build();

        let mut stmt = conn.prepare(&filter.build_select_query())?;
        let documents = stmt
            .query_map(filter.params_refs().as_slice(), |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        documents.iter().map(|doc| from_document(doc)).collect()
    }

    /// Count transactions matching a query (ignores the limit)
    pub fn count_transactions(&self, query: &TransactionQuery) -> Result<i64> {
        let conn = self.conn()?;
        let filter = query.build();

        let count = conn.query_row(
            &filter.build_count_query(),
            filter.where_params_refs().as_slice(),
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub(super) fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    let document = serde_json::to_string(tx)?;

    conn.execute(
        r#"
        INSERT INTO transactions (id, user_id, status, tx_type, scheduled_date, source_id, parent_transaction_id, created_at, document)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            tx.id,
            tx.user_id,
            tx.status.as_str(),
            tx.tx_type.as_str(),
            tx.scheduled_date.to_string(),
            tx.source_id,
            tx.parent_transaction_id,
            tx.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            document,
        ],
    )?;

    Ok(())
}

pub(super) fn update_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    let document = serde_json::to_string(tx)?;

    let updated = conn.execute(
        r#"
        UPDATE transactions
        SET status = ?, tx_type = ?, scheduled_date = ?, source_id = ?, parent_transaction_id = ?, document = ?
        WHERE id = ?
        "#,
        params![
            tx.status.as_str(),
            tx.tx_type.as_str(),
            tx.scheduled_date.to_string(),
            tx.source_id,
            tx.parent_transaction_id,
            document,
            tx.id,
        ],
    )?;

    if updated == 0 {
        return Err(Error::NotFound(format!("Transaction {}", tx.id)));
    }
    Ok(())
}

pub(super) fn delete_transaction(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute("DELETE FROM transactions WHERE id = ?", params![id])?;
    if deleted == 0 {
        return Err(Error::NotFound(format!("Transaction {}", id)));
    }
    Ok(())
}
