//! Profile, expense rule and income source operations

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};

use super::{from_document, Database};
use crate::error::{Error, Result};
use crate::models::{ExpenseRule, IncomeSource, UserProfile};

impl Database {
    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM profiles WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        document.map(|doc| from_document(&doc)).transpose()
    }

    /// Insert or replace a user's profile
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO profiles (user_id, document, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at
            "#,
            params![
                profile.user_id,
                serde_json::to_string(profile)?,
                profile
                    .updated_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ],
        )?;
        Ok(())
    }

    pub fn get_expense_rule(&self, id: &str) -> Result<Option<ExpenseRule>> {
        let conn = self.conn()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM expense_rules WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        document.map(|doc| from_document(&doc)).transpose()
    }

    /// Insert or replace an expense rule
    pub fn upsert_expense_rule(&self, rule: &ExpenseRule) -> Result<()> {
        let conn = self.conn()?;
        upsert_expense_rule(&conn, rule)
    }

    pub fn delete_expense_rule(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM expense_rules WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Expense rule {}", id)));
        }
        Ok(())
    }

    /// All expense rules for a user, active or not, by name
    pub fn list_expense_rules(&self, user_id: &str) -> Result<Vec<ExpenseRule>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT document FROM expense_rules WHERE user_id = ? ORDER BY name, id")?;
        let documents = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        documents.iter().map(|doc| from_document(doc)).collect()
    }

    /// Insert or replace an income source
    pub fn upsert_income_source(&self, source: &IncomeSource) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO income_sources (id, user_id, name, is_active, document) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                document = excluded.document
            "#,
            params![
                source.id,
                source.user_id,
                source.name,
                source.is_active,
                serde_json::to_string(source)?,
            ],
        )?;
        Ok(())
    }

    /// All income sources for a user, active or not, by name
    pub fn list_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT document FROM income_sources WHERE user_id = ? ORDER BY name, id")?;
        let documents = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        documents.iter().map(|doc| from_document(doc)).collect()
    }
}

pub(super) fn upsert_expense_rule(conn: &Connection, rule: &ExpenseRule) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO expense_rules (id, user_id, name, is_active, document) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            is_active = excluded.is_active,
            document = excluded.document
        "#,
        params![
            rule.id,
            rule.user_id,
            rule.name,
            rule.is_active,
            serde_json::to_string(rule)?,
        ],
    )?;
    Ok(())
}
