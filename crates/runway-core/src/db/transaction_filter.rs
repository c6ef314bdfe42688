//! SQL rendering of a `TransactionQuery`
//!
//! Builds the WHERE/ORDER BY/LIMIT clauses and their parameters so the select
//! and count queries share one filter implementation.

use crate::store::{SortOrder, TransactionQuery};

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: String,
    /// LIMIT clause (empty when unbounded)
    pub limit_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl TransactionQuery {
    /// Build the filter components
    pub fn build(&self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref user_id) = self.user_id {
            conditions.push("user_id = ?".to_string());
            params.push(Box::new(user_id.clone()));
        }

        // Status membership
        if !self.statuses.is_empty() {
            conditions.push(format!("status IN ({})", placeholders(self.statuses.len())));
            for status in &self.statuses {
                params.push(Box::new(status.as_str()));
            }
        }

        // Type membership
        if !self.types.is_empty() {
            conditions.push(format!("tx_type IN ({})", placeholders(self.types.len())));
            for tx_type in &self.types {
                params.push(Box::new(tx_type.as_str()));
            }
        }

        // Dates are zero-padded so string comparison is chronological
        if let Some((from_date, to_date)) = self.date_range {
            conditions.push("scheduled_date >= ? AND scheduled_date <= ?".to_string());
            params.push(Box::new(from_date.to_string()));
            params.push(Box::new(to_date.to_string()));
        }

        if let Some(ref source_id) = self.source_id {
            conditions.push("source_id = ?".to_string());
            params.push(Box::new(source_id.clone()));
        }

        if let Some(ref parent_id) = self.parent_id {
            conditions.push("parent_transaction_id = ?".to_string());
            params.push(Box::new(parent_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let dir = match self.order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let order_clause = format!(
            "ORDER BY scheduled_date {dir}, created_at {dir}, id {dir}",
            dir = dir
        );

        let limit_clause = match self.limit {
            Some(limit) => {
                params.push(Box::new(limit as i64));
                "LIMIT ?".to_string()
            }
            None => String::new(),
        };

        FilterResult {
            where_clause,
            order_clause,
            limit_clause,
            params,
        }
    }
}

impl FilterResult {
    /// Build the SELECT query for matching documents
    pub fn build_select_query(&self) -> String {
        format!(
            "SELECT document FROM transactions {} {} {}",
            self.where_clause, self.order_clause, self.limit_clause
        )
    }

    /// Build a COUNT query (ignores the limit)
    pub fn build_count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM transactions {}", self.where_clause)
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Parameters without the trailing LIMIT value
    pub fn where_params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        let count = if self.limit_clause.is_empty() {
            self.params.len()
        } else {
            self.params.len() - 1
        };
        self.params[..count].iter().map(|p| p.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;
    use chrono::NaiveDate;

    #[test]
    fn test_empty_query_has_no_where() {
        let filter = TransactionQuery::new().build();
        assert!(filter.where_clause.is_empty());
        assert!(filter.params.is_empty());
        assert!(filter.order_clause.contains("scheduled_date ASC"));
    }

    #[test]
    fn test_membership_and_range() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let filter = TransactionQuery::for_user("u1")
            .statuses(&[TransactionStatus::Projected, TransactionStatus::Pending])
            .date_range(Some((from, to)))
            .limit(Some(10))
            .build();

        assert_eq!(
            filter.where_clause,
            "WHERE user_id = ? AND status IN (?, ?) AND scheduled_date >= ? AND scheduled_date <= ?"
        );
        assert_eq!(filter.params.len(), 6);
        assert_eq!(filter.where_params_refs().len(), 5);
        assert!(filter.build_select_query().ends_with("LIMIT ?"));
        assert!(!filter.build_count_query().contains("LIMIT"));
    }
}
