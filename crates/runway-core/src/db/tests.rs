//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortOrder;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn bill(name: &str, day: u32) -> Transaction {
        NewTransaction::new("u1", name, TransactionType::Bill, 80.0, d(day))
            .with_category("utilities")
            .into_transaction()
    }

    fn loan_rule() -> ExpenseRule {
        ExpenseRule {
            id: "rule-car".to_string(),
            user_id: "u1".to_string(),
            name: "Car loan".to_string(),
            category: "auto".to_string(),
            amount: 322.67,
            frequency: Frequency::Monthly,
            is_active: true,
            loan_config: Some(LoanConfig {
                principal: 15000.0,
                annual_rate: 6.0,
                term_months: 48,
                monthly_payment: 352.28,
                current_balance: 15000.0,
                payments_made: 0,
            }),
            credit_config: None,
            installment_config: None,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        let txs = db.query_transactions(&TransactionQuery::new()).unwrap();
        assert!(txs.is_empty());
        assert!(db.get_profile("u1").unwrap().is_none());
    }

    #[test]
    fn test_schema_has_indexed_columns() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('transactions') WHERE name IN ('id', 'user_id', 'status', 'tx_type', 'scheduled_date', 'source_id', 'parent_transaction_id', 'document')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 8, "transactions table should have 8 expected columns");
    }

    #[test]
    fn test_transaction_round_trip() {
        let db = Database::in_memory().unwrap();
        let mut tx = bill("Electric", 3);
        db.insert_transaction(&tx).unwrap();

        let loaded = db.get_transaction(&tx.id).unwrap().unwrap();
        assert_eq!(loaded, tx);

        tx.status = TransactionStatus::Completed;
        tx.actual_amount = Some(75.5);
        tx.variance = Some(-4.5);
        db.update_transaction(&tx).unwrap();

        let loaded = db.get_transaction(&tx.id).unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Completed);
        assert_eq!(loaded.actual_amount, Some(75.5));

        db.delete_transaction(&tx.id).unwrap();
        assert!(db.get_transaction(&tx.id).unwrap().is_none());
    }

    #[test]
    fn test_missing_ids_are_not_found() {
        let db = Database::in_memory().unwrap();
        let tx = bill("Ghost", 1);
        assert!(db.update_transaction(&tx).unwrap_err().is_not_found());
        assert!(db.delete_transaction(&tx.id).unwrap_err().is_not_found());
        assert!(db.delete_expense_rule("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_filters_on_indexed_columns() {
        let db = Database::in_memory().unwrap();
        let water = bill("Water", 20);
        let rent = bill("Rent", 1);
        let mut paid = bill("Phone", 10);
        paid.status = TransactionStatus::Completed;
        paid.actual_amount = Some(80.0);
        let other_user = NewTransaction::new("u2", "Salary", TransactionType::Income, 10.0, d(5))
            .into_transaction();
        for tx in [&water, &rent, &paid, &other_user] {
            db.insert_transaction(tx).unwrap();
        }

        let open = db
            .query_transactions(
                &TransactionQuery::for_user("u1")
                    .statuses(&[TransactionStatus::Projected, TransactionStatus::Pending]),
            )
            .unwrap();
        let names: Vec<_> = open.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Rent", "Water"]);

        let newest_first = db
            .query_transactions(
                &TransactionQuery::for_user("u1")
                    .order(SortOrder::Descending)
                    .limit(Some(1)),
            )
            .unwrap();
        assert_eq!(newest_first.len(), 1);
        assert_eq!(newest_first[0].name, "Water");

        let window = TransactionQuery::for_user("u1").date_range(Some((d(5), d(15))));
        assert_eq!(db.count_transactions(&window).unwrap(), 1);
        assert_eq!(
            db.count_transactions(&TransactionQuery::new().tx_type(TransactionType::Income))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_profile_upsert() {
        let db = Database::in_memory().unwrap();
        let mut profile = UserProfile::new("u1", 1500.0);
        db.upsert_profile(&profile).unwrap();

        profile.current_balance = 1320.0;
        db.upsert_profile(&profile).unwrap();

        let loaded = db.get_profile("u1").unwrap().unwrap();
        assert_eq!(loaded.initial_balance, 1500.0);
        assert_eq!(loaded.current_balance, 1320.0);
    }

    #[test]
    fn test_expense_rule_documents_keep_configs() {
        let db = Database::in_memory().unwrap();
        let mut rule = loan_rule();
        db.upsert_expense_rule(&rule).unwrap();

        if let Some(loan) = rule.loan_config.as_mut() {
            loan.current_balance = 14727.33;
            loan.payments_made = 1;
        }
        db.upsert_expense_rule(&rule).unwrap();

        let rules = db.list_expense_rules("u1").unwrap();
        assert_eq!(rules.len(), 1);
        let loan = rules[0].loan_config.as_ref().unwrap();
        assert_eq!(loan.payments_made, 1);
        assert!((loan.current_balance - 14727.33).abs() < 1e-9);

        db.delete_expense_rule(&rule.id).unwrap();
        assert!(db.get_expense_rule(&rule.id).unwrap().is_none());
    }

    #[test]
    fn test_income_sources() {
        let db = Database::in_memory().unwrap();
        let source = IncomeSource {
            id: "src-1".to_string(),
            user_id: "u1".to_string(),
            name: "Salary".to_string(),
            amount: 2400.0,
            frequency: Frequency::BiWeekly,
            is_active: true,
        };
        db.upsert_income_source(&source).unwrap();
        db.upsert_income_source(&source).unwrap();

        let sources = db.list_income_sources("u1").unwrap();
        assert_eq!(sources, vec![source]);
        assert!(db.list_income_sources("u2").unwrap().is_empty());
    }

    #[test]
    fn test_write_batch_rolls_back_on_failure() {
        let db = Database::in_memory().unwrap();
        let rent = bill("Rent", 1);
        let remainder = bill("Rent (remaining)", 8);
        db.insert_transaction(&rent).unwrap();
        db.insert_transaction(&remainder).unwrap();
        db.upsert_expense_rule(&loan_rule()).unwrap();

        let mut paid = rent.clone();
        paid.status = TransactionStatus::Completed;
        paid.actual_amount = Some(80.0);
        let mut rule = loan_rule();
        rule.is_active = false;

        // A duplicate insert fails after the update and delete already ran
        let err = db
            .apply_writes(&[
                StoreWrite::UpdateTransaction(paid.clone()),
                StoreWrite::DeleteTransaction(remainder.id.clone()),
                StoreWrite::PutExpenseRule(rule.clone()),
                StoreWrite::CreateTransaction(rent.clone()),
            ])
            .unwrap_err();
        assert!(matches!(err, crate::Error::Database(_)));
        assert_eq!(
            db.get_transaction(&rent.id).unwrap().unwrap().status,
            TransactionStatus::Projected
        );
        assert!(db.get_transaction(&remainder.id).unwrap().is_some());
        assert!(db.get_expense_rule("rule-car").unwrap().unwrap().is_active);

        db.apply_writes(&[
            StoreWrite::UpdateTransaction(paid),
            StoreWrite::DeleteTransaction(remainder.id.clone()),
            StoreWrite::PutExpenseRule(rule),
        ])
        .unwrap();
        assert_eq!(
            db.get_transaction(&rent.id).unwrap().unwrap().status,
            TransactionStatus::Completed
        );
        assert!(db.get_transaction(&remainder.id).unwrap().is_none());
        assert!(!db.get_expense_rule("rule-car").unwrap().unwrap().is_active);
    }
}
