//! Property-based tests for the Fintrack domain models
//!
//! Category mapping has to be total and stable: every label maps somewhere,
//! and the label/id round trip never drifts.

use proptest::prelude::*;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{ExtractedTransaction, ExtractionSource, TransactionCategory};

fn arb_category() -> impl Strategy<Value = TransactionCategory> {
    prop::sample::select(TransactionCategory::ALL.to_vec())
}

prop_compose! {
    fn arb_transaction()(
        category in arb_category(),
        amount in -10_000.0f64..10_000.0f64,
        merchant in "[A-Za-z][A-Za-z ]{0,20}",
        day in 1u32..28,
    ) -> ExtractedTransaction {
        ExtractedTransaction {
            user_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 1, day),
            raw_date: format!("01/{:02}/2024", day),
            merchant: merchant.clone(),
            amount,
            category,
            description: merchant,
            source: ExtractionSource::Pattern,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_label_round_trip(category in arb_category()) {
        prop_assert_eq!(TransactionCategory::from_label(category.label()), category);
        prop_assert_eq!(TransactionCategory::from_id(category.id()), category);
    }

    #[test]
    fn prop_label_mapping_is_total_and_deterministic(label in ".{0,40}") {
        let first = TransactionCategory::from_label(&label);
        let second = TransactionCategory::from_label(&label);
        prop_assert_eq!(first, second);
        prop_assert!((1..=8).contains(&first.id()));
    }

    #[test]
    fn prop_record_preserves_sign_and_category(txn in arb_transaction()) {
        let record = txn.to_record();
        prop_assert_eq!(record.amount, txn.amount);
        prop_assert_eq!(record.category_id, txn.category.id());
        prop_assert_eq!(txn.is_deposit(), record.amount > 0.0);
    }
}
