use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of spending categories understood by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionCategory {
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    #[serde(rename = "Transportation")]
    Transportation,
    #[serde(rename = "Housing & Utilities")]
    HousingAndUtilities,
    #[serde(rename = "Entertainment")]
    Entertainment,
    #[serde(rename = "Shopping")]
    Shopping,
    #[serde(rename = "Health & Fitness")]
    HealthAndFitness,
    #[serde(rename = "Income")]
    Income,
    #[serde(rename = "Miscellaneous")]
    Miscellaneous,
}

impl TransactionCategory {
    pub const ALL: [TransactionCategory; 8] = [
        Self::FoodAndDining,
        Self::Transportation,
        Self::HousingAndUtilities,
        Self::Entertainment,
        Self::Shopping,
        Self::HealthAndFitness,
        Self::Income,
        Self::Miscellaneous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FoodAndDining => "Food & Dining",
            Self::Transportation => "Transportation",
            Self::HousingAndUtilities => "Housing & Utilities",
            Self::Entertainment => "Entertainment",
            Self::Shopping => "Shopping",
            Self::HealthAndFitness => "Health & Fitness",
            Self::Income => "Income",
            Self::Miscellaneous => "Miscellaneous",
        }
    }

    /// Category id as stored in the `categories` table.
    pub fn id(&self) -> i32 {
        match self {
            Self::FoodAndDining => 1,
            Self::Transportation => 2,
            Self::HousingAndUtilities => 3,
            Self::Entertainment => 4,
            Self::Shopping => 5,
            Self::HealthAndFitness => 6,
            Self::Income => 7,
            Self::Miscellaneous => 8,
        }
    }

    pub fn from_id(id: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.id() == id)
            .unwrap_or(Self::Miscellaneous)
    }

    /// Map a free-text category label (as produced by a model or a user)
    /// onto the closed set. Unknown labels become `Miscellaneous`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();
        if normalized.is_empty() {
            return Self::Miscellaneous;
        }

        if let Some(exact) = Self::ALL
            .iter()
            .find(|c| c.label().to_lowercase() == normalized)
        {
            return *exact;
        }

        const SYNONYMS: &[(&str, TransactionCategory)] = &[
            ("food", TransactionCategory::FoodAndDining),
            ("dining", TransactionCategory::FoodAndDining),
            ("restaurant", TransactionCategory::FoodAndDining),
            ("groceries", TransactionCategory::FoodAndDining),
            ("grocery", TransactionCategory::FoodAndDining),
            ("coffee", TransactionCategory::FoodAndDining),
            ("transport", TransactionCategory::Transportation),
            ("travel", TransactionCategory::Transportation),
            ("gas", TransactionCategory::Transportation),
            ("fuel", TransactionCategory::Transportation),
            ("auto", TransactionCategory::Transportation),
            ("housing", TransactionCategory::HousingAndUtilities),
            ("rent", TransactionCategory::HousingAndUtilities),
            ("mortgage", TransactionCategory::HousingAndUtilities),
            ("utilit", TransactionCategory::HousingAndUtilities),
            ("bills", TransactionCategory::HousingAndUtilities),
            ("entertainment", TransactionCategory::Entertainment),
            ("streaming", TransactionCategory::Entertainment),
            ("subscription", TransactionCategory::Entertainment),
            ("shopping", TransactionCategory::Shopping),
            ("retail", TransactionCategory::Shopping),
            ("merchandise", TransactionCategory::Shopping),
            ("health", TransactionCategory::HealthAndFitness),
            ("medical", TransactionCategory::HealthAndFitness),
            ("fitness", TransactionCategory::HealthAndFitness),
            ("pharmacy", TransactionCategory::HealthAndFitness),
            ("income", TransactionCategory::Income),
            ("salary", TransactionCategory::Income),
            ("payroll", TransactionCategory::Income),
            ("deposit", TransactionCategory::Income),
        ];

        SYNONYMS
            .iter()
            .find(|(needle, _)| normalized.contains(needle))
            .map(|(_, category)| *category)
            .unwrap_or(Self::Miscellaneous)
    }
}

impl Default for TransactionCategory {
    fn default() -> Self {
        Self::Miscellaneous
    }
}

impl std::fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which stage of the pipeline produced a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Ai,
    Pattern,
}

/// A transaction recovered from a bank statement.
///
/// Amounts are signed: expenses negative, income and deposits positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTransaction {
    pub user_id: Uuid,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub merchant: String,
    pub amount: f64,
    pub category: TransactionCategory,
    pub description: String,
    pub source: ExtractionSource,
}

impl ExtractedTransaction {
    pub fn is_deposit(&self) -> bool {
        self.amount > 0.0
    }

    /// Finite non-zero amount plus a usable merchant and description.
    pub fn is_well_formed(&self) -> bool {
        self.amount.is_finite()
            && self.amount != 0.0
            && !self.merchant.trim().is_empty()
            && !self.description.trim().is_empty()
    }

    pub fn to_record(&self) -> NewTransaction {
        NewTransaction {
            user_id: self.user_id,
            date: self.date,
            payee: self.merchant.clone(),
            amount: self.amount,
            category_id: self.category.id(),
            description: self.description.clone(),
        }
    }
}

/// Row handed to the persistence layer's `create_transaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub date: Option<NaiveDate>,
    pub payee: String,
    pub amount: f64,
    pub category_id: i32,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(amount: f64) -> ExtractedTransaction {
        ExtractedTransaction {
            user_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 3, 14),
            raw_date: "03/14/2024".to_string(),
            merchant: "Uber".to_string(),
            amount,
            category: TransactionCategory::Transportation,
            description: "UBER TRIP".to_string(),
            source: ExtractionSource::Ai,
        }
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(TransactionCategory::from_label("Food & Dining"), TransactionCategory::FoodAndDining);
        assert_eq!(TransactionCategory::from_label("  health & fitness "), TransactionCategory::HealthAndFitness);
        assert_eq!(TransactionCategory::from_label("Groceries"), TransactionCategory::FoodAndDining);
        assert_eq!(TransactionCategory::from_label("Utilities"), TransactionCategory::HousingAndUtilities);
        assert_eq!(TransactionCategory::from_label("Payroll"), TransactionCategory::Income);
        assert_eq!(TransactionCategory::from_label("Crypto"), TransactionCategory::Miscellaneous);
        assert_eq!(TransactionCategory::from_label(""), TransactionCategory::Miscellaneous);
    }

    #[test]
    fn test_category_ids() {
        assert_eq!(TransactionCategory::Miscellaneous.id(), 8);
        assert_eq!(TransactionCategory::from_id(1), TransactionCategory::FoodAndDining);
        assert_eq!(TransactionCategory::from_id(42), TransactionCategory::Miscellaneous);
    }

    #[test]
    fn test_well_formed() {
        assert!(sample(-12.5).is_well_formed());
        assert!(!sample(f64::NAN).is_well_formed());
        assert!(!sample(0.0).is_well_formed());
        assert!(!sample(-0.0).is_well_formed());

        let mut blank = sample(-1.0);
        blank.merchant = "  ".to_string();
        assert!(!blank.is_well_formed());
    }

    #[test]
    fn test_record_conversion() {
        let txn = sample(-12.5);
        let record = txn.to_record();
        assert_eq!(record.payee, "Uber");
        assert_eq!(record.category_id, 2);
        assert_eq!(record.amount, -12.5);
        assert!(!txn.is_deposit());
    }

    #[test]
    fn test_category_serializes_as_label() {
        let json = serde_json::to_string(&TransactionCategory::HousingAndUtilities).unwrap();
        assert_eq!(json, "\"Housing & Utilities\"");
    }
}
