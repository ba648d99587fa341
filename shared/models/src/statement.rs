use serde::{Deserialize, Serialize};

/// Layout hints for a single statement, detected before extraction.
///
/// Lives only for the duration of one document's extraction. Every field is
/// optional because the detection response is untrusted model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatementFormatProfile {
    #[serde(alias = "bank_name", alias = "bank")]
    pub bank_name: Option<String>,
    #[serde(alias = "date_format")]
    pub date_format: Option<String>,
    #[serde(alias = "transaction_structure", alias = "transactionFormat")]
    pub transaction_structure: Option<String>,
    #[serde(alias = "amount_format")]
    pub amount_format: Option<String>,
    #[serde(alias = "deposit_convention", alias = "depositWithdrawalConvention")]
    pub deposit_convention: Option<String>,
}

impl StatementFormatProfile {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self == &Self::default()
    }

    pub fn bank_name_or_default(&self) -> &str {
        non_blank(&self.bank_name).unwrap_or("Unknown")
    }

    pub fn date_format_or_default(&self) -> &str {
        non_blank(&self.date_format).unwrap_or("Various formats")
    }

    pub fn transaction_structure_or_default(&self) -> &str {
        non_blank(&self.transaction_structure).unwrap_or("Unknown")
    }

    pub fn amount_format_or_default(&self) -> &str {
        non_blank(&self.amount_format).unwrap_or("Various formats")
    }

    pub fn deposit_convention_or_default(&self) -> &str {
        non_blank(&self.deposit_convention).unwrap_or("Unknown")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let profile = StatementFormatProfile::unknown();
        assert!(profile.is_unknown());
        assert_eq!(profile.bank_name_or_default(), "Unknown");
        assert_eq!(profile.date_format_or_default(), "Various formats");
    }

    #[test]
    fn test_accepts_camel_and_snake_case() {
        let camel: StatementFormatProfile =
            serde_json::from_str(r#"{"bankName":"Chase","dateFormat":"MM/DD"}"#).unwrap();
        let snake: StatementFormatProfile =
            serde_json::from_str(r#"{"bank_name":"Chase","date_format":"MM/DD"}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.bank_name_or_default(), "Chase");
        assert_eq!(camel.amount_format_or_default(), "Various formats");
    }

    #[test]
    fn test_blank_fields_fall_back() {
        let profile = StatementFormatProfile {
            bank_name: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.bank_name_or_default(), "Unknown");
    }
}
