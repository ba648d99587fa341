//! Fintrack Domain Models
//!
//! Shared types for the statement ingestion pipeline and its callers.
//!
//! ## Core Types
//!
//! - **ExtractedTransaction**: A transaction recovered from a bank statement, signed
//!   so that expenses are negative and deposits positive
//! - **TransactionCategory**: The closed category set, with display labels and the
//!   numeric ids used by the `categories` table
//! - **NewTransaction**: The persistence record built from an extracted transaction
//! - **StatementFormatProfile**: Per-document layout hints detected before extraction

pub mod transaction;
pub mod statement;

#[cfg(test)]
pub mod property_tests;

pub use transaction::*;
pub use statement::*;
