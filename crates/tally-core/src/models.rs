//! Data models for Tally

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::vendor::default_vendor;

/// Category reported for rows no tier has classified yet
///
/// Only used at the CSV boundary; in memory the state is `Categorization::Uncategorized`.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Which classification strategy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Literal keyword containment
    Exact,
    /// Similarity score against a keyword
    Fuzzy,
    /// Remote language model (or its cache)
    External,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::External => "external",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "fuzzy" => Ok(Self::Fuzzy),
            "external" => Ok(Self::External),
            other => Err(format!("Unknown tier: {}", other)),
        }
    }
}

/// A category/vendor decision and the tier that made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    /// Short display name, at most 30 characters
    pub vendor: String,
    pub tier: Tier,
}

/// Categorization state of a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Categorization {
    #[default]
    Uncategorized,
    Categorized(Classification),
}

impl Categorization {
    pub fn is_uncategorized(&self) -> bool {
        matches!(self, Self::Uncategorized)
    }

    pub fn classification(&self) -> Option<&Classification> {
        match self {
            Self::Uncategorized => None,
            Self::Categorized(c) => Some(c),
        }
    }
}

impl From<Classification> for Categorization {
    fn from(c: Classification) -> Self {
        Self::Categorized(c)
    }
}

/// Expense or payment, derived from the amount sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Payment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Payment => "payment",
        }
    }
}

/// A normalized statement row
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    /// Negative = outflow, positive = inflow
    pub amount: Decimal,
    /// Account identifier taken from the statement file name
    pub account_number: Option<String>,
    /// Category column provided by the bank, if any (informational only)
    pub bank_category: Option<String>,
    pub categorization: Categorization,
}

impl Transaction {
    pub fn new(date: NaiveDate, description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            date,
            description: description.into(),
            amount,
            account_number: None,
            bank_category: None,
            categorization: Categorization::Uncategorized,
        }
    }

    /// Assigned category, or `"uncategorized"`
    pub fn category(&self) -> &str {
        self.categorization
            .classification()
            .map(|c| c.category.as_str())
            .unwrap_or(UNCATEGORIZED)
    }

    /// Assigned vendor, or the first 30 characters of the description
    pub fn vendor(&self) -> String {
        match self.categorization.classification() {
            Some(c) => c.vendor.clone(),
            None => default_vendor(&self.description),
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        self.categorization.classification().map(|c| c.tier)
    }

    pub fn transaction_type(&self) -> TransactionType {
        if self.amount > Decimal::ZERO {
            TransactionType::Payment
        } else {
            TransactionType::Expense
        }
    }
}
