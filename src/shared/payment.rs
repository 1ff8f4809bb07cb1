//! Payment records and the accepted payment methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accepted payment methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Cash,
    Card,
    Bank,
    Wallet,
}

impl PaymentMethod {
    /// Parse a user-supplied method string (case-insensitive, trimmed).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "upi" => Some(Self::Upi),
            "cash" => Some(Self::Cash),
            "card" => Some(Self::Card),
            "bank" => Some(Self::Bank),
            "wallet" => Some(Self::Wallet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upi => "upi",
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Bank => "bank",
            Self::Wallet => "wallet",
        }
    }
}

/// Payment record with its receipt image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub client_name: String,
    pub client_phone: Option<String>,
    /// Creator of the record
    pub user_id: Uuid,
    pub source: String,
    pub amount: f64,
    pub tx_id: String,
    pub method: String,
    /// Public URL of the receipt image
    pub image_url: Option<String>,
    /// `"user"` or `"admin"` at creation time
    pub created_by_role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parse and validate a payment amount: must be a finite positive number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let amount: f64 = raw.trim().parse().ok()?;
    if amount.is_finite() && amount > 0.0 {
        Some(amount)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(PaymentMethod::from_str("upi"), Some(PaymentMethod::Upi));
        assert_eq!(PaymentMethod::from_str(" CARD "), Some(PaymentMethod::Card));
        assert_eq!(PaymentMethod::from_str("Wallet"), Some(PaymentMethod::Wallet));
        assert_eq!(PaymentMethod::from_str("crypto"), None);
        assert_eq!(PaymentMethod::from_str(""), None);
    }

    #[test]
    fn test_method_round_trip() {
        for method in ["upi", "cash", "card", "bank", "wallet"] {
            let parsed = PaymentMethod::from_str(method).unwrap();
            assert_eq!(parsed.as_str(), method);
        }
    }

    #[test]
    fn test_amount_validation() {
        assert_eq!(parse_amount("10"), Some(10.0));
        assert_eq!(parse_amount(" 99.95 "), Some(99.95));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount("ten"), None);
    }
}
