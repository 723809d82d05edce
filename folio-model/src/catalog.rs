use rust_decimal::Decimal;

use crate::error::{ModelError, Result};

/// Who may request a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum AccessLevel {
    #[default]
    Normal,
    /// Restricted to patrons holding an active premium membership.
    Premium,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Normal => "NORMAL",
            AccessLevel::Premium => "PREMIUM",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "NORMAL" => Ok(AccessLevel::Normal),
            "PREMIUM" => Ok(AccessLevel::Premium),
            other => Err(ModelError::UnknownStatus {
                kind: "access level",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only catalog facts about a title.
///
/// The MRP is the replacement price penalties are computed from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogEntry {
    pub name: String,
    pub mrp: Decimal,
    pub access_level: AccessLevel,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, mrp: Decimal, access_level: AccessLevel) -> Self {
        Self {
            name: name.into(),
            mrp,
            access_level,
        }
    }

    pub fn is_premium_only(&self) -> bool {
        self.access_level == AccessLevel::Premium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn access_levels_round_trip_through_storage_form() {
        for level in [AccessLevel::Normal, AccessLevel::Premium] {
            assert_eq!(AccessLevel::parse(level.as_str()).unwrap(), level);
        }
        assert!(AccessLevel::parse("VIP").is_err());
    }

    #[test]
    fn premium_entries_are_flagged() {
        let entry = CatalogEntry::new("Dune", dec!(100), AccessLevel::Premium);
        assert!(entry.is_premium_only());
    }
}
