use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};
use crate::ids::TitleId;

/// A catalog title together with its copy counters.
///
/// The counters always satisfy `total == available + issued`. Every
/// mutation that moves a copy between the two pools must preserve that
/// sum; [`Title::validate`] checks it after reads from storage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Title {
    pub id: TitleId,
    pub name: String,
    /// Total number of physical copies owned by the library.
    pub total: i32,
    /// Copies currently on the shelf and claimable.
    pub available: i32,
    /// Copies currently out on loan.
    pub issued: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Title {
    pub fn new(name: impl Into<String>, total: i32) -> Self {
        let now = Utc::now();
        Self {
            id: TitleId::new(),
            name: name.into(),
            total,
            available: total,
            issued: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the copy-conservation invariant.
    pub fn validate(&self) -> Result<()> {
        if self.total < 0 || self.available < 0 || self.issued < 0 {
            return Err(ModelError::InvalidCounts(format!(
                "negative counter for title {}: total={} available={} issued={}",
                self.id, self.total, self.available, self.issued
            )));
        }
        if self.total != self.available + self.issued {
            return Err(ModelError::InvalidCounts(format!(
                "counter drift for title {}: total={} != available={} + issued={}",
                self.id, self.total, self.available, self.issued
            )));
        }
        Ok(())
    }

    pub fn in_stock(&self) -> bool {
        self.available > 0
    }
}
