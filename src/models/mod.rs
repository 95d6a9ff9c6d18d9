use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

pub mod product;
pub mod transition;

// Re-exports for convenience
pub use product::*;
pub use transition::*;

/// Lifecycle of one tracked product. Stored as TEXT.
///
/// `New` is a transient marker for "first ever observation" — it shows up in
/// logs and as the absent side of a transition, but reconciliation always
/// resolves a fresh observation to `Buyable` or `OutOfStock` before the
/// record is written. `Hidden` is entered when a known product can no longer
/// be validated at its canonical URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductState {
    New,
    Buyable,
    OutOfStock,
    Hidden,
}

impl ProductState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductState::New => "NEW",
            ProductState::Buyable => "BUYABLE",
            ProductState::OutOfStock => "OUT_OF_STOCK",
            ProductState::Hidden => "HIDDEN",
        }
    }
}

impl std::fmt::Display for ProductState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ProductState::New),
            "BUYABLE" => Ok(ProductState::Buyable),
            "OUT_OF_STOCK" => Ok(ProductState::OutOfStock),
            "HIDDEN" => Ok(ProductState::Hidden),
            other => Err(AppError::Parse {
                message: format!("unknown product state {other:?}"),
            }),
        }
    }
}

/// Why an alert is being sent: first sighting vs. return to stock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    New,
    Restock,
}
