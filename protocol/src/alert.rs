//! Alert severity levels carried by every status node.

use serde::{Deserialize, Serialize};

/// Severity attached to a node of the status tree.
///
/// Variants are declared in ascending severity so the derived ordering
/// matches the order clients render them in. Discriminants are the wire ids.
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    #[default]
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
    /// State could not be determined (monitor offline, check timed out).
    Unknown = 5,
}

impl AlertLevel {
    /// All levels in wire-id order.
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
        Self::Unknown,
    ];

    /// Returns the single byte written for this level.
    #[must_use]
    pub const fn wire_id(self) -> u8 {
        self as u8
    }
}

impl core::convert::TryFrom<u8> for AlertLevel {
    type Error = InvalidAlertLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            4 => Ok(Self::Critical),
            5 => Ok(Self::Unknown),
            _ => Err(InvalidAlertLevel(value)),
        }
    }
}

/// Error returned when an unknown alert level byte is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAlertLevel(pub u8);

impl core::fmt::Display for InvalidAlertLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "invalid alert level id {}", self.0)
    }
}

impl std::error::Error for InvalidAlertLevel {}
