//! Reward tiers derived from the completed-ride count.

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Completed rides needed for Silver, Gold and Platinum.
pub const SILVER_RIDES: i64 = 5;
pub const GOLD_RIDES: i64 = 10;
pub const PLATINUM_RIDES: i64 = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl RewardTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        }
    }

    /// Tier a user deserves with `ride_count` completed rides.
    pub fn derive(ride_count: i64) -> Self {
        match ride_count {
            n if n >= PLATINUM_RIDES => Self::Platinum,
            n if n >= GOLD_RIDES => Self::Gold,
            n if n >= SILVER_RIDES => Self::Silver,
            _ => Self::Bronze,
        }
    }

    /// The tier to persist after a ride, if it is strictly above `current`.
    ///
    /// Returns `None` otherwise, so a stored tier is never lowered.
    pub fn promote(current: Self, ride_count: i64) -> Option<Self> {
        let derived = Self::derive(ride_count);
        (derived > current).then_some(derived)
    }
}

impl TryFrom<&str> for RewardTier {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "platinum" => Ok(Self::Platinum),
            other => Err(EngineError::InvalidInput(format!(
                "invalid reward tier: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_follows_thresholds() {
        assert_eq!(RewardTier::derive(0), RewardTier::Bronze);
        assert_eq!(RewardTier::derive(4), RewardTier::Bronze);
        assert_eq!(RewardTier::derive(5), RewardTier::Silver);
        assert_eq!(RewardTier::derive(9), RewardTier::Silver);
        assert_eq!(RewardTier::derive(10), RewardTier::Gold);
        assert_eq!(RewardTier::derive(19), RewardTier::Gold);
        assert_eq!(RewardTier::derive(20), RewardTier::Platinum);
        assert_eq!(RewardTier::derive(500), RewardTier::Platinum);
    }

    #[test]
    fn derive_is_monotonic() {
        let mut previous = RewardTier::derive(0);
        for count in 1..100 {
            let tier = RewardTier::derive(count);
            assert!(tier >= previous, "tier dropped at {count}");
            previous = tier;
        }
    }

    #[test]
    fn promote_only_moves_up() {
        assert_eq!(
            RewardTier::promote(RewardTier::Bronze, 5),
            Some(RewardTier::Silver)
        );
        assert_eq!(RewardTier::promote(RewardTier::Silver, 5), None);
        assert_eq!(RewardTier::promote(RewardTier::Silver, 7), None);
    }

    #[test]
    fn promote_never_downgrades_on_lower_count() {
        // A count below the stored tier must leave the tier alone.
        assert_eq!(RewardTier::promote(RewardTier::Gold, 3), None);
        assert_eq!(RewardTier::promote(RewardTier::Platinum, 0), None);
    }

    #[test]
    fn storage_names_round_trip() {
        for tier in [
            RewardTier::Bronze,
            RewardTier::Silver,
            RewardTier::Gold,
            RewardTier::Platinum,
        ] {
            assert_eq!(RewardTier::try_from(tier.as_str()).unwrap(), tier);
        }
    }
}
