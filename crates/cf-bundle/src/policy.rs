//! Delivery policies: when owed outputs are bundled, and what bundles are
//! called.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use cf_core::{Error, Result};

/// How completed outputs are grouped for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryPolicy {
    /// Deliver a pack as soon as enough outputs are owed.
    #[default]
    #[serde(rename = "pack10")]
    Pack10,
    /// Deliver everything once, after the queue drains.
    #[serde(rename = "all")]
    All,
}

/// What prompted a bundling check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleTrigger {
    /// A job just completed.
    Completion,
    /// The scheduler has no pending or processing jobs left.
    Drained,
    /// The user asked for delivery now.
    Manual,
}

impl DeliveryPolicy {
    /// How many of the `owed` outputs (oldest first) to bundle now.
    /// Zero means "not yet".
    pub fn batch_size(&self, trigger: BundleTrigger, owed: usize, pack_size: usize) -> usize {
        let pack_size = pack_size.max(1);
        match (self, trigger) {
            (_, BundleTrigger::Manual) => owed,
            (Self::Pack10, BundleTrigger::Completion) if owed >= pack_size => pack_size,
            (Self::Pack10, BundleTrigger::Completion) => 0,
            // Flush the remainder that never reached a full pack.
            (Self::Pack10, BundleTrigger::Drained) => owed,
            (Self::All, BundleTrigger::Completion) => 0,
            (Self::All, BundleTrigger::Drained) => owed,
        }
    }

    /// Bundle name (without extension). `pack_number` is only used by
    /// [`DeliveryPolicy::Pack10`].
    pub fn bundle_name(&self, pack_number: u64) -> String {
        match self {
            Self::Pack10 => format!("Pack-{pack_number}"),
            Self::All => "Complete".to_string(),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pack10 => write!(f, "pack10"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for DeliveryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pack10" | "pack" => Ok(Self::Pack10),
            "all" | "complete" => Ok(Self::All),
            other => Err(Error::Validation(format!(
                "unknown delivery policy '{other}' (expected pack10 or all)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_waits_for_threshold() {
        let p = DeliveryPolicy::Pack10;
        assert_eq!(p.batch_size(BundleTrigger::Completion, 9, 10), 0);
        assert_eq!(p.batch_size(BundleTrigger::Completion, 10, 10), 10);
        assert_eq!(p.batch_size(BundleTrigger::Completion, 13, 10), 10);
    }

    #[test]
    fn pack_flushes_remainder_when_drained() {
        assert_eq!(DeliveryPolicy::Pack10.batch_size(BundleTrigger::Drained, 5, 10), 5);
    }

    #[test]
    fn all_only_on_drain() {
        let p = DeliveryPolicy::All;
        assert_eq!(p.batch_size(BundleTrigger::Completion, 50, 10), 0);
        assert_eq!(p.batch_size(BundleTrigger::Drained, 50, 10), 50);
    }

    #[test]
    fn manual_takes_everything() {
        for p in [DeliveryPolicy::Pack10, DeliveryPolicy::All] {
            assert_eq!(p.batch_size(BundleTrigger::Manual, 3, 10), 3);
        }
    }

    #[test]
    fn zero_pack_size_treated_as_one() {
        assert_eq!(DeliveryPolicy::Pack10.batch_size(BundleTrigger::Completion, 1, 0), 1);
    }

    #[test]
    fn names() {
        assert_eq!(DeliveryPolicy::Pack10.bundle_name(2), "Pack-2");
        assert_eq!(DeliveryPolicy::All.bundle_name(7), "Complete");
    }

    #[test]
    fn parse_and_serde() {
        assert_eq!("ALL".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::All);
        assert_eq!("pack10".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::Pack10);
        assert!("weekly".parse::<DeliveryPolicy>().is_err());
        assert_eq!(serde_json::to_string(&DeliveryPolicy::Pack10).unwrap(), "\"pack10\"");
    }
}
