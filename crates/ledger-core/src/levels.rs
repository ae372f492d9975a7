//! ============================================================================
//! Level Config Table - Membership levels and BCC unlock amounts
//! ============================================================================
//! The single authoritative table for the 19 membership NFT levels: pricing,
//! the BCC amount each level releases from the locked pool, and the halving
//! phase schedule applied to wallets by activation order.
//! ============================================================================

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest membership level
pub const MAX_LEVEL: u8 = 19;

/// Transferable BCC credited to every wallet at activation
pub const INITIAL_TRANSFERABLE_BCC: u64 = 500;

/// Sum of base unlock amounts across all 19 levels (100 + 150 + ... + 1000)
pub const TOTAL_BASE_LOCKUP: u64 = 10_450;

/// Activation-order thresholds for the halving phases
pub const PHASE_1_MAX_ORDER: u64 = 9_999;
pub const PHASE_2_MAX_ORDER: u64 = 19_998;
pub const PHASE_3_MAX_ORDER: u64 = 39_997;

/// Configuration for one membership NFT level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelConfig {
    pub level: u8,
    pub slug: &'static str,
    pub title: &'static str,
    /// Total purchase price in USDT cents (NFT price + platform fee)
    pub price_usdt_cents: u64,
    /// NFT price portion, paid out as the sponsor reward
    pub nft_price_cents: u64,
    /// Platform fee portion (Level 1 only)
    pub platform_fee_cents: u64,
    /// BCC released from locked to transferable when this level is purchased,
    /// before phase scaling
    pub base_unlock: u64,
    pub benefit_keys: &'static [&'static str],
}

/// The 19 membership levels. Level 1 carries a $30 platform fee on top of the
/// $100 NFT price; every later level is fee-free at $50 increments, and the
/// unlock amount follows the same schedule (100, 150, ..., 1000 BCC).
pub static LEVELS: [LevelConfig; 19] = [
    LevelConfig {
        level: 1,
        slug: "warrior",
        title: "Warrior",
        price_usdt_cents: 13_000,
        nft_price_cents: 10_000,
        platform_fee_cents: 3_000,
        base_unlock: 100,
        benefit_keys: &[
            "membership.benefits.l1.basic",
            "membership.benefits.l1.education",
            "membership.benefits.l1.rewards",
        ],
    },
    LevelConfig {
        level: 2,
        slug: "bronze",
        title: "Bronze",
        price_usdt_cents: 15_000,
        nft_price_cents: 15_000,
        platform_fee_cents: 0,
        base_unlock: 150,
        benefit_keys: &[
            "membership.benefits.l2.enhanced",
            "membership.benefits.l2.bonus",
            "membership.benefits.l2.network",
        ],
    },
    LevelConfig {
        level: 3,
        slug: "silver",
        title: "Silver",
        price_usdt_cents: 20_000,
        nft_price_cents: 20_000,
        platform_fee_cents: 0,
        base_unlock: 200,
        benefit_keys: &[
            "membership.benefits.l3.advanced",
            "membership.benefits.l3.exclusive",
            "membership.benefits.l3.priority",
        ],
    },
    LevelConfig {
        level: 4,
        slug: "gold",
        title: "Gold",
        price_usdt_cents: 25_000,
        nft_price_cents: 25_000,
        platform_fee_cents: 0,
        base_unlock: 250,
        benefit_keys: &[
            "membership.benefits.l4.premium",
            "membership.benefits.l4.mentorship",
            "membership.benefits.l4.tools",
        ],
    },
    LevelConfig {
        level: 5,
        slug: "elite",
        title: "Elite",
        price_usdt_cents: 30_000,
        nft_price_cents: 30_000,
        platform_fee_cents: 0,
        base_unlock: 300,
        benefit_keys: &[
            "membership.benefits.l5.elite",
            "membership.benefits.l5.leadership",
            "membership.benefits.l5.insights",
        ],
    },
    LevelConfig {
        level: 6,
        slug: "platinum",
        title: "Platinum",
        price_usdt_cents: 35_000,
        nft_price_cents: 35_000,
        platform_fee_cents: 0,
        base_unlock: 350,
        benefit_keys: &[
            "membership.benefits.l6.mastery",
            "membership.benefits.l6.networking",
            "membership.benefits.l6.rewards",
        ],
    },
    LevelConfig {
        level: 7,
        slug: "master",
        title: "Master",
        price_usdt_cents: 40_000,
        nft_price_cents: 40_000,
        platform_fee_cents: 0,
        base_unlock: 400,
        benefit_keys: &[
            "membership.benefits.l7.expert",
            "membership.benefits.l7.community",
            "membership.benefits.l7.alpha",
        ],
    },
    LevelConfig {
        level: 8,
        slug: "diamond",
        title: "Diamond",
        price_usdt_cents: 45_000,
        nft_price_cents: 45_000,
        platform_fee_cents: 0,
        base_unlock: 450,
        benefit_keys: &[
            "membership.benefits.l8.legendary",
            "membership.benefits.l8.influence",
            "membership.benefits.l8.opportunities",
        ],
    },
    LevelConfig {
        level: 9,
        slug: "grandmaster",
        title: "Grandmaster",
        price_usdt_cents: 50_000,
        nft_price_cents: 50_000,
        platform_fee_cents: 0,
        base_unlock: 500,
        benefit_keys: &[
            "membership.benefits.l9.mastery",
            "membership.benefits.l9.inner_circle",
            "membership.benefits.l9.exclusive",
        ],
    },
    LevelConfig {
        level: 10,
        slug: "star-shine",
        title: "Star Shine",
        price_usdt_cents: 55_000,
        nft_price_cents: 55_000,
        platform_fee_cents: 0,
        base_unlock: 550,
        benefit_keys: &[
            "membership.benefits.l10.grandmaster",
            "membership.benefits.l10.authority",
            "membership.benefits.l10.legacy",
        ],
    },
    LevelConfig {
        level: 11,
        slug: "epic",
        title: "Epic",
        price_usdt_cents: 60_000,
        nft_price_cents: 60_000,
        platform_fee_cents: 0,
        base_unlock: 600,
        benefit_keys: &[
            "membership.benefits.l11.wisdom",
            "membership.benefits.l11.cosmic",
            "membership.benefits.l11.transcendent",
        ],
    },
    LevelConfig {
        level: 12,
        slug: "hall",
        title: "Hall",
        price_usdt_cents: 65_000,
        nft_price_cents: 65_000,
        platform_fee_cents: 0,
        base_unlock: 650,
        benefit_keys: &[
            "membership.benefits.l12.oracle",
            "membership.benefits.l12.foresight",
            "membership.benefits.l12.divine",
        ],
    },
    LevelConfig {
        level: 13,
        slug: "strongest-king",
        title: "The Strongest King",
        price_usdt_cents: 70_000,
        nft_price_cents: 70_000,
        platform_fee_cents: 0,
        base_unlock: 700,
        benefit_keys: &[
            "membership.benefits.l13.immortal",
            "membership.benefits.l13.eternal",
            "membership.benefits.l13.infinite",
        ],
    },
    LevelConfig {
        level: 14,
        slug: "king-of-kings",
        title: "The King of Kings",
        price_usdt_cents: 75_000,
        nft_price_cents: 75_000,
        platform_fee_cents: 0,
        base_unlock: 750,
        benefit_keys: &[
            "membership.benefits.l14.celestial",
            "membership.benefits.l14.heavenly",
            "membership.benefits.l14.ascended",
        ],
    },
    LevelConfig {
        level: 15,
        slug: "glory-king",
        title: "Glory King",
        price_usdt_cents: 80_000,
        nft_price_cents: 80_000,
        platform_fee_cents: 0,
        base_unlock: 800,
        benefit_keys: &[
            "membership.benefits.l15.divine",
            "membership.benefits.l15.godlike",
            "membership.benefits.l15.ultimate",
        ],
    },
    LevelConfig {
        level: 16,
        slug: "legendary-overlord",
        title: "Legendary Overlord",
        price_usdt_cents: 85_000,
        nft_price_cents: 85_000,
        platform_fee_cents: 0,
        base_unlock: 850,
        benefit_keys: &[
            "membership.benefits.l16.supreme",
            "membership.benefits.l16.omnipotent",
            "membership.benefits.l16.sovereign",
        ],
    },
    LevelConfig {
        level: 17,
        slug: "supreme-lord",
        title: "Supreme Lord",
        price_usdt_cents: 90_000,
        nft_price_cents: 90_000,
        platform_fee_cents: 0,
        base_unlock: 900,
        benefit_keys: &[
            "membership.benefits.l17.transcendent",
            "membership.benefits.l17.beyond",
            "membership.benefits.l17.unlimited",
        ],
    },
    LevelConfig {
        level: 18,
        slug: "supreme-myth",
        title: "Supreme Myth",
        price_usdt_cents: 95_000,
        nft_price_cents: 95_000,
        platform_fee_cents: 0,
        base_unlock: 950,
        benefit_keys: &[
            "membership.benefits.l18.absolute",
            "membership.benefits.l18.perfection",
            "membership.benefits.l18.apex",
        ],
    },
    LevelConfig {
        level: 19,
        slug: "mythical-peak",
        title: "Mythical Peak",
        price_usdt_cents: 100_000,
        nft_price_cents: 100_000,
        platform_fee_cents: 0,
        base_unlock: 1000,
        benefit_keys: &[
            "membership.benefits.l19.mythical",
            "membership.benefits.l19.peak",
            "membership.benefits.l19.legendary",
        ],
    },
];

static SLUG_INDEX: Lazy<HashMap<&'static str, &'static LevelConfig>> =
    Lazy::new(|| LEVELS.iter().map(|config| (config.slug, config)).collect());

/// Look up a level config by level number.
pub fn level_config(level: u8) -> Option<&'static LevelConfig> {
    if level < 1 || level > MAX_LEVEL {
        return None;
    }
    LEVELS.get(level as usize - 1)
}

/// Look up a level config by slug (e.g. "warrior").
pub fn level_config_by_slug(slug: &str) -> Option<&'static LevelConfig> {
    SLUG_INDEX.get(slug).copied()
}

pub fn validate_level(level: u8) -> bool {
    (1..=MAX_LEVEL).contains(&level)
}

/// Halving phase, frozen per wallet at activation time. Early members unlock
/// full amounts; later phases halve repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPhase {
    #[default]
    Phase1,
    Phase2,
    Phase3,
    Phase4,
}

impl ActivationPhase {
    /// Determine the phase from a global activation order (1-based).
    pub fn from_activation_order(order: u64) -> Self {
        match order {
            o if o <= PHASE_1_MAX_ORDER => ActivationPhase::Phase1,
            o if o <= PHASE_2_MAX_ORDER => ActivationPhase::Phase2,
            o if o <= PHASE_3_MAX_ORDER => ActivationPhase::Phase3,
            _ => ActivationPhase::Phase4,
        }
    }

    /// Unlock multiplier expressed in eighths (8 = full, 4 = half, ...);
    /// phase scaling stays in integer math.
    pub fn multiplier_eighths(&self) -> u64 {
        match self {
            ActivationPhase::Phase1 => 8,
            ActivationPhase::Phase2 => 4,
            ActivationPhase::Phase3 => 2,
            ActivationPhase::Phase4 => 1,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            ActivationPhase::Phase1 => 1,
            ActivationPhase::Phase2 => 2,
            ActivationPhase::Phase3 => 3,
            ActivationPhase::Phase4 => 4,
        }
    }
}

/// Effective BCC released when `level` is purchased by a wallet in `phase`.
/// Fractional halves floor.
pub fn unlock_amount(level: u8, phase: ActivationPhase) -> Option<u64> {
    level_config(level).map(|config| config.base_unlock * phase.multiplier_eighths() / 8)
}

/// The locked pool seeded at activation for a wallet in `phase`: the sum of
/// its per-level effective unlock amounts. Invariant: a wallet that unlocks
/// every level ends at locked == 0, even where halved amounts floor.
pub fn total_locked(phase: ActivationPhase) -> u64 {
    LEVELS
        .iter()
        .map(|config| config.base_unlock * phase.multiplier_eighths() / 8)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_table_shape() {
        assert_eq!(LEVELS.len(), MAX_LEVEL as usize);
        for (i, config) in LEVELS.iter().enumerate() {
            assert_eq!(config.level as usize, i + 1);
            assert_eq!(config.benefit_keys.len(), 3);
            assert_eq!(
                config.price_usdt_cents,
                config.nft_price_cents + config.platform_fee_cents
            );
        }
    }

    #[test]
    fn test_unlock_amounts_follow_schedule() {
        // base unlock = 50 + 50 * level
        for config in &LEVELS {
            assert_eq!(config.base_unlock, 50 + 50 * config.level as u64);
        }
        assert_eq!(LEVELS[0].base_unlock, 100);
        assert_eq!(LEVELS[18].base_unlock, 1000);
    }

    #[test]
    fn test_unlock_amounts_monotonic() {
        for pair in LEVELS.windows(2) {
            assert!(
                pair[1].base_unlock >= pair[0].base_unlock,
                "unlock amount must not decrease from level {} to {}",
                pair[0].level,
                pair[1].level
            );
        }
    }

    #[test]
    fn test_total_base_lockup() {
        let sum: u64 = LEVELS.iter().map(|c| c.base_unlock).sum();
        assert_eq!(sum, TOTAL_BASE_LOCKUP);
        assert_eq!(total_locked(ActivationPhase::Phase1), TOTAL_BASE_LOCKUP);
    }

    #[test]
    fn test_level_lookup_bounds() {
        assert!(level_config(0).is_none());
        assert!(level_config(20).is_none());
        assert_eq!(level_config(1).unwrap().slug, "warrior");
        assert_eq!(level_config(19).unwrap().slug, "mythical-peak");
    }

    #[test]
    fn test_slug_lookup() {
        assert_eq!(level_config_by_slug("warrior").unwrap().level, 1);
        assert_eq!(level_config_by_slug("glory-king").unwrap().level, 15);
        assert!(level_config_by_slug("peasant").is_none());
    }

    #[test]
    fn test_phase_from_activation_order() {
        assert_eq!(ActivationPhase::from_activation_order(1), ActivationPhase::Phase1);
        assert_eq!(ActivationPhase::from_activation_order(9_999), ActivationPhase::Phase1);
        assert_eq!(ActivationPhase::from_activation_order(10_000), ActivationPhase::Phase2);
        assert_eq!(ActivationPhase::from_activation_order(19_998), ActivationPhase::Phase2);
        assert_eq!(ActivationPhase::from_activation_order(19_999), ActivationPhase::Phase3);
        assert_eq!(ActivationPhase::from_activation_order(39_997), ActivationPhase::Phase3);
        assert_eq!(ActivationPhase::from_activation_order(39_998), ActivationPhase::Phase4);
        assert_eq!(ActivationPhase::from_activation_order(1_000_000), ActivationPhase::Phase4);
    }

    #[test]
    fn test_phase_scaled_unlock_amounts() {
        assert_eq!(unlock_amount(1, ActivationPhase::Phase1), Some(100));
        assert_eq!(unlock_amount(1, ActivationPhase::Phase2), Some(50));
        assert_eq!(unlock_amount(1, ActivationPhase::Phase3), Some(25));
        // 100 / 8 floors
        assert_eq!(unlock_amount(1, ActivationPhase::Phase4), Some(12));
        assert_eq!(unlock_amount(19, ActivationPhase::Phase4), Some(125));
        assert_eq!(unlock_amount(0, ActivationPhase::Phase1), None);
    }

    #[test]
    fn test_total_locked_matches_per_level_sums() {
        for phase in [
            ActivationPhase::Phase1,
            ActivationPhase::Phase2,
            ActivationPhase::Phase3,
            ActivationPhase::Phase4,
        ] {
            let per_level: u64 = (1..=MAX_LEVEL)
                .map(|level| unlock_amount(level, phase).unwrap())
                .sum();
            assert_eq!(total_locked(phase), per_level);
        }
    }
}
