//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::levels::ActivationPhase;

/// Per-wallet BCC balance record.
/// Created exactly once at membership activation; mutated only through the
/// ledger operations, never auto-created by reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Lowercased 0x wallet address (store key)
    pub wallet: String,
    /// Spendable immediately
    pub transferable: u64,
    /// Reward credits, limited use
    pub restricted: u64,
    /// Pending release via level unlocks
    pub locked: u64,
    /// Highest membership level unlocked so far (1-19)
    pub current_level: u8,
    /// Global position in the activation sequence
    pub activation_order: u64,
    /// Halving phase frozen at activation time
    pub activation_phase: ActivationPhase,
    pub created_at: i64,
    pub last_updated: i64,
}

impl BalanceRecord {
    pub fn total_bcc(&self) -> u64 {
        self.transferable + self.restricted + self.locked
    }
}

/// One entry in the append-only unlock log.
/// Keyed by `"{wallet}:{level:02}"`; the key is the uniqueness constraint
/// that rejects duplicate unlocks for the same (wallet, level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockLogEntry {
    pub id: String,
    pub wallet: String,
    /// Level whose purchase triggered this unlock
    pub level: u8,
    /// BCC moved from locked to transferable (phase-scaled)
    pub amount: u64,
    pub transferable_before: u64,
    pub transferable_after: u64,
    pub locked_before: u64,
    pub locked_after: u64,
    /// On-chain purchase transaction hash, if the collaborator supplied one
    pub tx_hash: Option<String>,
    pub unlocked_at: i64,
}

/// Aggregate ledger statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_wallets: usize,
    pub total_unlocks: usize,
    /// Unlock count per level
    pub unlocks_per_level: HashMap<u8, usize>,
    pub total_transferable: u64,
    pub total_restricted: u64,
    pub total_locked: u64,
}
