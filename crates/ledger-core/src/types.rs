//! ============================================================================
//! Core Types for the Beehive BCC Ledger
//! ============================================================================
//! Defines wallet addresses, purchase events, operation results, and the
//! ledger error enum shared by the store and the engine.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::types::{BalanceRecord, UnlockLogEntry};
use crate::levels::{self, ActivationPhase, MAX_LEVEL};

/// EVM wallet address, normalized to lowercase `0x` + 40 hex chars.
/// The upstream platform stores wallets as 42-char varchars and lowercases
/// them at every query site; normalizing once at the boundary keeps the
/// store keyed consistently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and normalize a wallet address.
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let addr = raw.trim().to_lowercase();
        let hex_ok = addr.len() == 42
            && addr.starts_with("0x")
            && addr[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !hex_ok {
            return Err(LedgerError::InvalidWallet(raw.to_string()));
        }
        Ok(Self(addr))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A confirmed on-chain membership NFT purchase, as reported by the
/// activation / level-upgrade collaborator. The ledger trusts the caller to
/// have verified the transaction; it only records the hash for the audit
/// trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipPurchase {
    pub wallet: WalletAddress,
    pub level: u8,
    /// On-chain transaction hash of the NFT claim, if available
    pub tx_hash: Option<String>,
}

/// Result of an unlock attempt. Duplicate deliveries of the same
/// `(wallet, level)` purchase resolve to `AlreadyUnlocked` carrying the
/// original log entry, so webhook retries are safe no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "entry")]
pub enum UnlockOutcome {
    /// The unlock was applied by this call
    Applied(UnlockLogEntry),
    /// The level was already unlocked; nothing changed
    AlreadyUnlocked(UnlockLogEntry),
}

impl UnlockOutcome {
    pub fn entry(&self) -> &UnlockLogEntry {
        match self {
            UnlockOutcome::Applied(entry) | UnlockOutcome::AlreadyUnlocked(entry) => entry,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, UnlockOutcome::Applied(_))
    }
}

/// Which BCC bucket a spend should draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpendPreference {
    Transferable,
    Restricted,
    /// Transferable first, remainder from restricted
    #[default]
    Auto,
}

impl SpendPreference {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "transferable" => Some(Self::Transferable),
            "restricted" => Some(Self::Restricted),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Which bucket(s) a spend actually drew from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendBucket {
    Transferable,
    Restricted,
    Mixed,
}

impl SpendBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transferable => "transferable",
            Self::Restricted => "restricted",
            Self::Mixed => "mixed",
        }
    }
}

/// Receipt for a completed BCC spend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendReceipt {
    pub wallet: String,
    pub amount: u64,
    pub bucket_used: SpendBucket,
    pub transferable_used: u64,
    pub restricted_used: u64,
}

/// Receipt for a completed membership activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationReceipt {
    pub wallet: String,
    pub activation_order: u64,
    pub activation_phase: ActivationPhase,
    pub seeded_transferable: u64,
    pub seeded_locked: u64,
    /// The Level 1 unlock applied as part of activation
    pub unlock: UnlockLogEntry,
}

/// Point-in-time view of a wallet's BCC pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub wallet: String,
    pub transferable: u64,
    pub restricted: u64,
    pub locked: u64,
    pub total: u64,
    pub current_level: u8,
    pub activation_order: u64,
    pub activation_phase: ActivationPhase,
    pub next_unlock_level: Option<u8>,
    pub next_unlock_amount: Option<u64>,
    pub created_at: i64,
    pub last_updated: i64,
}

impl BalanceBreakdown {
    /// Build a breakdown from a stored balance record.
    pub fn from_record(record: &BalanceRecord) -> Self {
        let next_level = record.current_level + 1;
        let (next_unlock_level, next_unlock_amount) = if next_level <= MAX_LEVEL {
            (
                Some(next_level),
                levels::unlock_amount(next_level, record.activation_phase),
            )
        } else {
            (None, None)
        };

        Self {
            wallet: record.wallet.clone(),
            transferable: record.transferable,
            restricted: record.restricted,
            locked: record.locked,
            total: record.total_bcc(),
            current_level: record.current_level,
            activation_order: record.activation_order,
            activation_phase: record.activation_phase,
            next_unlock_level,
            next_unlock_amount,
            created_at: record.created_at,
            last_updated: record.last_updated,
        }
    }
}

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("Balance record not found: {0}")]
    BalanceNotFound(String),

    #[error("No level config for level {0}")]
    LevelNotFound(u8),

    #[error("Wallet already activated: {0}")]
    AlreadyActivated(String),

    #[error("Non-sequential upgrade for {wallet}: at level {current}, requested level {requested}")]
    NonSequentialUpgrade {
        wallet: String,
        current: u8,
        requested: u8,
    },

    #[error("Insufficient locked balance: need {needed} BCC, have {available} BCC")]
    InsufficientLocked { needed: u64, available: u64 },

    #[error("Insufficient {bucket} balance: need {needed} BCC, have {available} BCC")]
    InsufficientBalance {
        bucket: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("Storage error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_parse_normalizes_case() {
        let wallet = WalletAddress::parse("0xAbCdEf0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(wallet.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_wallet_parse_trims_whitespace() {
        let wallet =
            WalletAddress::parse("  0xabcdef0123456789abcdef0123456789abcdef01\n").unwrap();
        assert_eq!(wallet.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_wallet_parse_rejects_bad_input() {
        let bad = [
            "",
            "0x",
            "abcdef0123456789abcdef0123456789abcdef0101",
            "0xabcdef0123456789abcdef0123456789abcdef0",   // too short
            "0xabcdef0123456789abcdef0123456789abcdef012", // too long
            "0xzzcdef0123456789abcdef0123456789abcdef01",  // non-hex
        ];
        for raw in bad {
            assert!(
                matches!(WalletAddress::parse(raw), Err(LedgerError::InvalidWallet(_))),
                "'{}' should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_spend_preference_from_str() {
        assert_eq!(
            SpendPreference::from_str("Transferable"),
            Some(SpendPreference::Transferable)
        );
        assert_eq!(
            SpendPreference::from_str("restricted"),
            Some(SpendPreference::Restricted)
        );
        assert_eq!(SpendPreference::from_str("auto"), Some(SpendPreference::Auto));
        assert_eq!(SpendPreference::from_str("locked"), None);
    }

    #[test]
    fn test_unlock_outcome_accessors() {
        let entry = UnlockLogEntry {
            id: "test".into(),
            wallet: "0xabcdef0123456789abcdef0123456789abcdef01".into(),
            level: 1,
            amount: 100,
            transferable_before: 500,
            transferable_after: 600,
            locked_before: 10450,
            locked_after: 10350,
            tx_hash: None,
            unlocked_at: 0,
        };

        let applied = UnlockOutcome::Applied(entry.clone());
        assert!(applied.is_applied());
        assert_eq!(applied.entry().amount, 100);

        let duplicate = UnlockOutcome::AlreadyUnlocked(entry);
        assert!(!duplicate.is_applied());
        assert_eq!(duplicate.entry().level, 1);
    }
}
