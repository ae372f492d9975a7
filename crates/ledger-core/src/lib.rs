//! ============================================================================
//! LEDGER-CORE: Beehive BCC Balance Unlock Ledger
//! ============================================================================
//! This crate owns the BCC token bookkeeping for the Beehive membership
//! platform:
//! - Per-wallet balance records (transferable / restricted / locked pools)
//! - The authoritative 19-level membership config table
//! - The unlock operation moving BCC from locked to transferable on each
//!   NFT level purchase, with an append-only audit log
//! - Reconciliation checks over the stored state
//! ============================================================================

pub mod db;
pub mod ledger;
pub mod levels;
pub mod reconcile;
pub mod types;

// Re-export main types for convenience
pub use db::{BalanceRecord, LedgerDb, LedgerStats, UnlockLogEntry};
pub use ledger::BalanceLedger;
pub use levels::{ActivationPhase, LevelConfig, MAX_LEVEL};
pub use reconcile::{audit_all, audit_wallet, AuditFinding, AuditReport};
pub use types::{
    ActivationReceipt, BalanceBreakdown, LedgerError, MembershipPurchase, SpendBucket,
    SpendPreference, SpendReceipt, UnlockOutcome, WalletAddress,
};
