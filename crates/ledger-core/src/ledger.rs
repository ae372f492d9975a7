//! ============================================================================
//! Balance Ledger - Unlock engine with per-wallet serialization
//! ============================================================================
//! The operation surface for the activation / level-upgrade collaborators.
//! Mutations for one wallet queue behind a per-wallet lock while distinct
//! wallets proceed in parallel; balance reads are served from a TTL cache
//! that is invalidated on every write.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::db::{LedgerDb, UnlockLogEntry};
use crate::types::{
    ActivationReceipt, BalanceBreakdown, LedgerError, MembershipPurchase, SpendPreference,
    SpendReceipt, UnlockOutcome, WalletAddress,
};

/// Default breakdown cache duration in seconds
pub const DEFAULT_CACHE_TTL_SECS: i64 = 30;

/// Maximum number of entries in the breakdown cache to prevent unbounded growth
const MAX_CACHE_SIZE: usize = 1000;

/// Cached balance breakdown
#[derive(Debug, Clone)]
struct CachedBreakdown {
    breakdown: BalanceBreakdown,
    cached_at: i64,
}

/// BCC balance ledger engine
pub struct BalanceLedger {
    db: Arc<LedgerDb>,
    wallet_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    breakdown_cache: Arc<RwLock<HashMap<String, CachedBreakdown>>>,
    cache_ttl_secs: i64,
}

impl BalanceLedger {
    /// Create a new ledger over an open database
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self::with_cache_ttl(db, DEFAULT_CACHE_TTL_SECS)
    }

    /// Create a new ledger with a custom breakdown cache TTL
    pub fn with_cache_ttl(db: Arc<LedgerDb>, cache_ttl_secs: i64) -> Self {
        Self {
            db,
            wallet_locks: Mutex::new(HashMap::new()),
            breakdown_cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl_secs,
        }
    }

    pub fn db(&self) -> &LedgerDb {
        &self.db
    }

    /// Fetch (or create) the serialization lock for a wallet
    async fn wallet_lock(&self, wallet: &str) -> Arc<Mutex<()>> {
        let mut locks = self.wallet_locks.lock().await;
        locks
            .entry(wallet.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Activate a membership: seed the balance record and apply the Level 1
    /// unlock. Fails if the wallet already has a record.
    pub async fn activate(
        &self,
        purchase: &MembershipPurchase,
    ) -> Result<ActivationReceipt, LedgerError> {
        let lock = self.wallet_lock(purchase.wallet.as_str()).await;
        let _guard = lock.lock().await;

        let receipt = self.db.apply_activation(purchase)?;
        self.invalidate_cache(purchase.wallet.as_str()).await;

        info!(
            "Activated member {} (order {}, phase {:?}): {} transferable / {} locked seeded",
            receipt.wallet,
            receipt.activation_order,
            receipt.activation_phase,
            receipt.seeded_transferable,
            receipt.seeded_locked
        );
        Ok(receipt)
    }

    /// Apply a level-upgrade purchase. Duplicate deliveries of a level that
    /// was already unlocked resolve to `UnlockOutcome::AlreadyUnlocked`.
    pub async fn upgrade(
        &self,
        purchase: &MembershipPurchase,
    ) -> Result<UnlockOutcome, LedgerError> {
        let lock = self.wallet_lock(purchase.wallet.as_str()).await;
        let _guard = lock.lock().await;

        let outcome = self.db.apply_unlock(purchase)?;
        match &outcome {
            UnlockOutcome::Applied(entry) => {
                self.invalidate_cache(purchase.wallet.as_str()).await;
                info!(
                    "Unlocked {} BCC for {} (level {})",
                    entry.amount, entry.wallet, entry.level
                );
            }
            UnlockOutcome::AlreadyUnlocked(entry) => {
                warn!(
                    "Duplicate unlock delivery for {} level {} ignored",
                    entry.wallet, entry.level
                );
            }
        }
        Ok(outcome)
    }

    /// Spend BCC from the transferable/restricted pools.
    pub async fn spend(
        &self,
        wallet: &WalletAddress,
        amount: u64,
        preference: SpendPreference,
    ) -> Result<SpendReceipt, LedgerError> {
        let lock = self.wallet_lock(wallet.as_str()).await;
        let _guard = lock.lock().await;

        let receipt = self.db.apply_spend(wallet.as_str(), amount, preference)?;
        self.invalidate_cache(wallet.as_str()).await;

        info!(
            "Spent {} BCC from {} bucket(s) by {}",
            receipt.amount,
            receipt.bucket_used.as_str(),
            receipt.wallet
        );
        Ok(receipt)
    }

    /// Credit a reward payout into the restricted pool.
    pub async fn credit_restricted(
        &self,
        wallet: &WalletAddress,
        amount: u64,
    ) -> Result<BalanceBreakdown, LedgerError> {
        let lock = self.wallet_lock(wallet.as_str()).await;
        let _guard = lock.lock().await;

        let record = self.db.apply_restricted_credit(wallet.as_str(), amount)?;
        self.invalidate_cache(wallet.as_str()).await;

        info!("Credited {} restricted BCC to {}", amount, wallet);
        Ok(BalanceBreakdown::from_record(&record))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a wallet's balance breakdown, using the cache when possible.
    /// A wallet with no record returns `BalanceNotFound` — distinct from a
    /// zero-valued breakdown.
    pub async fn balance_breakdown(
        &self,
        wallet: &WalletAddress,
    ) -> Result<BalanceBreakdown, LedgerError> {
        let wallet_str = wallet.as_str();
        let now = chrono::Utc::now().timestamp();

        // Check cache first
        {
            let cache = self.breakdown_cache.read().await;
            if let Some(cached) = cache.get(wallet_str) {
                if now - cached.cached_at < self.cache_ttl_secs {
                    debug!(
                        "Breakdown cache hit for {} (age: {}s)",
                        wallet_str,
                        now - cached.cached_at
                    );
                    return Ok(cached.breakdown.clone());
                }
            }
        }

        // Cache miss or expired - read from the store
        debug!("Breakdown cache miss for {}, reading store", wallet_str);
        let record = self
            .db
            .get_balance(wallet_str)?
            .ok_or_else(|| LedgerError::BalanceNotFound(wallet_str.to_string()))?;
        let breakdown = BalanceBreakdown::from_record(&record);

        // Update cache
        {
            let mut cache = self.breakdown_cache.write().await;
            // Evict oldest entry if cache is at capacity
            if cache.len() >= MAX_CACHE_SIZE {
                if let Some(oldest_key) = cache
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at)
                    .map(|(k, _)| k.clone())
                {
                    cache.remove(&oldest_key);
                }
            }
            cache.insert(
                wallet_str.to_string(),
                CachedBreakdown {
                    breakdown: breakdown.clone(),
                    cached_at: now,
                },
            );
        }

        Ok(breakdown)
    }

    /// Get a wallet's unlock log in level order.
    pub async fn unlock_history(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Vec<UnlockLogEntry>, LedgerError> {
        let wallet_str = wallet.as_str();
        if self.db.get_balance(wallet_str)?.is_none() {
            return Err(LedgerError::BalanceNotFound(wallet_str.to_string()));
        }
        self.db.list_unlocks(wallet_str)
    }

    // ========================================================================
    // Cache management
    // ========================================================================

    /// Invalidate the cached breakdown for a wallet (after any write)
    pub async fn invalidate_cache(&self, wallet: &str) {
        let mut cache = self.breakdown_cache.write().await;
        if cache.remove(wallet).is_some() {
            debug!("Invalidated breakdown cache for {}", wallet);
        }
    }

    /// Clear the entire breakdown cache
    pub async fn clear_cache(&self) {
        let mut cache = self.breakdown_cache.write().await;
        let count = cache.len();
        cache.clear();
        info!("Cleared {} cached breakdowns", count);
    }

    /// Get cache statistics: (total entries, still-valid entries)
    pub async fn cache_stats(&self) -> (usize, usize) {
        let cache = self.breakdown_cache.read().await;
        let now = chrono::Utc::now().timestamp();
        let total = cache.len();
        let valid = cache
            .values()
            .filter(|c| now - c.cached_at < self.cache_ttl_secs)
            .count();
        (total, valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{temp_db, wallet};
    use crate::levels::ActivationPhase;

    fn ledger() -> Arc<BalanceLedger> {
        Arc::new(BalanceLedger::new(Arc::new(temp_db())))
    }

    fn purchase(n: u8, level: u8) -> MembershipPurchase {
        MembershipPurchase {
            wallet: wallet(n),
            level,
            tx_hash: None,
        }
    }

    #[tokio::test]
    async fn test_activate_and_query() {
        let ledger = ledger();
        ledger.activate(&purchase(1, 1)).await.unwrap();

        let breakdown = ledger.balance_breakdown(&wallet(1)).await.unwrap();
        assert_eq!(breakdown.transferable, 600);
        assert_eq!(breakdown.locked, 10_350);
        assert_eq!(breakdown.total, 10_950);
        assert_eq!(breakdown.current_level, 1);
        assert_eq!(breakdown.activation_phase, ActivationPhase::Phase1);
        assert_eq!(breakdown.next_unlock_level, Some(2));
        assert_eq!(breakdown.next_unlock_amount, Some(150));
    }

    #[tokio::test]
    async fn test_query_unknown_wallet_is_not_found() {
        let ledger = ledger();
        let err = ledger.balance_breakdown(&wallet(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::BalanceNotFound(_)));

        let err = ledger.unlock_history(&wallet(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::BalanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_upgrade_invalidates_cache() {
        let ledger = ledger();
        ledger.activate(&purchase(1, 1)).await.unwrap();

        // Prime the cache, then upgrade
        let before = ledger.balance_breakdown(&wallet(1)).await.unwrap();
        assert_eq!(before.current_level, 1);

        ledger.upgrade(&purchase(1, 2)).await.unwrap();

        // A fresh read must observe the upgrade, not the cached value
        let after = ledger.balance_breakdown(&wallet(1)).await.unwrap();
        assert_eq!(after.current_level, 2);
        assert_eq!(after.transferable, before.transferable + 150);
        assert_eq!(after.total, before.total);
    }

    #[tokio::test]
    async fn test_breakdown_is_cached() {
        let ledger = ledger();
        ledger.activate(&purchase(1, 1)).await.unwrap();

        ledger.balance_breakdown(&wallet(1)).await.unwrap();
        let (total, valid) = ledger.cache_stats().await;
        assert_eq!(total, 1);
        assert_eq!(valid, 1);

        ledger.clear_cache().await;
        let (total, _) = ledger.cache_stats().await;
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_upgrades_apply_once() {
        let ledger = ledger();
        ledger.activate(&purchase(1, 1)).await.unwrap();

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.upgrade(&purchase(1, 2)).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.upgrade(&purchase(1, 2)).await })
        };

        let outcome_a = a.await.unwrap().unwrap();
        let outcome_b = b.await.unwrap().unwrap();

        // Exactly one of the two racing deliveries applies the delta
        assert!(outcome_a.is_applied() != outcome_b.is_applied());

        let breakdown = ledger.balance_breakdown(&wallet(1)).await.unwrap();
        assert_eq!(breakdown.transferable, 750);
        assert_eq!(breakdown.locked, 10_200);
        assert_eq!(
            ledger.unlock_history(&wallet(1)).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_spend_and_credit_roundtrip() {
        let ledger = ledger();
        ledger.activate(&purchase(1, 1)).await.unwrap();

        let breakdown = ledger.credit_restricted(&wallet(1), 250).await.unwrap();
        assert_eq!(breakdown.restricted, 250);

        let receipt = ledger
            .spend(&wallet(1), 700, SpendPreference::Auto)
            .await
            .unwrap();
        assert_eq!(receipt.transferable_used, 600);
        assert_eq!(receipt.restricted_used, 100);

        let after = ledger.balance_breakdown(&wallet(1)).await.unwrap();
        assert_eq!(after.transferable, 0);
        assert_eq!(after.restricted, 150);
        assert_eq!(after.locked, 10_350);
    }

    #[tokio::test]
    async fn test_distinct_wallets_do_not_share_locks() {
        let ledger = ledger();
        ledger.activate(&purchase(1, 1)).await.unwrap();
        ledger.activate(&purchase(2, 1)).await.unwrap();

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.upgrade(&purchase(1, 2)).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.upgrade(&purchase(2, 2)).await })
        };

        assert!(a.await.unwrap().unwrap().is_applied());
        assert!(b.await.unwrap().unwrap().is_applied());
    }
}
