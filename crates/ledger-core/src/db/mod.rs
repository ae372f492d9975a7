// ============================================================================
// LedgerDb — Embedded Database (redb)
// ============================================================================
// Persistent storage for balance records and the append-only unlock log.
// Default path: ~/.beehive/ledger.redb (override via BEEHIVE_DB_PATH env var)
//
// Every mutating operation runs its checks and both row writes inside a
// single write transaction, so the balance update and the log append commit
// or abort together and concurrent writers serialize on the store.
// ============================================================================

pub mod types;

pub use types::{BalanceRecord, LedgerStats, UnlockLogEntry};

use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::levels::{self, ActivationPhase, INITIAL_TRANSFERABLE_BCC};
use crate::types::{
    ActivationReceipt, LedgerError, MembershipPurchase, SpendBucket, SpendPreference, SpendReceipt,
    UnlockOutcome,
};

// Table definitions
const BALANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("balances");
const UNLOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("unlocks");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Meta key holding the last assigned activation order
const ACTIVATION_ORDER_KEY: &str = "meta:activation_order";

/// Embedded database for the Beehive BCC ledger
pub struct LedgerDb {
    db: Database,
    path: PathBuf,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses BEEHIVE_DB_PATH env var or ~/.beehive/ledger.redb
    pub fn open(path: Option<&str>) -> Result<Self, LedgerError> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("BEEHIVE_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir()
                .ok_or_else(|| LedgerError::Store("Cannot determine home directory".into()))?;
            let beehive_dir = home.join(".beehive");
            std::fs::create_dir_all(&beehive_dir).map_err(|e| {
                LedgerError::Store(format!("Failed to create .beehive directory: {}", e))
            })?;
            beehive_dir.join("ledger.redb")
        };

        info!("Opening ledger database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| LedgerError::Store(format!("Failed to open database: {}", e)))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| LedgerError::Store(format!("Failed to begin write: {}", e)))?;
        {
            let _ = write_txn
                .open_table(BALANCES)
                .map_err(|e| LedgerError::Store(format!("Failed to create balances table: {}", e)))?;
            let _ = write_txn
                .open_table(UNLOCKS)
                .map_err(|e| LedgerError::Store(format!("Failed to create unlocks table: {}", e)))?;
            let _ = write_txn
                .open_table(META)
                .map_err(|e| LedgerError::Store(format!("Failed to create meta table: {}", e)))?;
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Store(format!("Failed to commit init: {}", e)))?;

        info!("Ledger database ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log key for a (wallet, level) unlock. Zero-padding the level keeps a
    /// wallet's history range scan in level order.
    fn unlock_key(wallet: &str, level: u8) -> String {
        format!("{}:{:02}", wallet, level)
    }

    // ========================================================================
    // Balance Reads
    // ========================================================================

    pub fn get_balance(&self, wallet: &str) -> Result<Option<BalanceRecord>, LedgerError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LedgerError::Store(format!("Failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(BALANCES)
            .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;

        match table
            .get(wallet)
            .map_err(|e| LedgerError::Store(format!("Failed to get balance: {}", e)))?
        {
            Some(value) => {
                let record: BalanceRecord = bincode::deserialize(value.value()).map_err(|e| {
                    LedgerError::Store(format!("Failed to deserialize balance: {}", e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_balances(&self) -> Result<Vec<BalanceRecord>, LedgerError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LedgerError::Store(format!("Failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(BALANCES)
            .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| LedgerError::Store(format!("Failed to iterate balances: {}", e)))?;
        for entry in iter {
            let (_key, value) =
                entry.map_err(|e| LedgerError::Store(format!("Failed to read entry: {}", e)))?;
            let record: BalanceRecord = bincode::deserialize(value.value())
                .map_err(|e| LedgerError::Store(format!("Failed to deserialize balance: {}", e)))?;
            results.push(record);
        }
        Ok(results)
    }

    // ========================================================================
    // Unlock Log Reads
    // ========================================================================

    pub fn get_unlock(&self, wallet: &str, level: u8) -> Result<Option<UnlockLogEntry>, LedgerError> {
        let key = Self::unlock_key(wallet, level);

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LedgerError::Store(format!("Failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(UNLOCKS)
            .map_err(|e| LedgerError::Store(format!("Failed to open unlocks table: {}", e)))?;

        match table
            .get(key.as_str())
            .map_err(|e| LedgerError::Store(format!("Failed to get unlock entry: {}", e)))?
        {
            Some(value) => {
                let log_entry: UnlockLogEntry = bincode::deserialize(value.value()).map_err(|e| {
                    LedgerError::Store(format!("Failed to deserialize unlock entry: {}", e))
                })?;
                Ok(Some(log_entry))
            }
            None => Ok(None),
        }
    }

    /// List a wallet's unlock log entries in level order.
    pub fn list_unlocks(&self, wallet: &str) -> Result<Vec<UnlockLogEntry>, LedgerError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LedgerError::Store(format!("Failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(UNLOCKS)
            .map_err(|e| LedgerError::Store(format!("Failed to open unlocks table: {}", e)))?;

        // ';' is ':' + 1, so this range covers exactly the wallet's prefix
        let start = format!("{}:", wallet);
        let end = format!("{};", wallet);

        let mut results = Vec::new();
        let iter = table
            .range(start.as_str()..end.as_str())
            .map_err(|e| LedgerError::Store(format!("Failed to iterate unlocks: {}", e)))?;
        for entry in iter {
            let (_key, value) =
                entry.map_err(|e| LedgerError::Store(format!("Failed to read entry: {}", e)))?;
            let log_entry: UnlockLogEntry = bincode::deserialize(value.value()).map_err(|e| {
                LedgerError::Store(format!("Failed to deserialize unlock entry: {}", e))
            })?;
            results.push(log_entry);
        }
        Ok(results)
    }

    pub fn list_all_unlocks(&self) -> Result<Vec<UnlockLogEntry>, LedgerError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LedgerError::Store(format!("Failed to begin read: {}", e)))?;
        let table = read_txn
            .open_table(UNLOCKS)
            .map_err(|e| LedgerError::Store(format!("Failed to open unlocks table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| LedgerError::Store(format!("Failed to iterate unlocks: {}", e)))?;
        for entry in iter {
            let (_key, value) =
                entry.map_err(|e| LedgerError::Store(format!("Failed to read entry: {}", e)))?;
            let log_entry: UnlockLogEntry = bincode::deserialize(value.value()).map_err(|e| {
                LedgerError::Store(format!("Failed to deserialize unlock entry: {}", e))
            })?;
            results.push(log_entry);
        }
        Ok(results)
    }

    // ========================================================================
    // Membership Activation
    // ========================================================================

    /// Create the wallet's balance record and apply its Level 1 unlock, all
    /// in one transaction: activation-order assignment, pool seeding, the
    /// balance delta, and the log append commit together or not at all.
    pub fn apply_activation(
        &self,
        purchase: &MembershipPurchase,
    ) -> Result<ActivationReceipt, LedgerError> {
        let wallet = purchase.wallet.as_str();

        if purchase.level != 1 {
            return Err(LedgerError::NonSequentialUpgrade {
                wallet: wallet.to_string(),
                current: 0,
                requested: purchase.level,
            });
        }

        let now = chrono::Utc::now().timestamp();
        let receipt;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LedgerError::Store(format!("Failed to begin write: {}", e)))?;
        {
            let mut balances = write_txn
                .open_table(BALANCES)
                .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;
            let mut unlocks = write_txn
                .open_table(UNLOCKS)
                .map_err(|e| LedgerError::Store(format!("Failed to open unlocks table: {}", e)))?;
            let mut meta = write_txn
                .open_table(META)
                .map_err(|e| LedgerError::Store(format!("Failed to open meta table: {}", e)))?;

            let exists = balances
                .get(wallet)
                .map_err(|e| LedgerError::Store(format!("Failed to get balance: {}", e)))?
                .is_some();
            if exists {
                return Err(LedgerError::AlreadyActivated(wallet.to_string()));
            }

            let activation_order = meta
                .get(ACTIVATION_ORDER_KEY)
                .map_err(|e| LedgerError::Store(format!("Failed to get activation order: {}", e)))?
                .map(|v| v.value())
                .unwrap_or(0)
                + 1;
            meta.insert(ACTIVATION_ORDER_KEY, activation_order)
                .map_err(|e| LedgerError::Store(format!("Failed to bump activation order: {}", e)))?;

            let phase = ActivationPhase::from_activation_order(activation_order);
            let seeded_locked = levels::total_locked(phase);
            let unlock = levels::unlock_amount(1, phase)
                .ok_or(LedgerError::LevelNotFound(1))?;

            let mut record = BalanceRecord {
                wallet: wallet.to_string(),
                transferable: INITIAL_TRANSFERABLE_BCC,
                restricted: 0,
                locked: seeded_locked,
                current_level: 0,
                activation_order,
                activation_phase: phase,
                created_at: now,
                last_updated: now,
            };

            let log_entry = UnlockLogEntry {
                id: Uuid::new_v4().to_string(),
                wallet: wallet.to_string(),
                level: 1,
                amount: unlock,
                transferable_before: record.transferable,
                transferable_after: record.transferable + unlock,
                locked_before: record.locked,
                locked_after: record.locked - unlock,
                tx_hash: purchase.tx_hash.clone(),
                unlocked_at: now,
            };

            record.transferable += unlock;
            record.locked -= unlock;
            record.current_level = 1;

            let balance_bytes = bincode::serialize(&record)
                .map_err(|e| LedgerError::Store(format!("Failed to serialize balance: {}", e)))?;
            balances
                .insert(wallet, balance_bytes.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert balance: {}", e)))?;

            let entry_bytes = bincode::serialize(&log_entry)
                .map_err(|e| LedgerError::Store(format!("Failed to serialize unlock entry: {}", e)))?;
            let key = Self::unlock_key(wallet, 1);
            unlocks
                .insert(key.as_str(), entry_bytes.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert unlock entry: {}", e)))?;

            receipt = ActivationReceipt {
                wallet: wallet.to_string(),
                activation_order,
                activation_phase: phase,
                seeded_transferable: INITIAL_TRANSFERABLE_BCC,
                seeded_locked,
                unlock: log_entry,
            };
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Store(format!("Failed to commit activation: {}", e)))?;

        debug!(
            "Activated {} (order {}, phase {:?})",
            wallet, receipt.activation_order, receipt.activation_phase
        );
        Ok(receipt)
    }

    // ========================================================================
    // Unlock Operation
    // ========================================================================

    /// Move the level's unlock amount from locked to transferable and append
    /// the log entry. A duplicate (wallet, level) delivery finds its key
    /// already in the unlock log and resolves to an idempotent no-op.
    pub fn apply_unlock(&self, purchase: &MembershipPurchase) -> Result<UnlockOutcome, LedgerError> {
        let wallet = purchase.wallet.as_str();
        let level = purchase.level;

        if !levels::validate_level(level) {
            return Err(LedgerError::LevelNotFound(level));
        }

        let now = chrono::Utc::now().timestamp();
        let applied_entry;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LedgerError::Store(format!("Failed to begin write: {}", e)))?;
        {
            let mut balances = write_txn
                .open_table(BALANCES)
                .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;
            let mut unlocks = write_txn
                .open_table(UNLOCKS)
                .map_err(|e| LedgerError::Store(format!("Failed to open unlocks table: {}", e)))?;

            let mut record = match balances
                .get(wallet)
                .map_err(|e| LedgerError::Store(format!("Failed to get balance: {}", e)))?
            {
                Some(value) => bincode::deserialize::<BalanceRecord>(value.value()).map_err(|e| {
                    LedgerError::Store(format!("Failed to deserialize balance: {}", e))
                })?,
                None => return Err(LedgerError::BalanceNotFound(wallet.to_string())),
            };

            if level <= record.current_level {
                // Duplicate delivery: report the original entry, change nothing
                let key = Self::unlock_key(wallet, level);
                let existing = match unlocks
                    .get(key.as_str())
                    .map_err(|e| LedgerError::Store(format!("Failed to get unlock entry: {}", e)))?
                {
                    Some(value) => {
                        bincode::deserialize::<UnlockLogEntry>(value.value()).map_err(|e| {
                            LedgerError::Store(format!("Failed to deserialize unlock entry: {}", e))
                        })?
                    }
                    None => {
                        warn!(
                            "Unlock log entry missing for {} level {}; run `beehive-db audit`",
                            wallet, level
                        );
                        return Err(LedgerError::Store(format!(
                            "Unlock log entry missing for already-unlocked level {} of {}",
                            level, wallet
                        )));
                    }
                };
                debug!("Duplicate unlock for {} level {} — no-op", wallet, level);
                return Ok(UnlockOutcome::AlreadyUnlocked(existing));
            }

            if level != record.current_level + 1 {
                return Err(LedgerError::NonSequentialUpgrade {
                    wallet: wallet.to_string(),
                    current: record.current_level,
                    requested: level,
                });
            }

            let amount = levels::unlock_amount(level, record.activation_phase)
                .ok_or(LedgerError::LevelNotFound(level))?;

            if record.locked < amount {
                return Err(LedgerError::InsufficientLocked {
                    needed: amount,
                    available: record.locked,
                });
            }

            let log_entry = UnlockLogEntry {
                id: Uuid::new_v4().to_string(),
                wallet: wallet.to_string(),
                level,
                amount,
                transferable_before: record.transferable,
                transferable_after: record.transferable + amount,
                locked_before: record.locked,
                locked_after: record.locked - amount,
                tx_hash: purchase.tx_hash.clone(),
                unlocked_at: now,
            };

            record.transferable += amount;
            record.locked -= amount;
            record.current_level = level;
            record.last_updated = now;

            let balance_bytes = bincode::serialize(&record)
                .map_err(|e| LedgerError::Store(format!("Failed to serialize balance: {}", e)))?;
            balances
                .insert(wallet, balance_bytes.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert balance: {}", e)))?;

            let entry_bytes = bincode::serialize(&log_entry)
                .map_err(|e| LedgerError::Store(format!("Failed to serialize unlock entry: {}", e)))?;
            let key = Self::unlock_key(wallet, level);
            unlocks
                .insert(key.as_str(), entry_bytes.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert unlock entry: {}", e)))?;

            applied_entry = log_entry;
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Store(format!("Failed to commit unlock: {}", e)))?;

        debug!(
            "Unlocked {} BCC for {} at level {}",
            applied_entry.amount, wallet, level
        );
        Ok(UnlockOutcome::Applied(applied_entry))
    }

    // ========================================================================
    // Spend / Credit Operations
    // ========================================================================

    /// Deduct a spend from the wallet's transferable/restricted pools
    /// according to the bucket preference. Never touches locked.
    pub fn apply_spend(
        &self,
        wallet: &str,
        amount: u64,
        preference: SpendPreference,
    ) -> Result<SpendReceipt, LedgerError> {
        let now = chrono::Utc::now().timestamp();
        let receipt;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LedgerError::Store(format!("Failed to begin write: {}", e)))?;
        {
            let mut balances = write_txn
                .open_table(BALANCES)
                .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;

            let mut record = match balances
                .get(wallet)
                .map_err(|e| LedgerError::Store(format!("Failed to get balance: {}", e)))?
            {
                Some(value) => bincode::deserialize::<BalanceRecord>(value.value()).map_err(|e| {
                    LedgerError::Store(format!("Failed to deserialize balance: {}", e))
                })?,
                None => return Err(LedgerError::BalanceNotFound(wallet.to_string())),
            };

            let (transferable_used, restricted_used) = match preference {
                SpendPreference::Transferable => {
                    if record.transferable < amount {
                        return Err(LedgerError::InsufficientBalance {
                            bucket: "transferable",
                            needed: amount,
                            available: record.transferable,
                        });
                    }
                    (amount, 0)
                }
                SpendPreference::Restricted => {
                    if record.restricted < amount {
                        return Err(LedgerError::InsufficientBalance {
                            bucket: "restricted",
                            needed: amount,
                            available: record.restricted,
                        });
                    }
                    (0, amount)
                }
                SpendPreference::Auto => {
                    // Transferable first, remainder from restricted
                    if record.transferable >= amount {
                        (amount, 0)
                    } else if record.transferable + record.restricted >= amount {
                        (record.transferable, amount - record.transferable)
                    } else {
                        return Err(LedgerError::InsufficientBalance {
                            bucket: "bcc",
                            needed: amount,
                            available: record.transferable + record.restricted,
                        });
                    }
                }
            };

            record.transferable -= transferable_used;
            record.restricted -= restricted_used;
            record.last_updated = now;

            let balance_bytes = bincode::serialize(&record)
                .map_err(|e| LedgerError::Store(format!("Failed to serialize balance: {}", e)))?;
            balances
                .insert(wallet, balance_bytes.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert balance: {}", e)))?;

            let bucket_used = if transferable_used > 0 && restricted_used > 0 {
                SpendBucket::Mixed
            } else if restricted_used > 0 {
                SpendBucket::Restricted
            } else {
                SpendBucket::Transferable
            };

            receipt = SpendReceipt {
                wallet: wallet.to_string(),
                amount,
                bucket_used,
                transferable_used,
                restricted_used,
            };
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Store(format!("Failed to commit spend: {}", e)))?;

        debug!(
            "Spent {} BCC from {} bucket(s) by {}",
            amount,
            receipt.bucket_used.as_str(),
            wallet
        );
        Ok(receipt)
    }

    /// Credit a layer-reward payout into the restricted pool.
    pub fn apply_restricted_credit(
        &self,
        wallet: &str,
        amount: u64,
    ) -> Result<BalanceRecord, LedgerError> {
        let now = chrono::Utc::now().timestamp();
        let updated;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LedgerError::Store(format!("Failed to begin write: {}", e)))?;
        {
            let mut balances = write_txn
                .open_table(BALANCES)
                .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;

            let mut record = match balances
                .get(wallet)
                .map_err(|e| LedgerError::Store(format!("Failed to get balance: {}", e)))?
            {
                Some(value) => bincode::deserialize::<BalanceRecord>(value.value()).map_err(|e| {
                    LedgerError::Store(format!("Failed to deserialize balance: {}", e))
                })?,
                None => return Err(LedgerError::BalanceNotFound(wallet.to_string())),
            };

            record.restricted += amount;
            record.last_updated = now;

            let balance_bytes = bincode::serialize(&record)
                .map_err(|e| LedgerError::Store(format!("Failed to serialize balance: {}", e)))?;
            balances
                .insert(wallet, balance_bytes.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert balance: {}", e)))?;

            updated = record;
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Store(format!("Failed to commit credit: {}", e)))?;

        debug!("Credited {} restricted BCC to {}", amount, wallet);
        Ok(updated)
    }

    /// Raw balance upsert, bypassing every guard. Crate-internal: exists so
    /// tests and audit fixtures can stage inconsistent states.
    pub(crate) fn put_balance_raw(&self, record: &BalanceRecord) -> Result<(), LedgerError> {
        let value = bincode::serialize(record)
            .map_err(|e| LedgerError::Store(format!("Failed to serialize balance: {}", e)))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LedgerError::Store(format!("Failed to begin write: {}", e)))?;
        {
            let mut table = write_txn
                .open_table(BALANCES)
                .map_err(|e| LedgerError::Store(format!("Failed to open balances table: {}", e)))?;
            table
                .insert(record.wallet.as_str(), value.as_slice())
                .map_err(|e| LedgerError::Store(format!("Failed to insert balance: {}", e)))?;
        }
        write_txn
            .commit()
            .map_err(|e| LedgerError::Store(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let balances = self.list_balances()?;
        let unlocks = self.list_all_unlocks()?;

        let mut unlocks_per_level = HashMap::new();
        for entry in &unlocks {
            *unlocks_per_level.entry(entry.level).or_insert(0usize) += 1;
        }

        Ok(LedgerStats {
            total_wallets: balances.len(),
            total_unlocks: unlocks.len(),
            unlocks_per_level,
            total_transferable: balances.iter().map(|b| b.transferable).sum(),
            total_restricted: balances.iter().map(|b| b.restricted).sum(),
            total_locked: balances.iter().map(|b| b.locked).sum(),
        })
    }
}
