//! ============================================================================
//! Reconciliation - Ledger consistency checks
//! ============================================================================
//! Recomputes what each wallet's pools and unlock log should look like from
//! the level table and flags divergence. The locked pool only ever moves
//! through the unlock operation, so it is fully determined by the wallet's
//! phase-scaled seed minus the logged unlock amounts.
//! ============================================================================

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::db::{BalanceRecord, LedgerDb, UnlockLogEntry};
use crate::levels;
use crate::types::LedgerError;

/// A single consistency violation found during an audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuditFinding {
    /// Stored locked pool differs from seed minus logged unlocks
    LockedMismatch {
        wallet: String,
        expected: u64,
        actual: u64,
    },
    /// A level at or below current_level has no log entry
    MissingLogEntry { wallet: String, level: u8 },
    /// A log entry exists above the wallet's current level
    UnexpectedLogEntry { wallet: String, level: u8 },
    /// A log entry's amount is not the phase-scaled amount for its level
    AmountMismatch {
        wallet: String,
        level: u8,
        expected: u64,
        actual: u64,
    },
    /// A log entry's before/after pairs don't add up
    InconsistentEntry {
        wallet: String,
        level: u8,
        detail: String,
    },
    /// Consecutive log entries don't chain on the locked pool
    BrokenChain { wallet: String, level: u8 },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::LockedMismatch {
                wallet,
                expected,
                actual,
            } => write!(
                f,
                "{}: locked pool is {} BCC, expected {} BCC",
                wallet, actual, expected
            ),
            AuditFinding::MissingLogEntry { wallet, level } => {
                write!(f, "{}: no unlock log entry for level {}", wallet, level)
            }
            AuditFinding::UnexpectedLogEntry { wallet, level } => write!(
                f,
                "{}: unlock log entry for level {} above current level",
                wallet, level
            ),
            AuditFinding::AmountMismatch {
                wallet,
                level,
                expected,
                actual,
            } => write!(
                f,
                "{}: level {} unlocked {} BCC, expected {} BCC",
                wallet, level, actual, expected
            ),
            AuditFinding::InconsistentEntry {
                wallet,
                level,
                detail,
            } => write!(f, "{}: level {} entry inconsistent: {}", wallet, level, detail),
            AuditFinding::BrokenChain { wallet, level } => write!(
                f,
                "{}: locked pool does not chain into the level {} entry",
                wallet, level
            ),
        }
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub wallets_checked: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Audit a single wallet.
pub fn audit_wallet(db: &LedgerDb, wallet: &str) -> Result<AuditReport, LedgerError> {
    let record = db
        .get_balance(wallet)?
        .ok_or_else(|| LedgerError::BalanceNotFound(wallet.to_string()))?;
    let entries = db.list_unlocks(wallet)?;

    let findings = check_wallet(&record, &entries);
    if findings.is_empty() {
        debug!("Audit clean for {}", wallet);
    } else {
        warn!("Audit found {} issue(s) for {}", findings.len(), wallet);
    }

    Ok(AuditReport {
        wallets_checked: 1,
        findings,
    })
}

/// Audit every wallet in the ledger.
pub fn audit_all(db: &LedgerDb) -> Result<AuditReport, LedgerError> {
    let balances = db.list_balances()?;
    let mut findings = Vec::new();

    for record in &balances {
        let entries = db.list_unlocks(&record.wallet)?;
        findings.extend(check_wallet(record, &entries));
    }

    if findings.is_empty() {
        debug!("Audit clean across {} wallet(s)", balances.len());
    } else {
        warn!(
            "Audit found {} issue(s) across {} wallet(s)",
            findings.len(),
            balances.len()
        );
    }

    Ok(AuditReport {
        wallets_checked: balances.len(),
        findings,
    })
}

fn check_wallet(record: &BalanceRecord, entries: &[UnlockLogEntry]) -> Vec<AuditFinding> {
    let mut findings = Vec::new();
    let wallet = &record.wallet;
    let phase = record.activation_phase;

    // Every level up to current_level must be logged exactly once
    for level in 1..=record.current_level {
        if !entries.iter().any(|e| e.level == level) {
            findings.push(AuditFinding::MissingLogEntry {
                wallet: wallet.clone(),
                level,
            });
        }
    }
    for entry in entries {
        if entry.level > record.current_level {
            findings.push(AuditFinding::UnexpectedLogEntry {
                wallet: wallet.clone(),
                level: entry.level,
            });
        }
    }

    // Per-entry checks: phase-scaled amount and internal before/after math
    for entry in entries {
        if let Some(expected) = levels::unlock_amount(entry.level, phase) {
            if entry.amount != expected {
                findings.push(AuditFinding::AmountMismatch {
                    wallet: wallet.clone(),
                    level: entry.level,
                    expected,
                    actual: entry.amount,
                });
            }
        }
        if entry.locked_before != entry.locked_after + entry.amount {
            findings.push(AuditFinding::InconsistentEntry {
                wallet: wallet.clone(),
                level: entry.level,
                detail: format!(
                    "locked {} -> {} does not match amount {}",
                    entry.locked_before, entry.locked_after, entry.amount
                ),
            });
        }
        if entry.transferable_before + entry.amount != entry.transferable_after {
            findings.push(AuditFinding::InconsistentEntry {
                wallet: wallet.clone(),
                level: entry.level,
                detail: format!(
                    "transferable {} -> {} does not match amount {}",
                    entry.transferable_before, entry.transferable_after, entry.amount
                ),
            });
        }
    }

    // The locked pool must chain entry to entry, starting from the seed
    if let Some(first) = entries.first() {
        if first.locked_before != levels::total_locked(phase) {
            findings.push(AuditFinding::BrokenChain {
                wallet: wallet.clone(),
                level: first.level,
            });
        }
    }
    for pair in entries.windows(2) {
        if pair[0].locked_after != pair[1].locked_before {
            findings.push(AuditFinding::BrokenChain {
                wallet: wallet.clone(),
                level: pair[1].level,
            });
        }
    }

    // Stored locked pool must equal seed minus everything logged
    let unlocked_total: u64 = entries.iter().map(|e| e.amount).sum();
    let expected_locked = levels::total_locked(phase).saturating_sub(unlocked_total);
    if record.locked != expected_locked {
        findings.push(AuditFinding::LockedMismatch {
            wallet: wallet.clone(),
            expected: expected_locked,
            actual: record.locked,
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{temp_db, wallet};
    use crate::types::MembershipPurchase;

    fn purchase(n: u8, level: u8) -> MembershipPurchase {
        MembershipPurchase {
            wallet: wallet(n),
            level,
            tx_hash: None,
        }
    }

    #[test]
    fn test_clean_wallet_has_no_findings() {
        let db = temp_db();
        db.apply_activation(&purchase(1, 1)).unwrap();
        for level in 2..=5 {
            db.apply_unlock(&purchase(1, level)).unwrap();
        }

        let report = audit_wallet(&db, wallet(1).as_str()).unwrap();
        assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
        assert_eq!(report.wallets_checked, 1);
    }

    #[test]
    fn test_corrupted_locked_pool_is_flagged() {
        let db = temp_db();
        db.apply_activation(&purchase(1, 1)).unwrap();

        let mut record = db.get_balance(wallet(1).as_str()).unwrap().unwrap();
        record.locked += 77;
        db.put_balance_raw(&record).unwrap();

        let report = audit_wallet(&db, wallet(1).as_str()).unwrap();
        assert_eq!(
            report.findings,
            vec![AuditFinding::LockedMismatch {
                wallet: wallet(1).as_str().to_string(),
                expected: 10_350,
                actual: 10_427,
            }]
        );
    }

    #[test]
    fn test_level_bump_without_log_entry_is_flagged() {
        let db = temp_db();
        db.apply_activation(&purchase(1, 1)).unwrap();

        let mut record = db.get_balance(wallet(1).as_str()).unwrap().unwrap();
        record.current_level = 3;
        db.put_balance_raw(&record).unwrap();

        let report = audit_wallet(&db, wallet(1).as_str()).unwrap();
        assert!(report.findings.contains(&AuditFinding::MissingLogEntry {
            wallet: wallet(1).as_str().to_string(),
            level: 2,
        }));
        assert!(report.findings.contains(&AuditFinding::MissingLogEntry {
            wallet: wallet(1).as_str().to_string(),
            level: 3,
        }));
    }

    #[test]
    fn test_audit_all_covers_every_wallet() {
        let db = temp_db();
        db.apply_activation(&purchase(1, 1)).unwrap();
        db.apply_activation(&purchase(2, 1)).unwrap();

        let mut record = db.get_balance(wallet(2).as_str()).unwrap().unwrap();
        record.locked = 1;
        db.put_balance_raw(&record).unwrap();

        let report = audit_all(&db).unwrap();
        assert_eq!(report.wallets_checked, 2);
        assert_eq!(report.findings.len(), 1);
        assert!(matches!(
            report.findings[0],
            AuditFinding::LockedMismatch { .. }
        ));
    }

    #[test]
    fn test_audit_unknown_wallet() {
        let db = temp_db();
        let err = audit_wallet(&db, wallet(9).as_str()).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceNotFound(_)));
    }

    #[test]
    fn test_finding_display_messages() {
        let finding = AuditFinding::LockedMismatch {
            wallet: "0xabc".into(),
            expected: 100,
            actual: 50,
        };
        assert_eq!(
            finding.to_string(),
            "0xabc: locked pool is 50 BCC, expected 100 BCC"
        );

        let finding = AuditFinding::MissingLogEntry {
            wallet: "0xabc".into(),
            level: 4,
        };
        assert_eq!(finding.to_string(), "0xabc: no unlock log entry for level 4");
    }
}
