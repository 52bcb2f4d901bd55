// ⚖️ Conflict Resolver - one authoritative balance per natural key
//
// Every balance creation goes through resolve_create. If storage already
// holds one or more records for the candidate's (employee, leave type, year)
// key - a race window or a prior bug can leave several - they are folded into
// the earliest record under the merge policy, the superseded rows are
// deleted, and the candidate's values are reconciled on top. The whole
// resolution runs in a single transaction: merge and deletions land together
// or not at all.

use crate::balance::{LeaveBalance, MergePolicy};
use crate::error::{BalanceError, Result};
use crate::store::{self, BalanceStore};
use tracing::{debug, warn};

pub struct ConflictResolver {
    pub policy: MergePolicy,
}

impl ConflictResolver {
    /// Resolver with the default loss-free policy (sum usage and allocation,
    /// max carry-over)
    pub fn new() -> Self {
        ConflictResolver {
            policy: MergePolicy::new(),
        }
    }

    pub fn with_policy(policy: MergePolicy) -> Self {
        ConflictResolver { policy }
    }

    /// Create a balance, reconciling against anything already stored under
    /// the same natural key. Returns the surviving authoritative record.
    pub fn resolve_create(
        &self,
        store: &mut BalanceStore,
        candidate: LeaveBalance,
    ) -> Result<LeaveBalance> {
        candidate.validate()?;
        let (employee_id, leave_type_id, year) = candidate.natural_key();

        let tx = store.conn.transaction()?;

        let existing = store::fetch_all_by_key(&tx, employee_id, leave_type_id, year)?;

        let resolved = match existing.len() {
            // No record for this key: plain insert
            0 => {
                let mut fresh = candidate;
                store::insert_row(&tx, &mut fresh)?;
                debug!(
                    id = fresh.id,
                    employee = employee_id,
                    leave_type = leave_type_id,
                    year,
                    "no conflict, inserted directly"
                );
                fresh
            }

            // Exactly one: merge the candidate into it under its identity
            1 => {
                let mut merged = existing[0].merged_with(&candidate, &self.policy);
                self.persist_survivor(&tx, &mut merged)?;
                merged
            }

            // Duplicates found: fold them into the earliest record, delete
            // the superseded rows, then apply the candidate on top
            _ => {
                warn!(
                    employee = employee_id,
                    leave_type = leave_type_id,
                    year,
                    duplicates = existing.len() - 1,
                    "duplicate balances found, merging"
                );

                let mut merged = existing[0].clone();
                for duplicate in &existing[1..] {
                    merged = merged.merged_with(duplicate, &self.policy);
                    let affected = store::delete_row(&tx, duplicate.id)?;
                    if affected == 0 {
                        return Err(BalanceError::ConflictResolution(format!(
                            "duplicate balance id {} vanished mid-merge",
                            duplicate.id
                        )));
                    }
                }

                merged = merged.merged_with(&candidate, &self.policy);
                self.persist_survivor(&tx, &mut merged)?;
                merged
            }
        };

        tx.commit()?;
        Ok(resolved)
    }

    fn persist_survivor(
        &self,
        conn: &rusqlite::Connection,
        merged: &mut LeaveBalance,
    ) -> Result<()> {
        merged.validate().map_err(|e| {
            BalanceError::ConflictResolution(format!("merged balance is invalid: {e}"))
        })?;
        let affected = store::update_row(conn, merged)?;
        if affected == 0 {
            return Err(BalanceError::ConflictResolution(format!(
                "surviving balance id {} vanished mid-merge",
                merged.id
            )));
        }
        debug!(id = merged.id, "persisted merged balance");
        Ok(())
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> BalanceStore {
        BalanceStore::open_in_memory().unwrap()
    }

    fn stored_balance(
        store: &BalanceStore,
        employee: i64,
        leave_type: i64,
        year: i32,
        total: f64,
        used: f64,
    ) -> LeaveBalance {
        let mut b = LeaveBalance::new(employee, leave_type, year, total);
        b.used_days = used;
        b.recompute_remaining();
        store.create(&mut b).unwrap();
        b
    }

    #[test]
    fn test_create_without_conflict_inserts_directly() {
        let mut store = test_store();
        let resolver = ConflictResolver::new();

        let created = resolver
            .resolve_create(&mut store, LeaveBalance::new(7, 2, 2024, 20.0))
            .unwrap();

        assert!(created.is_persisted());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(created.total_days, 20.0);
    }

    #[test]
    fn test_create_merges_into_single_existing_record() {
        let mut store = test_store();
        let resolver = ConflictResolver::new();
        let existing = stored_balance(&store, 7, 2, 2024, 10.0, 3.0);

        let mut candidate = LeaveBalance::new(7, 2, 2024, 10.0);
        candidate.used_days = 2.0;
        candidate.recompute_remaining();

        let merged = resolver.resolve_create(&mut store, candidate).unwrap();

        assert_eq!(merged.id, existing.id, "existing identity survives");
        assert_eq!(store.count().unwrap(), 1, "no second record created");
        assert_eq!(merged.total_days, 20.0);
        assert_eq!(merged.used_days, 5.0);
        assert_eq!(
            merged.remaining_days,
            merged.total_days + merged.carry_over_days - merged.used_days
        );
    }

    #[test]
    fn test_duplicates_are_folded_and_deleted() {
        let mut store = test_store();
        let resolver = ConflictResolver::new();

        // Two duplicate records for key (7, 2, 2024): used {3, 5}, total {10, 10}
        let first = stored_balance(&store, 7, 2, 2024, 10.0, 3.0);
        let second = stored_balance(&store, 7, 2, 2024, 10.0, 5.0);
        assert_eq!(store.count().unwrap(), 2);

        let candidate = LeaveBalance::new(7, 2, 2024, 0.0);
        let merged = resolver.resolve_create(&mut store, candidate).unwrap();

        // Exactly one record remains, under the original identity
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(merged.id, first.id);
        assert!(store.find_by_id(second.id).unwrap().is_none(), "duplicate deleted");

        // Loss-free combination and invariant-consistent remaining
        let survivor = store.find_by_key(7, 2, 2024).unwrap().unwrap();
        assert_eq!(survivor.used_days, 8.0);
        assert_eq!(survivor.total_days, 20.0);
        assert_eq!(
            survivor.remaining_days,
            survivor.total_days + survivor.carry_over_days - survivor.used_days
        );
    }

    #[test]
    fn test_fold_takes_max_carry_over() {
        let mut store = test_store();
        let resolver = ConflictResolver::new();

        let mut a = LeaveBalance::new(3, 1, 2024, 10.0);
        a.carry_over_days = 2.0;
        a.recompute_remaining();
        store.create(&mut a).unwrap();

        let mut b = LeaveBalance::new(3, 1, 2024, 10.0);
        b.carry_over_days = 5.0;
        b.recompute_remaining();
        store.create(&mut b).unwrap();

        let merged = resolver
            .resolve_create(&mut store, LeaveBalance::new(3, 1, 2024, 0.0))
            .unwrap();

        assert_eq!(merged.carry_over_days, 5.0);
        assert_eq!(merged.remaining_days, 25.0);
    }

    #[test]
    fn test_latest_wins_policy_overwrites() {
        let mut store = test_store();
        let resolver = ConflictResolver::with_policy(MergePolicy::latest_wins());
        let existing = stored_balance(&store, 9, 1, 2024, 10.0, 4.0);

        let merged = resolver
            .resolve_create(&mut store, LeaveBalance::new(9, 1, 2024, 25.0))
            .unwrap();

        assert_eq!(merged.id, existing.id);
        assert_eq!(merged.total_days, 25.0);
        assert_eq!(merged.used_days, 0.0);
        assert_eq!(merged.remaining_days, 25.0);
    }

    #[test]
    fn test_invalid_candidate_is_rejected_before_any_write() {
        let mut store = test_store();
        let resolver = ConflictResolver::new();

        let mut bad = LeaveBalance::new(1, 1, 2024, 10.0);
        bad.used_days = -2.0;

        let err = resolver.resolve_create(&mut store, bad).unwrap_err();
        assert!(matches!(err, BalanceError::Validation(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_resolution_is_atomic_when_merge_result_is_invalid() {
        let mut store = test_store();
        let resolver = ConflictResolver::new();

        // Two individually valid duplicates whose loss-free fold over-consumes:
        // summed used = 10 exceeds total 0 + max carry-over 5. The fold only
        // turns invalid after the superseded row is deleted inside the
        // transaction, so the deletion must roll back with the merge.
        for _ in 0..2 {
            let mut b = LeaveBalance::new(4, 1, 2024, 0.0);
            b.carry_over_days = 5.0;
            b.used_days = 5.0;
            b.recompute_remaining();
            store.create(&mut b).unwrap();
        }

        let err = resolver
            .resolve_create(&mut store, LeaveBalance::new(4, 1, 2024, 0.0))
            .unwrap_err();
        assert!(matches!(err, BalanceError::ConflictResolution(_)));

        // Both original duplicates still present, untouched
        let all = store.find_all_by_key(4, 1, 2024).unwrap();
        assert_eq!(all.len(), 2, "superseded duplicate must be restored");
        for b in &all {
            assert_eq!(b.used_days, 5.0);
            assert_eq!(b.carry_over_days, 5.0);
        }
    }
}
