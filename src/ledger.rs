//! Who got coffee, and for which Jobs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

#[derive(Debug, Default)]
struct LedgerState {
    served: HashSet<String>,
    last_coffee: HashMap<String, NaiveDate>,
}

/// In-memory record of decided Jobs and each owner's last coffee day.
#[derive(Debug, Default)]
pub struct CoffeeLedger {
    state: Mutex<LedgerState>,
}

impl CoffeeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // a poisoned lock only means a panic elsewhere; the maps stay usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a decision was already taken for this Job UID
    pub fn is_served(&self, uid: &str) -> bool {
        self.state().served.contains(uid)
    }

    pub fn mark_served(&self, uid: &str) {
        self.state().served.insert(uid.to_string());
    }

    /// Drop a Job UID, typically once the Job is deleted
    pub fn forget(&self, uid: &str) -> bool {
        self.state().served.remove(uid)
    }

    pub fn served_count(&self) -> usize {
        self.state().served.len()
    }

    /// Whether the owner already had a coffee on `day`
    pub fn had_coffee_on(&self, owner: &str, day: NaiveDate) -> bool {
        self.state()
            .last_coffee
            .get(owner)
            .is_some_and(|last| *last >= day)
    }

    /// Remember that the owner got a coffee on `day`. Never moves an
    /// owner's last day backwards.
    pub fn record_coffee(&self, owner: &str, day: NaiveDate) {
        let mut state = self.state();
        let last = state.last_coffee.entry(owner.to_string()).or_insert(day);
        if *last < day {
            *last = day;
        }
    }

    /// Owners whose last coffee was on `day`, sorted
    pub fn owners_served_on(&self, day: NaiveDate) -> Vec<String> {
        let mut owners: Vec<String> = self
            .state()
            .last_coffee
            .iter()
            .filter(|(_, last)| **last == day)
            .map(|(owner, _)| owner.clone())
            .collect();
        owners.sort();
        owners
    }
}
