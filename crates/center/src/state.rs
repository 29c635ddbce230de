//! The center's bookkeeping: who is alive, how many cores each has, and
//! who holds which key.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use locus_core::Key;
use locus_wire::Address;

#[derive(Debug, Default)]
pub struct CenterState {
    ncores: BTreeMap<Address, u32>,
    who_has: HashMap<Key, BTreeSet<Address>>,
    has_what: HashMap<Address, BTreeSet<Key>>,
}

impl CenterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a worker. Registering again replaces the core count and keeps
    /// whatever the worker is already known to hold.
    pub fn register(&mut self, address: Address, ncores: u32) {
        self.has_what.entry(address.clone()).or_default();
        self.ncores.insert(address, ncores);
    }

    /// Forget a worker and everything it held. Keys left without a holder
    /// are dropped.
    pub fn deregister(&mut self, address: &Address) {
        self.ncores.remove(address);
        let Some(keys) = self.has_what.remove(address) else {
            return;
        };
        for key in keys {
            if let Some(holders) = self.who_has.get_mut(&key) {
                holders.remove(address);
                if holders.is_empty() {
                    self.who_has.remove(&key);
                }
            }
        }
    }

    /// `address` now holds `keys`. Ignored for unregistered workers.
    pub fn add_keys(&mut self, address: &Address, keys: impl IntoIterator<Item = Key>) {
        let Some(held) = self.has_what.get_mut(address) else {
            return;
        };
        for key in keys {
            self.who_has
                .entry(key.clone())
                .or_default()
                .insert(address.clone());
            held.insert(key);
        }
    }

    /// `address` no longer holds `keys`. Ignored for unregistered workers.
    pub fn remove_keys<'a>(&mut self, address: &Address, keys: impl IntoIterator<Item = &'a Key>) {
        let Some(held) = self.has_what.get_mut(address) else {
            return;
        };
        for key in keys {
            held.remove(key);
            if let Some(holders) = self.who_has.get_mut(key) {
                holders.remove(address);
                if holders.is_empty() {
                    self.who_has.remove(key);
                }
            }
        }
    }

    /// Holders of each requested key (an empty set for unknown keys), or of
    /// every known key when `keys` is `None`.
    pub fn who_has(&self, keys: Option<&[Key]>) -> HashMap<Key, BTreeSet<Address>> {
        match keys {
            None => self.who_has.clone(),
            Some(keys) => keys
                .iter()
                .map(|k| (k.clone(), self.who_has.get(k).cloned().unwrap_or_default()))
                .collect(),
        }
    }

    pub fn has_what(&self, address: &Address) -> BTreeSet<Key> {
        self.has_what.get(address).cloned().unwrap_or_default()
    }

    pub fn ncores(&self) -> BTreeMap<Address, u32> {
        self.ncores.clone()
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.ncores.contains_key(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Address {
        Address::new("127.0.0.1", 8018)
    }

    fn b() -> Address {
        Address::new("127.0.0.1", 8019)
    }

    fn keys(names: &[&str]) -> Vec<Key> {
        names.iter().map(|n| Key::new(*n)).collect()
    }

    #[test]
    fn register_and_ncores() {
        let mut state = CenterState::new();
        state.register(a(), 1);
        state.register(b(), 2);
        let ncores = state.ncores();
        assert_eq!(ncores.get(&a()), Some(&1));
        assert_eq!(ncores.get(&b()), Some(&2));
    }

    #[test]
    fn reregister_replaces_cores_and_keeps_holdings() {
        let mut state = CenterState::new();
        state.register(a(), 1);
        state.add_keys(&a(), keys(&["x"]));
        state.register(a(), 4);
        assert_eq!(state.ncores().get(&a()), Some(&4));
        assert!(state.has_what(&a()).contains(&Key::new("x")));
    }

    #[test]
    fn repeated_reports_are_idempotent() {
        let mut state = CenterState::new();
        state.register(a(), 1);
        state.add_keys(&a(), keys(&["x", "x"]));
        state.add_keys(&a(), keys(&["x"]));
        let who = state.who_has(None);
        assert_eq!(who.len(), 1);
        assert_eq!(who[&Key::new("x")].len(), 1);

        state.remove_keys(&a(), &keys(&["x"]));
        state.remove_keys(&a(), &keys(&["x"]));
        assert!(state.who_has(None).is_empty());
    }

    #[test]
    fn unknown_addresses_are_ignored() {
        let mut state = CenterState::new();
        state.add_keys(&a(), keys(&["x"]));
        state.remove_keys(&a(), &keys(&["x"]));
        state.deregister(&a());
        assert!(state.who_has(None).is_empty());
        assert!(state.ncores().is_empty());
    }

    #[test]
    fn deregister_purges_and_drops_orphans() {
        let mut state = CenterState::new();
        state.register(a(), 1);
        state.register(b(), 1);
        state.add_keys(&a(), keys(&["x", "y"]));
        state.add_keys(&b(), keys(&["y"]));

        state.deregister(&a());

        let who = state.who_has(None);
        assert!(!who.contains_key(&Key::new("x")));
        assert_eq!(who[&Key::new("y")], BTreeSet::from([b()]));
        assert!(!state.is_registered(&a()));
        assert!(state.has_what(&a()).is_empty());
    }

    #[test]
    fn who_has_subset_reports_unknown_keys_empty() {
        let mut state = CenterState::new();
        state.register(a(), 1);
        state.add_keys(&a(), keys(&["x"]));
        let who = state.who_has(Some(&keys(&["x", "nope"])));
        assert_eq!(who[&Key::new("x")], BTreeSet::from([a()]));
        assert!(who[&Key::new("nope")].is_empty());
    }
}
