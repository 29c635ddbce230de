//! Locality-aware division of a batch of tasks across workers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

/// Split tasks into per-worker share lists and a set of tasks without a
/// usable locality hint.
///
/// A task lands in the share list of every worker that holds *all* of its
/// needed keys. Tasks that need nothing, or whose keys no single worker holds
/// together, go to `extra`. Each share list is ordered by descending number of
/// candidate workers, ties broken by ascending task id, so flexible tasks are
/// claimed before the ones only one worker can take.
///
/// Pure; callers re-run it whenever placement or the pending batch changes.
pub fn divide_tasks<K, W, T>(
    who_has: &HashMap<K, BTreeSet<W>>,
    needed: &BTreeMap<T, BTreeSet<K>>,
) -> (BTreeMap<W, Vec<T>>, BTreeSet<T>)
where
    K: Eq + Hash,
    W: Ord + Clone,
    T: Ord + Clone,
{
    let mut ranked: BTreeMap<W, Vec<(usize, T)>> = BTreeMap::new();
    let mut extra = BTreeSet::new();

    for (task, keys) in needed {
        let candidates = holders_of_all(who_has, keys);
        if candidates.is_empty() {
            extra.insert(task.clone());
            continue;
        }
        let count = candidates.len();
        for worker in candidates {
            ranked
                .entry(worker.clone())
                .or_default()
                .push((count, task.clone()));
        }
    }

    let shares = ranked
        .into_iter()
        .map(|(worker, mut tasks)| {
            tasks.sort_by(|(ca, ta), (cb, tb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
            (worker, tasks.into_iter().map(|(_, t)| t).collect())
        })
        .collect();

    (shares, extra)
}

/// Workers holding every key in `keys`. Empty when `keys` is empty.
fn holders_of_all<'a, K, W>(
    who_has: &'a HashMap<K, BTreeSet<W>>,
    keys: &BTreeSet<K>,
) -> Vec<&'a W>
where
    K: Eq + Hash,
    W: Ord,
{
    let mut keys = keys.iter();
    let Some(first) = keys.next() else {
        return Vec::new();
    };
    let Some(holders) = who_has.get(first) else {
        return Vec::new();
    };
    let mut candidates: Vec<&W> = holders.iter().collect();
    for key in keys {
        match who_has.get(key) {
            Some(holders) => candidates.retain(|w| holders.contains(*w)),
            None => return Vec::new(),
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<T: Ord + Clone>(items: &[T]) -> BTreeSet<T> {
        items.iter().cloned().collect()
    }

    #[test]
    fn workshare() {
        let who_has: HashMap<&str, BTreeSet<&str>> = HashMap::from([
            ("x", set(&["Alice"])),
            ("y", set(&["Alice", "Bob"])),
            ("z", set(&["Bob"])),
        ]);
        let needed: BTreeMap<u32, BTreeSet<&str>> = BTreeMap::from([
            (1, set(&["x"])),
            (2, set(&["y"])),
            (3, set(&["z"])),
            (4, set(&["x", "z"])),
            (5, BTreeSet::new()),
        ]);

        let (shares, extra) = divide_tasks(&who_has, &needed);

        assert_eq!(
            shares,
            BTreeMap::from([("Alice", vec![2, 1]), ("Bob", vec![2, 3])])
        );
        assert_eq!(extra, set(&[4, 5]));
    }

    #[test]
    fn unknown_keys_have_no_candidates() {
        let who_has: HashMap<&str, BTreeSet<&str>> = HashMap::from([("x", set(&["A"]))]);
        let needed = BTreeMap::from([(1u32, set(&["x", "missing"]))]);
        let (shares, extra) = divide_tasks(&who_has, &needed);
        assert!(shares.is_empty());
        assert_eq!(extra, set(&[1]));
    }

    #[test]
    fn equal_candidate_counts_order_by_task_id() {
        let who_has: HashMap<&str, BTreeSet<&str>> =
            HashMap::from([("x", set(&["A"])), ("y", set(&["A"]))]);
        let needed = BTreeMap::from([
            (9u32, set(&["y"])),
            (3, set(&["x"])),
            (5, set(&["x", "y"])),
        ]);
        let (shares, _) = divide_tasks(&who_has, &needed);
        assert_eq!(shares["A"], vec![3, 5, 9]);
    }

    #[test]
    fn empty_input() {
        let who_has: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        let needed: BTreeMap<u32, BTreeSet<&str>> = BTreeMap::new();
        let (shares, extra) = divide_tasks(&who_has, &needed);
        assert!(shares.is_empty());
        assert!(extra.is_empty());
    }
}
