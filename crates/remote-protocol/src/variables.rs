// SPDX-License-Identifier: MIT
//
// Typed variable tables (§3 "Variable tables"). Each type owns a sorted,
// unique value-reference array with parallel value and dirty-flag arrays.
//
// §9 "Recursive value-reference lookup": the original C source does a
// manual recursive binary search. A flat iterative binary search over a
// pre-sorted table is equivalent and preferable — that is what `lookup`
// below does, via the standard library's `binary_search`.

/// A typed cache of one variable kind (real, integer, or boolean).
///
/// Invariants (§3):
/// 1. `refs` is sorted ascending and contains no duplicates.
/// 2. Any `values[i]` with `changed[i] == true` must be pushed to the model
///    before the next compute step, and `changed[i]` cleared.
/// 3. After a compute step, the server re-reads all variables into
///    `values` and does not clear any flags (only a push clears them).
#[derive(Debug, Clone)]
pub struct VariableTable<T> {
    refs: Vec<u32>,
    values: Vec<T>,
    changed: Vec<bool>,
}

impl<T: Copy + Default> VariableTable<T> {
    /// Build a table from a value-reference list, sorting and deduplicating
    /// it and sizing the parallel arrays to match (§3 invariant 1).
    pub fn new(mut refs: Vec<u32>) -> Self {
        refs.sort_unstable();
        refs.dedup();
        let n = refs.len();
        Self {
            refs,
            values: vec![T::default(); n],
            changed: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn refs(&self) -> &[u32] {
        &self.refs
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Flat iterative binary search for `vr`'s slot index (§9).
    pub fn lookup(&self, vr: u32) -> Option<usize> {
        self.refs.binary_search(&vr).ok()
    }

    /// Local `GetX`: read the cached value without touching the wire
    /// (§4.3 "served locally by the client").
    pub fn get(&self, vr: u32) -> Option<T> {
        self.lookup(vr).map(|i| self.values[i])
    }

    /// Local `SetX`: write the cached value and mark it dirty. The
    /// accumulated diff is flushed to the server at the next step call.
    pub fn set(&mut self, vr: u32, value: T) -> bool {
        match self.lookup(vr) {
            Some(i) => {
                self.values[i] = value;
                self.changed[i] = true;
                true
            }
            None => false,
        }
    }

    /// Indices whose `changed` flag is set, in ascending value-reference
    /// order (the order the typed wire arrays expect).
    pub fn dirty_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.changed
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| c.then_some(i))
    }

    /// Clear the dirty flag for `index` after a successful flush to the
    /// model (§3 invariant 2).
    pub fn clear_changed(&mut self, index: usize) {
        self.changed[index] = false;
    }

    pub fn is_changed(&self, index: usize) -> bool {
        self.changed[index]
    }

    /// Overwrite every cached value after a compute step, per §3 invariant
    /// 3: flags are never cleared here, only values.
    pub fn refresh_all(&mut self, fresh: &[T]) {
        debug_assert_eq!(fresh.len(), self.values.len());
        self.values.copy_from_slice(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_are_sorted_and_deduplicated() {
        let table = VariableTable::<f64>::new(vec![5, 1, 3, 1, 5]);
        assert_eq!(table.refs(), &[1, 3, 5]);
    }

    #[test]
    fn lookup_finds_exact_matches_only() {
        let table = VariableTable::<f64>::new(vec![10, 20, 30]);
        assert_eq!(table.lookup(20), Some(1));
        assert_eq!(table.lookup(25), None);
    }

    #[test]
    fn set_then_get_round_trips_locally() {
        let mut table = VariableTable::<f64>::new(vec![0, 1]);
        assert!(table.set(1, 3.5));
        assert_eq!(table.get(1), Some(3.5));
        assert!(table.is_changed(1));
    }

    #[test]
    fn set_unknown_vr_is_a_no_op() {
        let mut table = VariableTable::<f64>::new(vec![0, 1]);
        assert!(!table.set(99, 1.0));
    }

    #[test]
    fn dirty_indices_and_clear_changed_flush_cycle() {
        let mut table = VariableTable::<f64>::new(vec![0, 1, 2]);
        table.set(0, 1.0);
        table.set(2, 3.0);
        let dirty: Vec<usize> = table.dirty_indices().collect();
        assert_eq!(dirty, vec![0, 2]);
        for i in dirty {
            table.clear_changed(i);
        }
        assert!(table.dirty_indices().next().is_none());
    }

    #[test]
    fn refresh_all_does_not_clear_changed_flags() {
        let mut table = VariableTable::<f64>::new(vec![0, 1]);
        table.set(0, 1.0);
        table.refresh_all(&[9.0, 9.0]);
        assert_eq!(table.values(), &[9.0, 9.0]);
        assert!(table.is_changed(0), "refresh must not clear flags (§3 invariant 3)");
    }
}
