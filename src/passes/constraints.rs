//! The Type Resolver's constraint store (§4.6 "Constraint store"). Each
//! still-unresolved type slot is identified by the address of its own
//! `Cell` (an `Expr::ty`, `SymbolRec::ty`, or `SymbolRec::ret_ty`) and maps
//! to a lower/upper bound pair, built up across one iteration by repeated
//! calls to [`ConstraintStore::add`] and flushed by
//! [`ConstraintStore::collapse`] at the end of it.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use crate::types::Type;

/// A slot is keyed by the address of the `Cell` it eventually resolves;
/// addresses are stable for the lifetime of the compilation since AST
/// nodes are never reallocated after parsing, only mutated in place.
pub type SlotKey = usize;

pub fn slot_key<'a>(cell: &Cell<Option<&'a Type<'a>>>) -> SlotKey {
    cell as *const Cell<Option<&'a Type<'a>>> as usize
}

struct Constraint<'a> {
    lower: Option<&'a Type<'a>>,
    upper: Option<&'a Type<'a>>,
    /// Function-parameter slots collapse to their upper bound
    /// (contravariance in parameter position); return-type and
    /// variable-type slots collapse to their lower bound (§4.6).
    take_lower_bound: bool,
}

#[derive(Default)]
pub struct ConstraintStore<'a> {
    constraints: HashMap<SlotKey, Constraint<'a>>,
    incomplete: HashSet<SlotKey>,
}

impl<'a> ConstraintStore<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes `slot` from this iteration's collapse: its own type still
    /// depends on another slot that hasn't resolved yet.
    pub fn mark_incomplete(&mut self, slot: SlotKey) {
        self.incomplete.insert(slot);
    }

    pub fn clear_incomplete(&mut self, slot: SlotKey) {
        self.incomplete.remove(&slot);
    }

    /// `addConstraint(t, slot)` (§4.6): widens the lower bound down to `t`
    /// if `t <: lower`; otherwise sets, narrows, or ignores the upper
    /// bound, per the four cases the spec lists in order.
    pub fn add(&mut self, slot: SlotKey, t: &'a Type<'a>, take_lower_bound: bool) {
        let entry = self.constraints.entry(slot).or_insert_with(|| Constraint {
            lower: None,
            upper: None,
            take_lower_bound,
        });
        match entry.lower {
            None => entry.lower = Some(t),
            Some(lower) => {
                if t.is_subtype_of(lower) {
                    entry.lower = Some(t);
                } else {
                    match entry.upper {
                        None => entry.upper = Some(t),
                        Some(upper) => {
                            if lower.is_subtype_of(t) && t.is_subtype_of(upper) {
                                // lower <: t <: upper: already within bounds.
                            } else if upper.is_subtype_of(t) {
                                entry.upper = Some(t);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Writes each non-`incomplete` slot's chosen bound through `write`
    /// (which the caller supplies to reach the live `Cell` a slot key
    /// addresses — the store itself only tracks bounds). Returns whether
    /// any slot actually resolved, i.e. whether this iteration progressed.
    pub fn collapse(&mut self, mut write: impl FnMut(SlotKey, &'a Type<'a>)) -> bool {
        let mut progressed = false;
        let mut done = Vec::new();
        for (&slot, c) in self.constraints.iter() {
            if self.incomplete.contains(&slot) {
                continue;
            }
            let chosen = if c.take_lower_bound {
                c.lower.or(c.upper)
            } else {
                c.upper.or(c.lower)
            };
            if let Some(ty) = chosen {
                write(slot, ty);
                progressed = true;
                done.push(slot);
            }
        }
        for slot in done {
            self.constraints.remove(&slot);
        }
        progressed
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Builtin, TypeArena};

    #[test]
    fn collapsing_lower_bound_slot_writes_the_type() {
        let types = TypeArena::new();
        let int_ty = types.builtin(Builtin::Int);
        let mut store = ConstraintStore::new();
        store.add(1, int_ty, true);
        let mut written = None;
        let progressed = store.collapse(|slot, ty| {
            written = Some((slot, ty));
        });
        assert!(progressed);
        assert_eq!(written, Some((1, int_ty)));
        assert!(store.is_empty());
    }

    #[test]
    fn incomplete_slot_is_skipped_until_cleared() {
        let types = TypeArena::new();
        let int_ty = types.builtin(Builtin::Int);
        let mut store = ConstraintStore::new();
        store.add(7, int_ty, true);
        store.mark_incomplete(7);
        let mut progressed = store.collapse(|_, _| panic!("should not collapse"));
        assert!(!progressed);
        store.clear_incomplete(7);
        let mut seen = false;
        progressed = store.collapse(|_, _| seen = true);
        assert!(progressed);
        assert!(seen);
    }

    #[test]
    fn float_lower_narrows_down_from_double() {
        let types = TypeArena::new();
        let double_ty = types.builtin(Builtin::Double);
        let float_ty = types.builtin(Builtin::Float);
        let mut store = ConstraintStore::new();
        store.add(2, double_ty, true);
        store.add(2, float_ty, true);
        let mut written = None;
        store.collapse(|slot, ty| written = Some((slot, ty)));
        assert_eq!(written, Some((2, float_ty)));
    }

    #[test]
    fn parameter_slot_takes_upper_bound() {
        let types = TypeArena::new();
        let int_ty = types.builtin(Builtin::Int);
        let mut store = ConstraintStore::new();
        store.add(3, int_ty, false);
        let mut written = None;
        store.collapse(|slot, ty| written = Some((slot, ty)));
        assert_eq!(written, Some((3, int_ty)));
    }
}
