use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref LABELS: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Stable id of an interned display label (button text, prompt line, option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(usize);

/// Intern a label and return its id. Interning the same text twice yields the same id.
pub fn intern_label(s: &str) -> LabelId {
    let atom = Atom::from(s);
    if let Some(idx) = LABELS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .position(|a| *a == atom)
    {
        return LabelId(idx);
    }
    let mut labels = LABELS.write().unwrap_or_else(PoisonError::into_inner);
    // Another writer may have interned it between the two locks.
    match labels.iter().position(|a| *a == atom) {
        Some(idx) => LabelId(idx),
        None => {
            labels.push(atom);
            LabelId(labels.len() - 1)
        }
    }
}

pub fn label_count() -> usize {
    LABELS.read().unwrap_or_else(PoisonError::into_inner).len()
}

pub fn label(id: LabelId) -> Option<Atom> {
    LABELS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id.0)
        .cloned()
}
