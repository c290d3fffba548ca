//! The three semantic passes (§4.4-4.6), run in order by [`crate::compile`]:
//! [`register::Register`] declares every nameable entity and attaches
//! scopes, [`resolve::Resolver`] binds every name reference and elaborates
//! `TypeSpec`s, and [`typeck::TypeChecker`] iterates to a fixpoint,
//! inserting conversions and filling in inferred types.

pub mod constraints;
pub mod register;
pub mod resolve;
pub mod typeck;

use crate::intern::{Interner, Symbol};

/// Labels live in a namespace separate from ordinary identifiers (§4.5:
/// "resolves with a prefix `*` in the name"), so `*loop` and a variable
/// named `loop` never collide. `declare` interns the combined key (label
/// declaration sites may need a fresh interner entry); `lookup` only reads
/// an existing one, since a dangling label reference should fail cleanly
/// rather than allocate a symbol nothing ever declared.
pub fn label_key_declare(interner: &mut Interner, name: Symbol) -> Symbol {
    let combined = format!("*{}", interner.resolve(name));
    interner.intern(&combined)
}

pub fn label_key_lookup(interner: &Interner, name: Symbol) -> Option<Symbol> {
    let combined = format!("*{}", interner.resolve(name));
    interner.lookup(&combined)
}
