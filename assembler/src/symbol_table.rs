//! The scoped symbol tables shared by pass 1 and pass 2: global labels,
//! global constants (`=`/`EQU`), reassignable `.var` variables, and
//! per-scope local (`@name`) labels.
//!
//! Grounded on the teacher's `SymbolTable` (`UnsafeCell`-backed maps behind
//! a shared reference, so both passes can mutably update state while
//! holding many live borrows elsewhere), generalized from its flat
//! label/macro maps into the richer model this pipeline's scoping rules
//! require.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use asm_support::origin::Origin;
use asm_support::Address;

use crate::expr::EvalContext;

#[derive(Debug, Clone)]
pub struct LabelDef {
    pub address: Address,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct ConstDef {
    pub value: i64,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
struct LocalEntry {
    #[allow(dead_code)]
    canonical_key: String,
    defining_line: usize,
    address: Address,
}

#[derive(Default)]
pub struct SymbolTable {
    globals: RefCell<HashMap<String, LabelDef>>,
    globals_ci: RefCell<HashMap<String, String>>,
    consts: RefCell<HashMap<String, ConstDef>>,
    variables: RefCell<HashSet<String>>,
    /// scopeKey -> localName (without the leading `@`) -> ordered entries.
    locals: RefCell<HashMap<String, HashMap<String, Vec<LocalEntry>>>>,
    next_local_ordinal: Cell<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_global_label(&self, name: &str, address: Address, origin: &Origin) -> Result<(), LabelDef> {
        let mut globals = self.globals.borrow_mut();
        if let Some(existing) = globals.get(name) {
            return Err(existing.clone());
        }
        globals.insert(name.to_string(), LabelDef { address, origin: origin.clone() });
        self.globals_ci.borrow_mut().entry(name.to_ascii_lowercase()).or_insert_with(|| name.to_string());
        Ok(())
    }

    /// Registers a local label occurrence, returning its globally-unique
    /// exported key `@<name>_<ordinal>`.
    pub fn declare_local_label(&self, scope_key: &str, bare_name: &str, defining_line: usize, address: Address) -> String {
        let ordinal = self.next_local_ordinal.get();
        self.next_local_ordinal.set(ordinal + 1);
        let canonical_key = format!("@{}_{}", bare_name, ordinal);

        let mut locals = self.locals.borrow_mut();
        locals
            .entry(scope_key.to_string())
            .or_default()
            .entry(bare_name.to_string())
            .or_default()
            .push(LocalEntry { canonical_key: canonical_key.clone(), defining_line, address });

        canonical_key
    }

    pub fn declare_const(&self, name: &str, value: i64, origin: &Origin) -> Result<(), ConstDef> {
        let mut consts = self.consts.borrow_mut();
        if self.variables.borrow().contains(name) {
            consts.insert(name.to_string(), ConstDef { value, origin: origin.clone() });
            return Ok(());
        }
        if let Some(existing) = consts.get(name) {
            return Err(existing.clone());
        }
        consts.insert(name.to_string(), ConstDef { value, origin: origin.clone() });
        Ok(())
    }

    pub fn declare_var(&self, name: &str, value: i64, origin: &Origin) {
        self.variables.borrow_mut().insert(name.to_string());
        self.consts.borrow_mut().insert(name.to_string(), ConstDef { value, origin: origin.clone() });
    }

    pub fn is_variable(&self, name: &str) -> bool {
        self.variables.borrow().contains(name)
    }

    /// Pass 2 variable reassignment: overwrites unconditionally.
    pub fn reassign_var(&self, name: &str, value: i64, origin: &Origin) {
        self.consts.borrow_mut().insert(name.to_string(), ConstDef { value, origin: origin.clone() });
    }

    pub fn get_const(&self, name: &str) -> Option<i64> {
        self.consts.borrow().get(name).map(|c| c.value)
    }

    pub fn get_label(&self, name: &str) -> Option<Address> {
        if let Some(def) = self.globals.borrow().get(name) {
            return Some(def.address);
        }
        let ci = self.globals_ci.borrow();
        let canonical = ci.get(&name.to_ascii_lowercase())?.clone();
        drop(ci);
        self.globals.borrow().get(&canonical).map(|d| d.address)
    }

    /// Resolves `@name` against the local index for `scope_key`, choosing
    /// the most recent definition at or before `line`.
    pub fn get_local(&self, scope_key: &str, bare_name: &str, line: usize) -> Option<Address> {
        let locals = self.locals.borrow();
        let entries = locals.get(scope_key)?.get(bare_name)?;
        entries.iter().filter(|e| e.defining_line <= line).max_by_key(|e| e.defining_line).map(|e| e.address)
    }

    pub fn labels(&self) -> Vec<(String, LabelDef)> {
        self.globals.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn consts(&self) -> Vec<(String, ConstDef)> {
        self.consts.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// A short-lived view over the symbol table scoped to the line currently
/// being evaluated, implementing [`EvalContext`] for [`crate::expr`].
pub struct LineContext<'a> {
    pub table: &'a SymbolTable,
    pub scope_key: &'a str,
    pub line: usize,
    pub location_counter: Option<i64>,
}

impl<'a> EvalContext for LineContext<'a> {
    fn lookup(&self, name: &str) -> Option<i64> {
        match name.to_ascii_lowercase().as_str() {
            "true" => return Some(1),
            "false" => return Some(0),
            _ => {}
        }

        // "scoped constant lookup (try scope + '::' + name ignoring macro
        // tail first, then bare name)".
        let file_scope = self.scope_key.split("::").take(2).collect::<Vec<_>>().join("::");
        if let Some(v) = self.table.get_const(&format!("{}::{}", file_scope, name)) {
            return Some(v);
        }
        if let Some(v) = self.table.get_const(name) {
            return Some(v);
        }

        if let Some(bare) = name.strip_prefix('@') {
            return self.table.get_local(self.scope_key, bare, self.line).map(|a| a as i64);
        }

        self.table.get_label(name).map(|a| a as i64)
    }

    fn location_counter(&self) -> Option<i64> {
        self.location_counter
    }
}

/// The restricted evaluator the loop expander uses: sees only `=`/`EQU`
/// constants recorded textually before the loop, never labels/locals/`*`.
pub struct RestrictedContext<'a> {
    pub consts: &'a HashMap<String, i64>,
}

impl<'a> EvalContext for RestrictedContext<'a> {
    fn lookup(&self, name: &str) -> Option<i64> {
        match name.to_ascii_lowercase().as_str() {
            "true" => return Some(1),
            "false" => return Some(0),
            _ => {}
        }
        self.consts.get(name).copied()
    }

    fn location_counter(&self) -> Option<i64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn origin() -> Origin {
        Origin::top_level(asm_support::origin::UnitPath::new("<test>".into()), 1, Rc::from(""))
    }

    #[test]
    fn global_label_redeclaration_is_rejected() {
        let table = SymbolTable::new();
        assert!(table.declare_global_label("start", 0, &origin()).is_ok());
        assert!(table.declare_global_label("start", 10, &origin()).is_err());
    }

    #[test]
    fn const_reassignment_rejected_unless_variable() {
        let table = SymbolTable::new();
        assert!(table.declare_const("N", 3, &origin()).is_ok());
        assert!(table.declare_const("N", 4, &origin()).is_err());

        table.declare_var("val", 0, &origin());
        assert!(table.declare_const("val", 1, &origin()).is_ok());
        assert!(table.declare_const("val", 2, &origin()).is_ok());
    }

    #[test]
    fn local_label_picks_most_recent_definition_at_or_before_line() {
        let table = SymbolTable::new();
        table.declare_local_label("scope", "loop", 5, 0x10);
        table.declare_local_label("scope", "loop", 9, 0x20);

        assert_eq!(table.get_local("scope", "loop", 5), Some(0x10));
        assert_eq!(table.get_local("scope", "loop", 8), Some(0x10));
        assert_eq!(table.get_local("scope", "loop", 9), Some(0x20));
        assert_eq!(table.get_local("scope", "loop", 100), Some(0x20));
        assert_eq!(table.get_local("scope", "loop", 4), None);
    }

    #[test]
    fn label_lookup_falls_back_to_case_insensitive() {
        let table = SymbolTable::new();
        table.declare_global_label("Start", 0x100, &origin()).unwrap();
        assert_eq!(table.get_label("Start"), Some(0x100));
        assert_eq!(table.get_label("start"), Some(0x100));
        assert_eq!(table.get_label("START"), Some(0x100));
    }
}
