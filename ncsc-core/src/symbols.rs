//! Functions and globals known to one compilation pass.
//!
//! A single table is shared by the root unit and every include it pulls
//! in. Function bodies live in the instruction buffer of the instance
//! that emitted them; `FunctionBody::start` is rebased whenever a nested
//! instance is merged into its parent.

use std::collections::HashMap;

use crate::ast::{FunctionDecl, VarDecl};
use crate::diagnostic::Diagnostic;
use crate::opcode::FunctionId;
use crate::types::Type;

/// Name of the synthesized function that reserves and initializes globals.
pub const GLOBALS_LOADER: &str = "#globals";

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    /// Index of the first record in the owning instruction buffer.
    pub start: usize,
    pub len: usize,
    /// Label targets as record indices relative to `start`.
    pub labels: Vec<Option<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSymbol {
    pub id: FunctionId,
    pub name: String,
    pub ret: Type,
    pub params: Vec<Type>,
    /// Unit that declared the function first.
    pub unit: String,
    pub body: Option<FunctionBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSymbol {
    pub slot: u32,
    pub name: String,
    pub ty: Type,
    pub decl: VarDecl,
    pub unit: String,
}

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    functions: Vec<FunctionSymbol>,
    by_name: HashMap<String, FunctionId>,
    globals: Vec<GlobalSymbol>,
    globals_by_name: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// A table that already knows every function signature of `previous`
    /// but none of its bodies or globals. Lets a second pass resolve
    /// calls to functions defined further down the unit.
    pub fn seeded_from(previous: &SymbolTable) -> Self {
        let mut table = SymbolTable::new();
        for function in &previous.functions {
            if function.name == GLOBALS_LOADER {
                continue;
            }
            let id = FunctionId(table.functions.len() as u32);
            table.by_name.insert(function.name.clone(), id);
            table.functions.push(FunctionSymbol {
                id,
                body: None,
                ..function.clone()
            });
        }
        table
    }

    /// Declares (or re-declares) a function. A prototype and one
    /// definition with the same signature may coexist.
    pub fn declare_function(
        &mut self,
        decl: &FunctionDecl,
        unit: &str,
    ) -> Result<FunctionId, Diagnostic> {
        if self.globals_by_name.contains_key(&decl.name) {
            return Err(Diagnostic::error(
                format!("\"{}\" is already declared as a variable", decl.name),
                decl.span,
            ));
        }
        let params = decl.param_types();
        if let Some(&id) = self.by_name.get(&decl.name) {
            let existing = &self.functions[id.0 as usize];
            if existing.ret != decl.ret || existing.params != params {
                return Err(Diagnostic::error(
                    format!("conflicting declaration of function \"{}\"", decl.name),
                    decl.span,
                ));
            }
            if existing.body.is_some() && decl.body.is_some() {
                return Err(Diagnostic::error(
                    format!("function \"{}\" already has a body", decl.name),
                    decl.span,
                ));
            }
            return Ok(id);
        }
        Ok(self.insert_function(&decl.name, decl.ret, params, unit))
    }

    /// Registers the globals loader, replacing any earlier one.
    pub fn declare_loader(&mut self, ret: Type, unit: &str) -> FunctionId {
        if let Some(&id) = self.by_name.get(GLOBALS_LOADER) {
            let loader = &mut self.functions[id.0 as usize];
            loader.ret = ret;
            loader.body = None;
            return id;
        }
        self.insert_function(GLOBALS_LOADER, ret, Vec::new(), unit)
    }

    fn insert_function(&mut self, name: &str, ret: Type, params: Vec<Type>, unit: &str) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.by_name.insert(name.to_string(), id);
        self.functions.push(FunctionSymbol {
            id,
            name: name.to_string(),
            ret,
            params,
            unit: unit.to_string(),
            body: None,
        });
        id
    }

    pub fn declare_global(&mut self, decl: &VarDecl, unit: &str) -> Result<u32, Diagnostic> {
        if self.globals_by_name.contains_key(&decl.name) || self.by_name.contains_key(&decl.name) {
            return Err(Diagnostic::error(
                format!("\"{}\" is already declared", decl.name),
                decl.span,
            ));
        }
        let slot = self.globals.len() as u32;
        self.globals_by_name.insert(decl.name.clone(), slot);
        self.globals.push(GlobalSymbol {
            slot,
            name: decl.name.clone(),
            ty: decl.ty,
            decl: decl.clone(),
            unit: unit.to_string(),
        });
        Ok(slot)
    }

    pub fn attach_body(&mut self, id: FunctionId, body: FunctionBody) {
        if let Some(function) = self.functions.get_mut(id.0 as usize) {
            function.body = Some(body);
        }
    }

    /// Shifts the body start of each function in `ids` by `offset` records.
    pub fn rebase(&mut self, ids: &[FunctionId], offset: usize) {
        for id in ids {
            if let Some(body) = self
                .functions
                .get_mut(id.0 as usize)
                .and_then(|function| function.body.as_mut())
            {
                body.start += offset;
            }
        }
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionSymbol> {
        self.functions.get(id.0 as usize)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionSymbol> {
        self.by_name
            .get(name)
            .and_then(|id| self.functions.get(id.0 as usize))
    }

    pub fn lookup_global(&self, name: &str) -> Option<&GlobalSymbol> {
        self.globals_by_name
            .get(name)
            .and_then(|slot| self.globals.get(*slot as usize))
    }

    pub fn functions(&self) -> &[FunctionSymbol] {
        &self.functions
    }

    pub fn globals(&self) -> &[GlobalSymbol] {
        &self.globals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;
    use crate::span::Span;

    fn function(name: &str, ret: Type, params: &[Type], body: bool) -> FunctionDecl {
        FunctionDecl {
            ret,
            name: name.to_string(),
            params: params
                .iter()
                .enumerate()
                .map(|(i, ty)| Param {
                    ty: *ty,
                    name: format!("p{i}"),
                })
                .collect(),
            body: body.then(Vec::new),
            span: Span::default(),
        }
    }

    fn global(name: &str) -> VarDecl {
        VarDecl {
            ty: Type::Int,
            name: name.to_string(),
            init: None,
            span: Span::default(),
        }
    }

    #[test]
    fn prototype_then_definition_share_an_id() {
        let mut table = SymbolTable::new();
        let proto = table
            .declare_function(&function("Helper", Type::Int, &[Type::Float], false), "main")
            .unwrap();
        let def = table
            .declare_function(&function("Helper", Type::Int, &[Type::Float], true), "main")
            .unwrap();
        assert_eq!(proto, def);
    }

    #[test]
    fn rejects_conflicting_signatures_and_second_bodies() {
        let mut table = SymbolTable::new();
        let id = table
            .declare_function(&function("f", Type::Void, &[], true), "main")
            .unwrap();
        table.attach_body(
            id,
            FunctionBody {
                start: 0,
                len: 1,
                labels: Vec::new(),
            },
        );
        assert!(
            table
                .declare_function(&function("f", Type::Int, &[], false), "main")
                .is_err()
        );
        assert!(
            table
                .declare_function(&function("f", Type::Void, &[], true), "main")
                .is_err()
        );
    }

    #[test]
    fn globals_get_sequential_slots_and_clash_with_functions() {
        let mut table = SymbolTable::new();
        assert_eq!(table.declare_global(&global("a"), "main").unwrap(), 0);
        assert_eq!(table.declare_global(&global("b"), "main").unwrap(), 1);
        assert!(table.declare_global(&global("a"), "main").is_err());
        assert!(
            table
                .declare_function(&function("b", Type::Void, &[], false), "main")
                .is_err()
        );
    }

    #[test]
    fn seeding_keeps_signatures_and_drops_bodies() {
        let mut first = SymbolTable::new();
        let id = first
            .declare_function(&function("Later", Type::Int, &[Type::Int], true), "main")
            .unwrap();
        first.attach_body(
            id,
            FunctionBody {
                start: 4,
                len: 2,
                labels: Vec::new(),
            },
        );
        first.declare_global(&global("g"), "main").unwrap();
        first.declare_loader(Type::Void, "main");

        let second = SymbolTable::seeded_from(&first);
        let later = second.lookup_function("Later").unwrap();
        assert_eq!(later.params, vec![Type::Int]);
        assert!(later.body.is_none());
        assert!(second.globals().is_empty());
        assert!(second.lookup_function(GLOBALS_LOADER).is_none());
    }

    #[test]
    fn rebase_shifts_only_listed_bodies() {
        let mut table = SymbolTable::new();
        let a = table
            .declare_function(&function("a", Type::Void, &[], true), "inc")
            .unwrap();
        let b = table
            .declare_function(&function("b", Type::Void, &[], true), "main")
            .unwrap();
        for id in [a, b] {
            table.attach_body(
                id,
                FunctionBody {
                    start: 1,
                    len: 1,
                    labels: Vec::new(),
                },
            );
        }
        table.rebase(&[a], 10);
        assert_eq!(table.function(a).unwrap().body.as_ref().unwrap().start, 11);
        assert_eq!(table.function(b).unwrap().body.as_ref().unwrap().start, 1);
    }
}
