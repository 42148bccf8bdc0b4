//! Two-phase name/type resolution.
//!
//! Phase 1 (construction): every declared type and callable across all
//! modules, plus the driver-supplied built-ins, is registered into a
//! name-keyed table. Phase 2 (`Module::resolve`, driven by the caller):
//! every type-bearing field and callable body is walked once, patching
//! name strings into concrete [`Type`]s/[`Callable`]s via this table.

use std::rc::Rc;

use super::ast::{Callable, ComplexType, Type};
use crate::common::{intern, CompileError, Id, Map, Result};

pub struct Resolver {
    types: Map<Id, Type>,
    functions: Map<Id, Rc<Callable>>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            types: Map::new(),
            functions: Map::new(),
        }
    }

    pub fn register_type(&mut self, ty: Type) {
        self.types.entry(intern(ty.name())).or_insert(ty);
    }

    pub fn register_complex_type(&mut self, ty: &Rc<ComplexType>) {
        self.register_type(Type::Complex(Rc::clone(ty)));
    }

    pub fn register_function(&mut self, func: Rc<Callable>) {
        self.functions.insert(intern(func.name()), func);
    }

    /// Resolve a value that may already be a concrete type, registering it
    /// if it's new (mirrors the original's `Resolve`, used when a callable's
    /// return type is built in-place rather than parsed from a name).
    pub fn resolve_type(&mut self, ty: Type) -> Type {
        let key = intern(ty.name());
        if let Some(existing) = self.types.get(&key) {
            return existing.clone();
        }
        self.types.insert(key, ty.clone());
        ty
    }

    /// Look up a type by name, recursively stripping one trailing `*` to
    /// build a pointer type.
    pub fn get_type(&self, name: &str) -> Result<Type> {
        if let Some(inner) = name.strip_suffix('*') {
            return Ok(Type::Pointer(Box::new(self.get_type(inner)?)));
        }
        self.types
            .get(&intern(name))
            .cloned()
            .ok_or_else(|| CompileError::UndefinedType(name.to_string()))
    }

    pub fn get_function(&self, name: &str) -> Result<Rc<Callable>> {
        self.functions
            .get(&intern(name))
            .cloned()
            .ok_or_else(|| CompileError::UndefinedFunction(name.to_string()))
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_names_strip_one_star_recursively() {
        let mut r = Resolver::new();
        r.register_type(Type::Integer);
        assert_eq!(r.get_type("Integer*").unwrap(), Type::Pointer(Box::new(Type::Integer)));
        assert_eq!(
            r.get_type("Integer**").unwrap(),
            Type::Pointer(Box::new(Type::Pointer(Box::new(Type::Integer))))
        );
    }

    #[test]
    fn undefined_type_is_an_error() {
        let r = Resolver::new();
        assert!(matches!(r.get_type("Bogus"), Err(CompileError::UndefinedType(_))));
    }

    #[test]
    fn undefined_function_is_an_error() {
        let r = Resolver::new();
        assert!(matches!(r.get_function("__ADD_Integer_Integer"), Err(CompileError::UndefinedFunction(_))));
    }
}
