//! The typed intermediate representation: types, memory blocks (variables),
//! expressions, statements, callables and modules.
//!
//! Everything that needs a textual name resolved into a concrete object
//! (a type name, a callable name) is parsed first as a plain `String` and
//! patched in place by [`super::resolve::Resolver`] during phase 2 of
//! resolution. We model that patch-in-place step with small `RefCell`
//! cells (`TypeRef`, `VarTarget`, `FnTarget`) rather than consuming and
//! rebuilding the tree, which keeps the two-phase "parse, then resolve"
//! shape of the original compiler intact.

use std::cell::RefCell;
use std::rc::Rc;

use super::resolve::Resolver;
use crate::common::{CompileError, Result};

/// A resolved type.
///
/// Complex types compare by name (per the language's type-equality rule);
/// everything else compares structurally.
#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Integer,
    UInteger,
    Pointer(Box<Type>),
    Complex(Rc<ComplexType>),
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Void, Type::Void) => true,
            (Type::Integer, Type::Integer) => true,
            (Type::UInteger, Type::UInteger) => true,
            (Type::Pointer(a), Type::Pointer(b)) => a == b,
            (Type::Complex(a), Type::Complex(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl Type {
    pub fn name(&self) -> String {
        match self {
            Type::Void => "Void".to_string(),
            Type::Integer => "Integer".to_string(),
            Type::UInteger => "UInteger".to_string(),
            Type::Pointer(inner) => format!("{}*", inner.name()),
            Type::Complex(c) => c.name.clone(),
        }
    }

    /// Size in machine words.
    pub fn size(&self) -> Result<usize> {
        match self {
            Type::Void => Ok(0),
            Type::Integer | Type::UInteger | Type::Pointer(_) => Ok(1),
            Type::Complex(c) => c.size(),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Integer)
    }
}

/// A type that is either still a bare name (pre-resolution) or a concrete
/// [`Type`] (post-resolution).
#[derive(Debug, Clone)]
pub enum TypeRef {
    Name(String),
    Resolved(Type),
}

impl TypeRef {
    pub fn name(name: impl Into<String>) -> Self {
        TypeRef::Name(name.into())
    }

    pub fn resolved(ty: Type) -> Self {
        TypeRef::Resolved(ty)
    }

    pub fn resolve(&mut self, resolver: &Resolver) -> Result<()> {
        let resolved = match self {
            TypeRef::Name(n) => resolver.get_type(n)?,
            TypeRef::Resolved(t) => t.clone(),
        };
        *self = TypeRef::Resolved(resolved);
        Ok(())
    }

    /// Read the concrete type. Fails if `resolve` has not run yet.
    pub fn get(&self) -> Result<Type> {
        match self {
            TypeRef::Resolved(t) => Ok(t.clone()),
            TypeRef::Name(n) => Err(CompileError::NotResolved(format!(
                "Type \"{n}\" has not been resolved."
            ))),
        }
    }
}

/// A declared field inside a `Structure`, before it is instantiated as a
/// [`FieldInstance`] relative to some concrete variable.
#[derive(Debug)]
pub struct FieldDecl {
    pub ty: RefCell<TypeRef>,
    pub name: String,
    pub index: usize,
}

impl FieldDecl {
    pub fn new(ty: impl Into<String>, name: impl Into<String>, index: usize) -> Self {
        FieldDecl {
            ty: RefCell::new(TypeRef::name(ty)),
            name: name.into(),
            index,
        }
    }

    pub fn resolve(&self, resolver: &Resolver) -> Result<()> {
        self.ty.borrow_mut().resolve(resolver)
    }

    pub fn get_type(&self) -> Result<Type> {
        self.ty.borrow().get()
    }

    pub fn size(&self) -> Result<usize> {
        self.get_type()?.size()
    }
}

/// `Structure Name ... End Structure`. Field offsets are cumulative in
/// declaration order and computed on demand, matching the original.
#[derive(Debug)]
pub struct ComplexType {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

impl ComplexType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        ComplexType {
            name: name.into(),
            fields,
        }
    }

    pub fn size(&self) -> Result<usize> {
        let mut total = 0;
        for field in &self.fields {
            total += field.size()?;
        }
        Ok(total)
    }

    pub fn resolve(&self, resolver: &Resolver) -> Result<()> {
        for field in &self.fields {
            field.resolve(resolver)?;
        }
        Ok(())
    }

    pub fn field_offset(&self, name: &str) -> Result<Option<usize>> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Ok(Some(offset));
            }
            offset += field.size()?;
        }
        Ok(None)
    }

    /// Instantiate field `name` relative to `relative_to`, carrying the
    /// field's resolved type and cumulative byte offset.
    pub fn get_field(&self, name: &str, relative_to: Rc<Variable>) -> Result<Option<FieldInstance>> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Ok(Some(FieldInstance {
                    relative_to,
                    ty: field.get_type()?,
                    name: field.name.clone(),
                    index: field.index,
                    offset,
                }));
            }
            offset += field.size()?;
        }
        Ok(None)
    }
}

/// A field once it has been anchored to a concrete base variable (the
/// `relativeTo` back-reference in the original). This is a lookup relation,
/// not ownership, and is only ever built fresh for the duration of one
/// resolve/emit pass.
#[derive(Debug)]
pub struct FieldInstance {
    pub relative_to: Rc<Variable>,
    pub ty: Type,
    pub name: String,
    pub index: usize,
    pub offset: usize,
}

/// `[ByRef] name As Type` in a `Sub`/`Function` header.
#[derive(Debug)]
pub struct Parameter {
    pub ty: RefCell<TypeRef>,
    /// The effective type after `ByRef` wrapping has been applied.
    resolved: RefCell<Option<Type>>,
    pub by_ref: bool,
    pub name: String,
    pub index: usize,
}

impl Parameter {
    pub fn new(ty: impl Into<String>, by_ref: bool, name: impl Into<String>, index: usize) -> Self {
        Parameter {
            ty: RefCell::new(TypeRef::name(ty)),
            resolved: RefCell::new(None),
            by_ref,
            name: name.into(),
            index,
        }
    }

    pub fn resolve(&self, resolver: &Resolver) -> Result<()> {
        self.ty.borrow_mut().resolve(resolver)?;
        let base = self.ty.borrow().get()?;
        let effective = if self.by_ref {
            Type::Pointer(Box::new(base))
        } else {
            base
        };
        *self.resolved.borrow_mut() = Some(effective);
        Ok(())
    }

    pub fn get_type(&self) -> Result<Type> {
        self.resolved.borrow().clone().ok_or_else(|| {
            CompileError::NotResolved(format!("Parameter \"{}\" has not been resolved.", self.name))
        })
    }
}

/// `Dim name As Type [= literal]` inside a routine body.
#[derive(Debug)]
pub struct Local {
    pub ty: RefCell<TypeRef>,
    pub name: String,
    pub initial: Option<i64>,
}

impl Local {
    pub fn new(ty: impl Into<String>, name: impl Into<String>, initial: Option<i64>) -> Self {
        Local {
            ty: RefCell::new(TypeRef::name(ty)),
            name: name.into(),
            initial,
        }
    }

    pub fn resolve(&self, resolver: &Resolver) -> Result<()> {
        self.ty.borrow_mut().resolve(resolver)
    }

    pub fn get_type(&self) -> Result<Type> {
        self.ty.borrow().get()
    }
}

/// The implicit slot a `Function` writes its result into.
#[derive(Debug)]
pub struct ReturnVariable {
    pub ty: RefCell<TypeRef>,
}

impl ReturnVariable {
    pub fn new(ty: Type) -> Self {
        ReturnVariable {
            ty: RefCell::new(TypeRef::resolved(ty)),
        }
    }

    pub fn get_type(&self) -> Result<Type> {
        self.ty.borrow().get()
    }
}

/// A memory block with an address: a field, a parameter, a local, or the
/// implicit return slot.
#[derive(Debug)]
pub enum Variable {
    Field(FieldInstance),
    Parameter(Rc<Parameter>),
    Local(Rc<Local>),
    Return(Rc<ReturnVariable>),
}

impl Variable {
    pub fn name(&self) -> String {
        match self {
            Variable::Field(f) => f.name.clone(),
            Variable::Parameter(p) => p.name.clone(),
            Variable::Local(l) => l.name.clone(),
            Variable::Return(_) => String::new(),
        }
    }

    pub fn get_type(&self) -> Result<Type> {
        match self {
            Variable::Field(f) => Ok(f.ty.clone()),
            Variable::Parameter(p) => p.get_type(),
            Variable::Local(l) => l.get_type(),
            Variable::Return(r) => r.get_type(),
        }
    }

    pub fn size(&self) -> Result<usize> {
        self.get_type()?.size()
    }

    pub fn is_by_reference(&self) -> bool {
        matches!(self, Variable::Parameter(p) if p.by_ref)
    }

    /// The type field access walks against: for a `ByRef` parameter this is
    /// the pointee of the pointer type, otherwise the variable's own type.
    fn field_lookup_type(&self) -> Result<Type> {
        let ty = self.get_type()?;
        if self.is_by_reference() {
            match ty {
                Type::Pointer(inner) => Ok(*inner),
                other => Ok(other),
            }
        } else {
            Ok(ty)
        }
    }

    /// Resolve a dotted path (`"field.sub"`) rooted at `self` into a
    /// concrete [`Variable`].
    pub fn get_variable(self: &Rc<Self>, path: &str) -> Result<Rc<Variable>> {
        let ty = self.field_lookup_type()?;
        let complex = match ty {
            Type::Complex(c) => c,
            _ => return Err(CompileError::UndefinedVariable(path.to_string())),
        };
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let field = complex
            .get_field(head, Rc::clone(self))?
            .ok_or_else(|| CompileError::UndefinedVariable(path.to_string()))?;
        let field_var = Rc::new(Variable::Field(field));
        match rest {
            Some(r) => field_var.get_variable(r),
            None => Ok(field_var),
        }
    }
}

/// The emit-time context every expression/statement lowers against: the
/// enclosing callable. Needed for parameter offset computation (which
/// depends on argument count) and dotted-name lookup.
pub trait Context {
    fn name(&self) -> &str;
    fn argument_count(&self) -> usize;
    fn argument(&self, index: usize) -> Rc<Parameter>;
    fn local_count(&self) -> usize;
    fn local(&self, index: usize) -> Rc<Local>;
    fn return_type(&self) -> Result<Type>;
    fn get_variable(&self, path: &str) -> Result<Rc<Variable>>;
}

impl Parameter {
    pub fn emit_load_address(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        let mut offset = 2i64;
        for i in (self.index + 1..ctx.argument_count()).rev() {
            offset += ctx.argument(i).get_type()?.size()? as i64;
        }
        emitter.ld_bp()?;
        emitter.push(offset)?;
        emitter.add()?;
        if self.by_ref {
            // One dereference to turn the frame slot (which holds the
            // caller-supplied address) into the address of the referenced
            // value. The slot itself always holds exactly one word — a
            // pointer — regardless of the pointee's size, matching the
            // original's `self.GetSize()` here (the parameter's *effective*
            // type is `Pointer`, whose size is always 1).
            emitter.ld_ptr(self.get_type()?.size()?)?;
        }
        Ok(())
    }

    pub fn emit_load(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.emit_load_address(emitter, ctx)?;
        emitter.ld_ptr(self.get_type()?.size()?)
    }

    pub fn emit_store(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.emit_load_address(emitter, ctx)?;
        emitter.st_ptr(self.get_type()?.size()?)
    }
}

impl Local {
    pub fn emit_load_address(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        let mut offset = 0usize;
        for i in 0..ctx.local_count() {
            let local = ctx.local(i);
            offset += local.get_type()?.size()?;
            if std::ptr::eq(&*local, self) {
                break;
            }
        }
        emitter.ld_bp()?;
        emitter.push(offset as i64)?;
        emitter.sub()
    }

    pub fn emit_load(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.emit_load_address(emitter, ctx)?;
        emitter.ld_ptr(self.get_type()?.size()?)
    }

    pub fn emit_store(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.emit_load_address(emitter, ctx)?;
        emitter.st_ptr(self.get_type()?.size()?)
    }
}

impl ReturnVariable {
    pub fn emit_load_address(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        let mut offset = 2i64;
        for i in 0..ctx.argument_count() {
            offset += ctx.argument(i).get_type()?.size()? as i64;
        }
        emitter.ld_bp()?;
        emitter.push(offset)?;
        emitter.add()
    }

    pub fn emit_load(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        if self.get_type()?.size()? > 0 {
            self.emit_load_address(emitter, ctx)?;
            emitter.ld_ptr(self.get_type()?.size()?)?;
        }
        Ok(())
    }

    pub fn emit_store(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        if self.get_type()?.size()? > 0 {
            self.emit_load_address(emitter, ctx)?;
            emitter.st_ptr(self.get_type()?.size()?)?;
        }
        Ok(())
    }
}

impl FieldInstance {
    pub fn emit_load_address(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.relative_to.emit_load_address(emitter, ctx)?;
        emitter.push(self.offset as i64)?;
        emitter.add()
    }

    pub fn emit_load(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.emit_load_address(emitter, ctx)?;
        emitter.ld_ptr(self.ty.size()?)
    }

    pub fn emit_store(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        self.emit_load_address(emitter, ctx)?;
        emitter.st_ptr(self.ty.size()?)
    }
}

impl Variable {
    pub fn emit_load_address(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        match self {
            Variable::Field(f) => f.emit_load_address(emitter, ctx),
            Variable::Parameter(p) => p.emit_load_address(emitter, ctx),
            Variable::Local(l) => l.emit_load_address(emitter, ctx),
            Variable::Return(r) => r.emit_load_address(emitter, ctx),
        }
    }

    pub fn emit_load(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        match self {
            Variable::Field(f) => f.emit_load(emitter, ctx),
            Variable::Parameter(p) => p.emit_load(emitter, ctx),
            Variable::Local(l) => l.emit_load(emitter, ctx),
            Variable::Return(r) => r.emit_load(emitter, ctx),
        }
    }

    pub fn emit_store(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        match self {
            Variable::Field(f) => f.emit_store(emitter, ctx),
            Variable::Parameter(p) => p.emit_store(emitter, ctx),
            Variable::Local(l) => l.emit_store(emitter, ctx),
            Variable::Return(r) => r.emit_store(emitter, ctx),
        }
    }
}

/// Either a bare name awaiting resolution, or a resolved variable.
#[derive(Debug, Clone)]
pub enum VarTarget {
    Name(String),
    Resolved(Rc<Variable>),
}

impl VarTarget {
    pub fn name(&self) -> String {
        match self {
            VarTarget::Name(n) => n.clone(),
            VarTarget::Resolved(v) => v.name(),
        }
    }

    pub fn resolve(&mut self, ctx: &dyn Context) -> Result<()> {
        if let VarTarget::Name(n) = self {
            let v = ctx.get_variable(n)?;
            *self = VarTarget::Resolved(v);
        }
        Ok(())
    }

    pub fn get(&self) -> Result<Rc<Variable>> {
        match self {
            VarTarget::Resolved(v) => Ok(Rc::clone(v)),
            VarTarget::Name(n) => Err(CompileError::NotResolved(format!(
                "Variable \"{n}\" has not been resolved."
            ))),
        }
    }
}

/// Either a bare function name awaiting resolution, a resolved callable, or
/// the `ADDRESSOF` pseudo-call (which never resolves to a [`Callable`]).
#[derive(Debug, Clone)]
pub enum FnTarget {
    Name(String),
    Resolved(Rc<Callable>),
    AddressOf,
}

impl FnTarget {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("ADDRESSOF") {
            FnTarget::AddressOf
        } else {
            FnTarget::Name(name.to_string())
        }
    }

    pub fn resolve(&mut self, resolver: &Resolver) -> Result<()> {
        if let FnTarget::Name(n) = self {
            let f = resolver.get_function(n)?;
            *self = FnTarget::Resolved(f);
        }
        Ok(())
    }
}

/// An expression tree, as produced by the shunting-yard parser.
///
/// `Unary`/`Binary`/`Cast` nodes synthesize a [`CallExpr`] against the
/// mangled intrinsic name during resolution and cache it (mirroring the
/// original's `self._call`); `GetResultType`/`Emit` simply delegate to the
/// cached call afterwards. The operands handed to that synthesized call are
/// clones of the (already-resolved) operand expressions — resolution is
/// idempotent everywhere in this module, so re-resolving a clone is a no-op.
#[derive(Debug, Clone)]
pub enum Expression {
    Void,
    Constant(ConstantExpr),
    Variable(VariableExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Cast(CastExpr),
    Call(CallExpr),
}

#[derive(Debug, Clone)]
pub struct ConstantExpr {
    pub value: i64,
    pub ty: RefCell<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct VariableExpr {
    pub target: RefCell<VarTarget>,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: String,
    pub expr: Box<Expression>,
    call: RefCell<Option<Box<Expression>>>,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: String,
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
    call: RefCell<Option<Box<Expression>>>,
}

#[derive(Debug, Clone)]
pub struct CastExpr {
    pub ty: RefCell<TypeRef>,
    pub expr: Box<Expression>,
    call: RefCell<Option<Box<Expression>>>,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub target: RefCell<FnTarget>,
    pub args: Vec<Expression>,
}

/// Mangled intrinsic name template for each binary operator, matching the
/// original's `_operators` table (`__ADD_TYPE1_TYPE2`, etc).
pub fn operator_template(op: &str) -> Option<&'static str> {
    Some(match op.to_uppercase().as_str() {
        "+" => "__ADD_TYPE1_TYPE2",
        "-" => "__SUB_TYPE1_TYPE2",
        "*" => "__MUL_TYPE1_TYPE2",
        "/" => "__DIV_TYPE1_TYPE2",
        "<<" => "__LSHIFT_TYPE1_TYPE2",
        ">>" => "__RSHIFT_TYPE1_TYPE2",
        "AND" => "__AND_TYPE1_TYPE2",
        "OR" => "__OR_TYPE1_TYPE2",
        "XOR" => "__XOR_TYPE1_TYPE2",
        _ => return None,
    })
}

impl Expression {
    pub fn resolve(&self, resolver: &Resolver, ctx: &dyn Context) -> Result<()> {
        match self {
            Expression::Void => Ok(()),
            Expression::Constant(c) => c.ty.borrow_mut().resolve(resolver),
            Expression::Variable(v) => v.target.borrow_mut().resolve(ctx),
            Expression::Unary(u) => {
                u.expr.resolve(resolver, ctx)?;
                let name = u.operation_name()?;
                let call = Expression::Call(CallExpr {
                    target: RefCell::new(FnTarget::from_name(&name)),
                    args: vec![(*u.expr).clone()],
                });
                call.resolve(resolver, ctx)?;
                *u.call.borrow_mut() = Some(Box::new(call));
                Ok(())
            }
            Expression::Binary(b) => {
                b.lhs.resolve(resolver, ctx)?;
                b.rhs.resolve(resolver, ctx)?;
                let name = b.operation_name()?;
                let call = Expression::Call(CallExpr {
                    target: RefCell::new(FnTarget::from_name(&name)),
                    args: vec![(*b.lhs).clone(), (*b.rhs).clone()],
                });
                call.resolve(resolver, ctx)?;
                *b.call.borrow_mut() = Some(Box::new(call));
                Ok(())
            }
            Expression::Cast(c) => {
                c.ty.borrow_mut().resolve(resolver)?;
                c.expr.resolve(resolver, ctx)?;
                let name = c.operation_name()?;
                let call = Expression::Call(CallExpr {
                    target: RefCell::new(FnTarget::from_name(&name)),
                    args: vec![(*c.expr).clone()],
                });
                call.resolve(resolver, ctx)?;
                *c.call.borrow_mut() = Some(Box::new(call));
                Ok(())
            }
            Expression::Call(c) => c.resolve(resolver, ctx),
        }
    }

    pub fn result_type(&self) -> Result<Type> {
        match self {
            Expression::Void => Ok(Type::Void),
            Expression::Constant(c) => c.ty.borrow().get(),
            Expression::Variable(v) => v.target.borrow().get()?.get_type(),
            Expression::Unary(u) => u.call_ref()?.result_type(),
            Expression::Binary(b) => b.call_ref()?.result_type(),
            Expression::Cast(c) => c.call_ref()?.result_type(),
            Expression::Call(c) => c.result_type(),
        }
    }

    pub fn emit(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        match self {
            Expression::Void => Ok(()),
            Expression::Constant(c) => emitter.push(c.value),
            Expression::Variable(v) => v.target.borrow().get()?.emit_load(emitter, ctx),
            Expression::Unary(u) => u.call_ref()?.emit(emitter, ctx),
            Expression::Binary(b) => b.call_ref()?.emit(emitter, ctx),
            Expression::Cast(c) => c.call_ref()?.emit(emitter, ctx),
            Expression::Call(c) => c.emit(emitter, ctx),
        }
    }
}

/// Borrow the call synthesized during `resolve`, failing if resolution has
/// not run yet.
fn call_ref(
    cell: &RefCell<Option<Box<Expression>>>,
) -> Result<std::cell::Ref<'_, Expression>> {
    std::cell::Ref::filter_map(cell.borrow(), |o| o.as_deref())
        .map_err(|_| CompileError::NotResolved("Expression has not been resolved.".to_string()))
}

impl UnaryExpr {
    pub fn new(op: impl Into<String>, expr: Expression) -> Self {
        UnaryExpr {
            op: op.into(),
            expr: Box::new(expr),
            call: RefCell::new(None),
        }
    }

    fn operation_name(&self) -> Result<String> {
        let ty = self.expr.result_type()?;
        let template = operator_template(&self.op)
            .ok_or_else(|| CompileError::Parse(format!("Unknown operator \"{}\".", self.op)))?;
        Ok(template.replace("TYPE1", &ty.name()))
    }

    fn call_ref(&self) -> Result<std::cell::Ref<'_, Expression>> {
        call_ref(&self.call)
    }
}

impl BinaryExpr {
    pub fn new(op: impl Into<String>, lhs: Expression, rhs: Expression) -> Self {
        BinaryExpr {
            op: op.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            call: RefCell::new(None),
        }
    }

    fn operation_name(&self) -> Result<String> {
        let a = self.lhs.result_type()?;
        let b = self.rhs.result_type()?;
        let template = operator_template(&self.op)
            .ok_or_else(|| CompileError::Parse(format!("Unknown operator \"{}\".", self.op)))?;
        Ok(template.replace("TYPE1", &a.name()).replace("TYPE2", &b.name()))
    }

    fn call_ref(&self) -> Result<std::cell::Ref<'_, Expression>> {
        call_ref(&self.call)
    }
}

impl CastExpr {
    pub fn new(ty: impl Into<String>, expr: Expression) -> Self {
        CastExpr {
            ty: RefCell::new(TypeRef::name(ty)),
            expr: Box::new(expr),
            call: RefCell::new(None),
        }
    }

    fn operation_name(&self) -> Result<String> {
        let from = self.expr.result_type()?;
        let to = self.ty.borrow().get()?;
        Ok(format!("__CAST_{}_{}", from.name(), to.name()))
    }

    fn call_ref(&self) -> Result<std::cell::Ref<'_, Expression>> {
        call_ref(&self.call)
    }
}

impl CallExpr {
    pub fn new(target_name: &str, args: Vec<Expression>) -> Self {
        CallExpr {
            target: RefCell::new(FnTarget::from_name(target_name)),
            args,
        }
    }

    pub fn resolve(&self, resolver: &Resolver, ctx: &dyn Context) -> Result<()> {
        for arg in &self.args {
            arg.resolve(resolver, ctx)?;
        }
        let is_addressof = matches!(&*self.target.borrow(), FnTarget::AddressOf);
        if !is_addressof {
            self.target.borrow_mut().resolve(resolver)?;
        }
        Ok(())
    }

    fn addressof_type(&self) -> Result<Type> {
        match self.args.first() {
            None => Ok(Type::Pointer(Box::new(Type::Void))),
            Some(arg) => Ok(Type::Pointer(Box::new(arg.result_type()?))),
        }
    }

    pub fn result_type(&self) -> Result<Type> {
        match &*self.target.borrow() {
            FnTarget::AddressOf => self.addressof_type(),
            FnTarget::Resolved(c) => c.return_type(),
            FnTarget::Name(n) => Err(CompileError::NotResolved(format!(
                "Function \"{n}\" is not resolved."
            ))),
        }
    }

    pub fn emit(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        let target = self.target.borrow().clone();
        match target {
            FnTarget::AddressOf => {
                if self.args.len() != 1 {
                    return Err(CompileError::Lowering(
                        "Expected 1 operand for \"ADDRESSOF\" operator.".to_string(),
                    ));
                }
                let expr = &self.args[0];
                match expr {
                    Expression::Variable(v) => {
                        v.target.borrow().get()?.emit_load_address(emitter, ctx)
                    }
                    _ => Err(CompileError::Lowering(
                        "Expression does not have an address.".to_string(),
                    )),
                }
            }
            FnTarget::Name(n) => Err(CompileError::NotResolved(format!(
                "Function \"{n}\" is not resolved."
            ))),
            FnTarget::Resolved(target) => {
                if target.is_inline() {
                    for arg in &self.args {
                        arg.emit(emitter, ctx)?;
                    }
                    target.emit_inline(emitter)
                } else {
                    // Reserve the return slot before evaluating arguments so
                    // later offsets stay stable (spec Open Question: the
                    // original has these in the opposite, offset-shifting
                    // order in one code path; we fix that here).
                    let return_size = target.return_type()?.size()?;
                    if return_size > 0 {
                        emitter.add_sp(return_size)?;
                    }
                    let mut size = 0;
                    for arg in &self.args {
                        arg.emit(emitter, ctx)?;
                        size += arg.result_type()?.size()?;
                    }
                    emitter.call(target.name())?;
                    if size > 0 {
                        emitter.rem_sp(size)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

/// `DIM`, assignment, `RETURN`, a bare call, and the three `ASM` forms.
#[derive(Debug)]
pub enum Statement {
    Local(Rc<Local>),
    Assign(AssignStatement),
    Return(ReturnStatement),
    Call(CallExpr),
    AsmLoad(RefCell<VarTarget>),
    AsmStore(RefCell<VarTarget>),
    AsmInstr(AsmInstrStatement),
}

#[derive(Debug)]
pub struct AssignStatement {
    pub target: RefCell<VarTarget>,
    pub expr: Expression,
}

#[derive(Debug)]
pub struct ReturnStatement {
    pub expr: Expression,
}

#[derive(Debug)]
pub struct AsmInstrStatement {
    pub op: String,
    pub operands: Vec<String>,
}

impl Statement {
    /// The `Dim` locals this statement declares (only `Local` ever does).
    pub fn locals(&self) -> Vec<Rc<Local>> {
        match self {
            Statement::Local(l) => vec![Rc::clone(l)],
            _ => vec![],
        }
    }

    pub fn resolve(&self, resolver: &Resolver, ctx: &dyn Context) -> Result<()> {
        match self {
            Statement::Local(l) => l.resolve(resolver),
            Statement::Assign(a) => {
                a.target.borrow_mut().resolve(ctx)?;
                a.expr.resolve(resolver, ctx)
            }
            Statement::Return(r) => r.expr.resolve(resolver, ctx),
            Statement::Call(c) => c.resolve(resolver, ctx),
            Statement::AsmLoad(source) | Statement::AsmStore(source) => source.borrow_mut().resolve(ctx),
            Statement::AsmInstr(_) => Ok(()),
        }
    }

    pub fn emit(&self, emitter: &mut dyn crate::middle::Emitter, ctx: &dyn Context) -> Result<()> {
        match self {
            Statement::Local(_) => Ok(()),
            Statement::Assign(a) => {
                a.expr.emit(emitter, ctx)?;
                a.target.borrow().get()?.emit_store(emitter, ctx)
            }
            Statement::Return(r) => {
                if r.expr.result_type()? != ctx.return_type()? {
                    return Err(CompileError::ReturnTypeMismatch);
                }
                r.expr.emit(emitter, ctx)?;
                ReturnVariable::new(r.expr.result_type()?).emit_store(emitter, ctx)?;
                emitter.jmp(&format!("__{}__return", ctx.name()))
            }
            Statement::Call(c) => {
                c.emit(emitter, ctx)?;
                let size = c.result_type()?.size()?;
                if size > 0 {
                    emitter.rem_sp(size)?;
                }
                Ok(())
            }
            Statement::AsmLoad(source) => source.borrow().get()?.emit_load(emitter, ctx),
            Statement::AsmStore(source) => source.borrow().get()?.emit_store(emitter, ctx),
            Statement::AsmInstr(instr) => emitter.emit_raw(&instr.op, &instr.operands),
        }
    }
}

/// A user-defined `Sub`, `Function`, or a built-in `InlineBody` (no frame,
/// spliced directly into the call site).
#[derive(Debug)]
pub enum Callable {
    Sub(SubRoutine),
    Function(Func),
    Inline(InlineBody),
}

#[derive(Debug)]
pub struct SubRoutine {
    pub name: String,
    pub params: Vec<Rc<Parameter>>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub struct Func {
    pub name: String,
    pub params: Vec<Rc<Parameter>>,
    pub return_type: RefCell<TypeRef>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub struct InlineBody {
    pub name: String,
    pub return_type: RefCell<TypeRef>,
    pub body: Vec<Statement>,
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Sub(s) => &s.name,
            Callable::Function(f) => &f.name,
            Callable::Inline(i) => &i.name,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Callable::Inline(_))
    }

    fn params(&self) -> &[Rc<Parameter>] {
        match self {
            Callable::Sub(s) => &s.params,
            Callable::Function(f) => &f.params,
            Callable::Inline(_) => &[],
        }
    }

    fn statements(&self) -> &[Statement] {
        match self {
            Callable::Sub(s) => &s.body,
            Callable::Function(f) => &f.body,
            Callable::Inline(i) => &i.body,
        }
    }

    fn locals(&self) -> Vec<Rc<Local>> {
        self.statements().iter().flat_map(|s| s.locals()).collect()
    }

    pub fn arguments_size(&self) -> Result<usize> {
        let mut total = 0;
        for p in self.params() {
            total += p.get_type()?.size()?;
        }
        Ok(total)
    }

    pub fn locals_size(&self) -> Result<usize> {
        let mut total = 0;
        for l in self.locals() {
            total += l.get_type()?.size()?;
        }
        Ok(total)
    }

    pub fn resolve(&self, resolver: &Resolver) -> Result<()> {
        log::trace!("resolving callable \"{}\"", self.name());
        match self {
            Callable::Sub(s) => {
                for p in &s.params {
                    p.resolve(resolver)?;
                }
                for st in &s.body {
                    st.resolve(resolver, self)?;
                }
            }
            Callable::Function(f) => {
                f.return_type.borrow_mut().resolve(resolver)?;
                for p in &f.params {
                    p.resolve(resolver)?;
                }
                for st in &f.body {
                    st.resolve(resolver, self)?;
                }
            }
            Callable::Inline(i) => {
                i.return_type.borrow_mut().resolve(resolver)?;
                for st in &i.body {
                    st.resolve(resolver, self)?;
                }
            }
        }
        Ok(())
    }

    /// Push old BP, open the frame, reserve/initialize locals, emit the
    /// body, mark the return label, close the frame, `ret`. Only called for
    /// `Sub`/`Function`; `InlineBody` is spliced via `emit_inline` instead.
    pub fn emit(&self, emitter: &mut dyn crate::middle::Emitter) -> Result<()> {
        if self.is_inline() {
            return self.emit_inline(emitter);
        }
        let label = emitter.create_label(self.name());
        emitter.mark_label(&label)?;
        emitter.ld_bp()?;
        emitter.ld_sp()?;
        emitter.st_bp()?;
        for local in self.locals() {
            match local.initial {
                None => emitter.add_sp(local.get_type()?.size()?)?,
                Some(value) => {
                    for _ in 0..local.get_type()?.size()? {
                        emitter.push(value)?;
                    }
                }
            }
        }
        for statement in self.statements() {
            statement.emit(emitter, self)?;
        }
        let return_label = emitter.create_label(&format!("__{}__return", self.name()));
        emitter.mark_label(&return_label)?;
        emitter.ld_bp()?;
        emitter.st_sp()?;
        emitter.st_bp()?;
        emitter.ret()
    }

    /// No prologue/epilogue, no label: statements run directly in the
    /// caller's stream against the already-pushed argument values.
    pub fn emit_inline(&self, emitter: &mut dyn crate::middle::Emitter) -> Result<()> {
        for statement in self.statements() {
            statement.emit(emitter, self)?;
        }
        Ok(())
    }
}

impl Context for Callable {
    fn name(&self) -> &str {
        Callable::name(self)
    }

    fn argument_count(&self) -> usize {
        self.params().len()
    }

    fn argument(&self, index: usize) -> Rc<Parameter> {
        Rc::clone(&self.params()[index])
    }

    fn local_count(&self) -> usize {
        self.locals().len()
    }

    fn local(&self, index: usize) -> Rc<Local> {
        Rc::clone(&self.locals()[index])
    }

    fn return_type(&self) -> Result<Type> {
        match self {
            Callable::Sub(_) => Ok(Type::Void),
            Callable::Function(f) => f.return_type.borrow().get(),
            Callable::Inline(i) => i.return_type.borrow().get(),
        }
    }

    /// Locals are searched before arguments, matching the original's
    /// `Callable.GetVariable`.
    fn get_variable(&self, path: &str) -> Result<Rc<Variable>> {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        for local in self.locals() {
            if local.name == head {
                let var = Rc::new(Variable::Local(local));
                return match rest {
                    Some(r) => var.get_variable(r),
                    None => Ok(var),
                };
            }
        }
        for param in self.params() {
            if param.name == head {
                let var = Rc::new(Variable::Parameter(Rc::clone(param)));
                return match rest {
                    Some(r) => var.get_variable(r),
                    None => Ok(var),
                };
            }
        }
        Err(CompileError::UndefinedVariable(path.to_string()))
    }
}

/// A source file's declared composite types and top-level callables.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub types: Vec<Rc<ComplexType>>,
    pub code: Vec<Rc<Callable>>,
}

impl Module {
    pub fn new(name: impl Into<String>, types: Vec<Rc<ComplexType>>, code: Vec<Rc<Callable>>) -> Self {
        Module {
            name: name.into(),
            types,
            code,
        }
    }

    pub fn resolve(&self, resolver: &Resolver) -> Result<()> {
        for ty in &self.types {
            ty.resolve(resolver)?;
        }
        for callable in &self.code {
            callable.resolve(resolver)?;
        }
        Ok(())
    }

    pub fn emit(&self, emitter: &mut dyn crate::middle::Emitter) -> Result<()> {
        for callable in &self.code {
            callable.emit(emitter)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::resolve::Resolver;
    use crate::middle::{Emitter, Label};

    /// Records every op it's asked to perform as a flat token trace, so
    /// frame-offset arithmetic (spec invariant 3: parameter/return-slot
    /// offsets from BP) can be asserted directly without going through the
    /// URCL back end or peephole optimizer.
    #[derive(Default)]
    struct Trace(Vec<String>);

    impl Emitter for Trace {
        fn emit_raw(&mut self, op: &str, operands: &[String]) -> Result<()> {
            self.0.push(format!("{op} {}", operands.join(" ")));
            Ok(())
        }
        fn comment(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn push(&mut self, immediate: i64) -> Result<()> {
            self.0.push(format!("push {immediate}"));
            Ok(())
        }
        fn pop(&mut self) -> Result<()> {
            self.0.push("pop".to_string());
            Ok(())
        }
        fn add(&mut self) -> Result<()> {
            self.0.push("add".to_string());
            Ok(())
        }
        fn sub(&mut self) -> Result<()> {
            self.0.push("sub".to_string());
            Ok(())
        }
        fn mul_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn mul_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn div_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn div_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn rem_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn rem_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn bit_not(&mut self) -> Result<()> {
            Ok(())
        }
        fn bit_and(&mut self) -> Result<()> {
            Ok(())
        }
        fn bit_or(&mut self) -> Result<()> {
            Ok(())
        }
        fn bit_xor(&mut self) -> Result<()> {
            Ok(())
        }
        fn lsh(&mut self) -> Result<()> {
            Ok(())
        }
        fn rsh(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_eq(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_ne(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_lt_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_lt_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_gt_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_gt_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_le_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_le_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_ge_s(&mut self) -> Result<()> {
            Ok(())
        }
        fn cmp_ge_u(&mut self) -> Result<()> {
            Ok(())
        }
        fn call(&mut self, target: &str) -> Result<()> {
            self.0.push(format!("call {target}"));
            Ok(())
        }
        fn ret(&mut self) -> Result<()> {
            self.0.push("ret".to_string());
            Ok(())
        }
        fn jmp(&mut self, target: &str) -> Result<()> {
            self.0.push(format!("jmp {target}"));
            Ok(())
        }
        fn br_t(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_f(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_eq(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_ne(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_lt_s(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_lt_u(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_gt_s(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_gt_u(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_le_s(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_le_u(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_ge_s(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn br_ge_u(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn add_sp(&mut self, offset: usize) -> Result<()> {
            self.0.push(format!("add_sp {offset}"));
            Ok(())
        }
        fn rem_sp(&mut self, offset: usize) -> Result<()> {
            self.0.push(format!("rem_sp {offset}"));
            Ok(())
        }
        fn ld_sp(&mut self) -> Result<()> {
            Ok(())
        }
        fn st_sp(&mut self) -> Result<()> {
            Ok(())
        }
        fn ld_bp(&mut self) -> Result<()> {
            self.0.push("ld_bp".to_string());
            Ok(())
        }
        fn st_bp(&mut self) -> Result<()> {
            Ok(())
        }
        fn ld_global(&mut self, _: usize) -> Result<()> {
            Ok(())
        }
        fn st_global(&mut self, _: usize) -> Result<()> {
            Ok(())
        }
        fn ld_ptr(&mut self, size: usize) -> Result<()> {
            self.0.push(format!("ld_ptr {size}"));
            Ok(())
        }
        fn st_ptr(&mut self, size: usize) -> Result<()> {
            self.0.push(format!("st_ptr {size}"));
            Ok(())
        }
        fn get_current_offset(&self) -> usize {
            0
        }
        fn mark_label(&mut self, _: &Label) -> Result<()> {
            Ok(())
        }
    }

    fn resolved_function(params: Vec<(&str, bool)>, ret: Type) -> Callable {
        let params: Vec<Rc<Parameter>> = params
            .into_iter()
            .enumerate()
            .map(|(i, (name, by_ref))| Rc::new(Parameter::new("Integer", by_ref, name, i)))
            .collect();
        let func = Callable::Function(Func {
            name: "F".to_string(),
            params,
            return_type: RefCell::new(TypeRef::resolved(ret)),
            body: vec![],
        });
        let mut resolver = Resolver::new();
        resolver.register_type(Type::Integer);
        resolver.register_type(Type::UInteger);
        func.resolve(&resolver).unwrap();
        func
    }

    /// Spec invariant 3: offset(p_i) = 2 + sum of sizes of params after i;
    /// with two `Integer` (size-1) parameters, the last param sits at BP+2
    /// and the first at BP+3.
    #[test]
    fn parameter_offsets_follow_the_right_to_left_rule() {
        let func = resolved_function(vec![("a", false), ("b", false)], Type::Integer);
        let (Callable::Function(Func { params, .. })) = &func else {
            unreachable!()
        };

        let mut trace = Trace::default();
        params[0].emit_load_address(&mut trace, &func).unwrap();
        assert_eq!(trace.0, vec!["ld_bp".to_string(), "push 3".to_string(), "add".to_string()]);

        let mut trace = Trace::default();
        params[1].emit_load_address(&mut trace, &func).unwrap();
        assert_eq!(trace.0, vec!["ld_bp".to_string(), "push 2".to_string(), "add".to_string()]);
    }

    /// Spec invariant 3: the return slot sits at `2 + sum(param sizes)` —
    /// directly above every parameter.
    #[test]
    fn return_slot_offset_is_past_every_parameter() {
        let func = resolved_function(vec![("a", false), ("b", false)], Type::Integer);
        let ret = ReturnVariable::new(Type::Integer);
        let mut trace = Trace::default();
        ret.emit_load_address(&mut trace, &func).unwrap();
        assert_eq!(trace.0, vec!["ld_bp".to_string(), "push 4".to_string(), "add".to_string()]);
    }

    /// A `ByRef` parameter's effective type is `Pointer(T)` (size always 1,
    /// regardless of `T`): both the in-address dereference and `EmitLoad`'s
    /// own final `ld_ptr` size off of that effective type, so loading one
    /// emits two `ld_ptr 1`s rather than one `ld_ptr 1` followed by
    /// `ld_ptr(T.size())` — a faithful port of the original's
    /// `EmitLoad`/`EmitLoadAddress` pair, both of which call `self.GetSize()`.
    #[test]
    fn byref_parameter_loads_through_exactly_one_pointer_dereference() {
        let func = resolved_function(vec![("p", true)], Type::Integer);
        let (Callable::Function(Func { params, .. })) = &func else {
            unreachable!()
        };
        assert_eq!(params[0].get_type().unwrap(), Type::Pointer(Box::new(Type::Integer)));

        let mut trace = Trace::default();
        params[0].emit_load(&mut trace, &func).unwrap();
        assert_eq!(
            trace.0,
            vec![
                "ld_bp".to_string(),
                "push 2".to_string(),
                "add".to_string(),
                "ld_ptr 1".to_string(),
                "ld_ptr 1".to_string(),
            ]
        );
    }

    /// Spec invariant 4: local offsets accumulate left-to-right in
    /// declaration order, with BP pointing just above the first local.
    #[test]
    fn local_offsets_accumulate_left_to_right() {
        let a = Rc::new(Local::new("Integer", "a", None));
        let b = Rc::new(Local::new("Integer", "b", None));
        let mut resolver = Resolver::new();
        resolver.register_type(Type::Integer);
        a.resolve(&resolver).unwrap();
        b.resolve(&resolver).unwrap();

        struct Ctx(Vec<Rc<Local>>);
        impl Context for Ctx {
            fn name(&self) -> &str {
                "F"
            }
            fn argument_count(&self) -> usize {
                0
            }
            fn argument(&self, _: usize) -> Rc<Parameter> {
                unreachable!()
            }
            fn local_count(&self) -> usize {
                self.0.len()
            }
            fn local(&self, index: usize) -> Rc<Local> {
                Rc::clone(&self.0[index])
            }
            fn return_type(&self) -> Result<Type> {
                Ok(Type::Void)
            }
            fn get_variable(&self, _: &str) -> Result<Rc<Variable>> {
                unreachable!()
            }
        }
        let ctx = Ctx(vec![Rc::clone(&a), Rc::clone(&b)]);

        let mut trace = Trace::default();
        a.emit_load_address(&mut trace, &ctx).unwrap();
        assert_eq!(trace.0, vec!["ld_bp".to_string(), "push 1".to_string(), "sub".to_string()]);

        let mut trace = Trace::default();
        b.emit_load_address(&mut trace, &ctx).unwrap();
        assert_eq!(trace.0, vec!["ld_bp".to_string(), "push 2".to_string(), "sub".to_string()]);
    }
}
