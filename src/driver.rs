//! Glue between the front end, the resolver, and a back end: reading
//! source modules, seeding the shared built-in table, and driving the
//! parse → resolve → emit → commit pipeline.
//!
//! Grounded in `original_source/gb.py`: the default intrinsic table below
//! is its `defaultTypes`/`defaultFunctions` list, carried over verbatim
//! (operator/cast bodies, mnemonics and all). One divergence from `gb.py`
//! is deliberate: the original builds one `Resolver` per module (each
//! module only sees its own declarations plus the built-ins, so one
//! module can never call into another's subroutines); here all modules
//! share a single `Resolver`, so declarations are visible crate-wide
//! before any module emits (see DESIGN.md).

use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use crate::back::UrclEmitter;
use crate::common::{CompileError, Result};
use crate::front::{
    parse_module, AsmInstrStatement, Callable, InlineBody, Module, Resolver, Statement, Type,
    TypeRef,
};

/// Where a module's source text and name come from.
pub trait SourceReader {
    fn module_name(&self) -> &str;
    fn lines(&self) -> Result<Vec<String>>;
}

/// Where the committed URCL text goes. Blanket-implemented for anything
/// that already implements [`Write`], so a `File`, a `Vec<u8>`, or a test
/// buffer all work without a wrapper type.
pub trait OutputSink: Write {}
impl<T: Write> OutputSink for T {}

fn validate_module_name(name: &str) -> Result<()> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[A-Za-z_]\w*$").unwrap());
    if re.is_match(name) {
        Ok(())
    } else {
        Err(CompileError::Parse(format!("Invalid module name \"{name}\".")))
    }
}

/// Reads a module's source from a file, deriving the module name from
/// the file's stem (extension stripped, directory components dropped),
/// matching `parse_file`.
pub struct FileSourceReader {
    path: PathBuf,
    name: String,
}

impl FileSourceReader {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CompileError::Parse(format!("Invalid input path \"{}\".", path.display())))?
            .to_string();
        validate_module_name(&stem)?;
        Ok(FileSourceReader { path, name: stem })
    }
}

impl SourceReader for FileSourceReader {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn lines(&self) -> Result<Vec<String>> {
        let text = fs::read_to_string(&self.path)?;
        Ok(text.lines().map(|l| l.to_string()).collect())
    }
}

/// Build an `AsmInstrStatement` body: raw URCL lines spliced into the
/// caller's instruction stream at the call site.
fn raw(op: &str, operands: &[&str]) -> Statement {
    Statement::AsmInstr(AsmInstrStatement {
        op: op.to_string(),
        operands: operands.iter().map(|s| s.to_string()).collect(),
    })
}

fn binary_intrinsic(name: &str, ty: Type, mnemonic: &str) -> Rc<Callable> {
    Rc::new(Callable::Inline(InlineBody {
        name: name.to_string(),
        return_type: RefCell::new(TypeRef::resolved(ty)),
        body: vec![
            raw("pop", &["R2"]),
            raw("pop", &["R1"]),
            raw(mnemonic, &["R1", "R1", "R2"]),
            raw("psh", &["R1"]),
        ],
    }))
}

fn cast_intrinsic(name: &str, ty: Type) -> Rc<Callable> {
    Rc::new(Callable::Inline(InlineBody {
        name: name.to_string(),
        return_type: RefCell::new(TypeRef::resolved(ty)),
        body: vec![],
    }))
}

/// The full default intrinsic table: nine binary operators over
/// `{Integer, UInteger}`, plus both integer/unsigned casts. Signed
/// division is the one operator the language spec forbids lowering
/// directly (`Emitter::div_s` always errors) yet this table still wires
/// one up, exactly as `gb.py` does — `__DIV_Integer_Integer` reaches the
/// hardware `sdiv` instruction directly as a raw intrinsic body, bypassing
/// the `Emitter` trait entirely rather than going through `div_s`.
pub fn default_intrinsics() -> Vec<Rc<Callable>> {
    vec![
        cast_intrinsic("__CAST_Integer_UInteger", Type::UInteger),
        cast_intrinsic("__CAST_UInteger_Integer", Type::Integer),
        binary_intrinsic("__ADD_Integer_Integer", Type::Integer, "add"),
        binary_intrinsic("__SUB_Integer_Integer", Type::Integer, "sub"),
        binary_intrinsic("__MUL_Integer_Integer", Type::Integer, "mul"),
        binary_intrinsic("__DIV_Integer_Integer", Type::Integer, "sdiv"),
        binary_intrinsic("__LSHIFT_Integer_Integer", Type::Integer, "sbsl"),
        binary_intrinsic("__RSHIFT_Integer_Integer", Type::Integer, "sbsr"),
        binary_intrinsic("__AND_Integer_Integer", Type::Integer, "and"),
        binary_intrinsic("__OR_Integer_Integer", Type::Integer, "or"),
        binary_intrinsic("__XOR_Integer_Integer", Type::Integer, "xor"),
        binary_intrinsic("__ADD_UInteger_UInteger", Type::UInteger, "add"),
        binary_intrinsic("__SUB_UInteger_UInteger", Type::UInteger, "sub"),
        binary_intrinsic("__MUL_UInteger_UInteger", Type::UInteger, "mul"),
        binary_intrinsic("__DIV_UInteger_UInteger", Type::UInteger, "div"),
        binary_intrinsic("__LSHIFT_UInteger_UInteger", Type::UInteger, "bsl"),
        binary_intrinsic("__RSHIFT_UInteger_UInteger", Type::UInteger, "bsr"),
        binary_intrinsic("__AND_UInteger_UInteger", Type::UInteger, "and"),
        binary_intrinsic("__OR_UInteger_UInteger", Type::UInteger, "or"),
        binary_intrinsic("__XOR_UInteger_UInteger", Type::UInteger, "xor"),
    ]
}

/// Owns the set of input modules and drives them through parse, resolve
/// and emission against a fresh [`UrclEmitter`].
pub struct Driver {
    sources: Vec<Box<dyn SourceReader>>,
}

impl Driver {
    pub fn new(sources: Vec<Box<dyn SourceReader>>) -> Self {
        Driver { sources }
    }

    /// Parse every module, resolve them all against one shared table
    /// seeded with the built-in types and intrinsics, then emit every
    /// module's callables into one `UrclEmitter` and commit the result.
    ///
    /// Resolving every module before any of them emit (rather than
    /// interleaving resolve/emit per module) is what lets one module call
    /// into a callable declared in another.
    pub fn compile<W: OutputSink>(&self, output: &mut W) -> Result<()> {
        let mut modules = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            log::debug!("parsing module \"{}\"", source.module_name());
            let lines = source.lines()?;
            modules.push(parse_module(source.module_name(), &lines)?);
        }

        let mut resolver = Resolver::new();
        resolver.register_type(Type::Void);
        resolver.register_type(Type::Integer);
        resolver.register_type(Type::UInteger);
        for intrinsic in default_intrinsics() {
            resolver.register_function(intrinsic);
        }
        for module in &modules {
            register_module(module, &mut resolver);
        }

        for module in &modules {
            module.resolve(&resolver)?;
            log::debug!("resolved module \"{}\"", module.name);
        }

        let mut emitter = UrclEmitter::new();
        for module in &modules {
            module.emit(&mut emitter)?;
        }
        emitter.commit(output)
    }
}

fn register_module(module: &Module, resolver: &mut Resolver) {
    for ty in &module.types {
        resolver.register_complex_type(ty);
    }
    for callable in &module.code {
        resolver.register_function(Rc::clone(callable));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InMemorySource {
        name: String,
        text: String,
    }

    impl SourceReader for InMemorySource {
        fn module_name(&self) -> &str {
            &self.name
        }

        fn lines(&self) -> Result<Vec<String>> {
            Ok(self.text.lines().map(|l| l.to_string()).collect())
        }
    }

    fn source(name: &str, text: &str) -> Box<dyn SourceReader> {
        Box::new(InMemorySource {
            name: name.to_string(),
            text: text.to_string(),
        })
    }

    #[test]
    fn compiles_a_function_calling_a_default_intrinsic() {
        let driver = Driver::new(vec![source(
            "M",
            "Function Add(a As Integer, b As Integer) As Integer\n  Return a + b\nEnd Function",
        )]);
        let mut out = Vec::new();
        driver.compile(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(".Add"));
        assert!(text.contains("ret"));
    }

    #[test]
    fn calling_an_undeclared_function_is_an_undefined_function_error() {
        let driver = Driver::new(vec![source(
            "M",
            "Function Bad(a As Integer) As Integer\n  Return NoSuchFunction(a)\nEnd Function",
        )]);
        let mut out = Vec::new();
        let err = driver.compile(&mut out).unwrap_err();
        assert!(matches!(err, CompileError::UndefinedFunction(_)));
    }

    #[test]
    fn a_module_can_call_a_callable_declared_in_another_module() {
        let driver = Driver::new(vec![
            source(
                "Helper",
                "Function Double(a As Integer) As Integer\n  Return a + a\nEnd Function",
            ),
            source(
                "Main",
                "Function Quadruple(a As Integer) As Integer\n  Return Double(Double(a))\nEnd Function",
            ),
        ]);
        let mut out = Vec::new();
        driver.compile(&mut out).unwrap();
    }

    #[test]
    fn byref_parameter_dereferences_exactly_once_regardless_of_pointee_size() {
        // `Out` is `ByRef`, so its frame slot holds a single-word pointer;
        // `Set` must dereference that one word to find the target address,
        // then store through it — not read `Point`'s full size out of the
        // slot itself.
        let driver = Driver::new(vec![source(
            "M",
            "Structure Point\n  Dim X As Integer\n  Dim Y As Integer\nEnd Structure\n\
             Sub SetX(ByRef p As Point, v As Integer)\n  p.X = v\nEnd Sub",
        )]);
        let mut out = Vec::new();
        driver.compile(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(".SetX"));
        // The by-ref dereference loads exactly one word (`lod`/single pop),
        // never the two words `Point` itself would take.
        assert!(text.contains("lod"));
    }

    #[test]
    fn module_names_must_start_with_a_letter_or_underscore() {
        assert!(validate_module_name("Main").is_ok());
        assert!(validate_module_name("_ok").is_ok());
        assert!(validate_module_name("9ok").is_err());
        assert!(validate_module_name("").is_err());
    }

    #[test]
    fn returning_a_value_of_the_wrong_type_is_a_type_error() {
        let driver = Driver::new(vec![source(
            "M",
            "Function F() As Integer\n  Return 1 AS UInteger\nEnd Function",
        )]);
        let mut out = Vec::new();
        let err = driver.compile(&mut out).unwrap_err();
        assert!(matches!(err, CompileError::ReturnTypeMismatch));
    }

    #[test]
    fn signed_division_reaches_the_committed_output_via_its_spliced_intrinsic() {
        // `div_s` on the `Emitter` trait is fatal (see back::urcl tests), but
        // `__DIV_Integer_Integer`'s body bypasses it entirely and splices a
        // raw `sdiv` instruction, so a plain `Integer / Integer` still
        // compiles.
        let driver = Driver::new(vec![source(
            "M",
            "Function F(a As Integer, b As Integer) As Integer\n  Return a / b\nEnd Function",
        )]);
        let mut out = Vec::new();
        driver.compile(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("sdiv R1 R1 R2"));
    }

    #[test]
    fn subtracting_two_pointers_with_no_registered_intrinsic_is_undefined_function() {
        let driver = Driver::new(vec![source(
            "M",
            "Function F(a As UInteger*, b As UInteger*) As UInteger*\n  Return a - b\nEnd Function",
        )]);
        let mut out = Vec::new();
        let err = driver.compile(&mut out).unwrap_err();
        match err {
            CompileError::UndefinedFunction(name) => {
                assert_eq!(name, "__SUB_UInteger*_UInteger*");
            }
            other => panic!("expected UndefinedFunction, got {other:?}"),
        }
    }
}
