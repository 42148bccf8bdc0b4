//! Block collection, statement/declaration parsing, and the shunting-yard
//! expression parser.
//!
//! Grounded in `original_source/compiler.py`'s `collect_blocks`,
//! `parse_statement`, `parse_subroutine`/`parse_function`/`parse_struct`,
//! `parse_local`/`parse_field`/`parse_arguments`, the `parse_*_statement`
//! family, and `parse_expression`. Where the original's per-construct
//! header regexes just re-validate what `parse_arguments` already checks,
//! or where its `ASM` regex only works by accident of a trailing `\n` from
//! `readlines()`, we parse the same grammar more directly rather than
//! reproduce the accident (see DESIGN.md).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use super::ast::*;
use super::lex::{parse_value, tokenize};
use crate::common::{CompileError, Result};

/// One line of source, or a fully collected `KEYWORD … END KEYWORD` block
/// (header and footer lines included as the first/last entries).
#[derive(Debug)]
enum Line {
    Leaf(String),
    Block(Vec<Line>),
}

const BLOCK_KEYWORDS: [&str; 7] = ["SUB", "FUNCTION", "STRUCTURE", "IF", "WHILE", "FOR", "TRY"];

fn first_word(line: &str) -> Option<String> {
    line.trim().split_whitespace().next().map(|w| w.to_uppercase())
}

fn is_end_of(line: &str, block_name: &str) -> bool {
    let words: Vec<&str> = line.trim().split_whitespace().collect();
    words.len() == 2 && words[0].eq_ignore_ascii_case("END") && words[1].eq_ignore_ascii_case(block_name)
}

fn leaf_text(line: &Line) -> Result<&str> {
    match line {
        Line::Leaf(s) => Ok(s),
        Line::Block(_) => Err(CompileError::Parse(
            "Expected a line, found a nested block.".to_string(),
        )),
    }
}

/// Fold a flat line stream into a tree of leaves and `KEYWORD … END
/// KEYWORD` blocks. Returns the tree and the number of input lines
/// consumed (only meaningful for the recursive, non-root call).
fn collect_blocks(lines: &[String], is_root: bool) -> Result<(Vec<Line>, usize)> {
    let mut result = Vec::new();
    let mut i = 0usize;
    let block_name = if is_root {
        String::new()
    } else {
        first_word(&lines[0]).ok_or_else(|| CompileError::Parse("Invalid block header.".to_string()))?
    };

    while i < lines.len() {
        let mut inner_block = false;
        if !(i == 0 && !is_root) {
            if let Some(word) = first_word(&lines[i]) {
                if BLOCK_KEYWORDS.contains(&word.as_str()) {
                    let (block, length) = collect_blocks(&lines[i..], false)?;
                    result.push(Line::Block(block));
                    i += length;
                    inner_block = true;
                }
            }
        }
        if !inner_block {
            let line = lines[i].clone();
            i += 1;
            let is_footer = !is_root && is_end_of(&line, &block_name);
            result.push(Line::Leaf(line));
            if is_footer {
                return Ok((result, i));
            }
        }
    }

    if is_root {
        Ok((result, i))
    } else {
        Err(CompileError::MissingEnd(block_name))
    }
}

fn is_operator_token(token: &str) -> bool {
    token.eq_ignore_ascii_case("AS")
        || matches!(token, "+" | "-" | "*" | "/" | "<<" | ">>")
        || token.eq_ignore_ascii_case("AND")
        || token.eq_ignore_ascii_case("OR")
        || token.eq_ignore_ascii_case("XOR")
}

fn precedence(_token: &str) -> i32 {
    0
}

fn is_left_associative(_token: &str) -> bool {
    false
}

enum StackItem {
    /// The `)` placed in the output queue to mark a call's argument
    /// boundary, carried through to the rebuild pass.
    Sentinel,
    Expr(Expression),
}

/// Shunting-yard parse of a single expression line into an [`Expression`]
/// tree. All operators share precedence 0 and are right-associative; `AS`
/// is parsed as an operator but consumes a trailing identifier (the target
/// type name) rather than a sub-expression.
pub fn parse_expression(line: &str) -> Result<Expression> {
    let tokens = tokenize(line)?;
    let mut queue: Vec<String> = Vec::new();
    let mut op_stack: Vec<String> = Vec::new();

    for token in tokens {
        if is_operator_token(&token) {
            while let Some(top) = op_stack.last() {
                if top.as_str() == "(" {
                    break;
                }
                if precedence(top) > precedence(&token)
                    || (is_left_associative(&token) && precedence(top) == precedence(&token))
                {
                    queue.push(op_stack.pop().unwrap());
                } else {
                    break;
                }
            }
            op_stack.push(token);
        } else if token.len() > 1 && token.ends_with('(') {
            op_stack.push(token);
            op_stack.push("(".to_string());
            queue.push(")".to_string());
        } else if token == "(" {
            op_stack.push(token);
        } else if token == ")" {
            loop {
                match op_stack.pop() {
                    None => return Err(CompileError::Parse("Missing \"(\".".to_string())),
                    Some(t) if t == "(" => break,
                    Some(t) => queue.push(t),
                }
            }
            if let Some(top) = op_stack.last() {
                if top.len() > 1 && top.ends_with('(') {
                    queue.push(op_stack.pop().unwrap());
                }
            }
        } else {
            queue.push(token);
        }
    }

    while let Some(token) = op_stack.pop() {
        if token == "(" {
            return Err(CompileError::Parse("Missing \")\".".to_string()));
        }
        queue.push(token);
    }

    let mut stack: Vec<StackItem> = Vec::new();
    for token in queue {
        if token == ")" {
            stack.push(StackItem::Sentinel);
        } else if is_operator_token(&token) {
            if token.eq_ignore_ascii_case("AS") {
                let ty_item = stack
                    .pop()
                    .ok_or_else(|| CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))?;
                let expr_item = stack
                    .pop()
                    .ok_or_else(|| CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))?;
                let ty_name = match ty_item {
                    StackItem::Expr(Expression::Variable(v)) => v.target.borrow().name(),
                    _ => {
                        return Err(CompileError::Parse(
                            "Expected type name for second operand of \"AS\".".to_string(),
                        ))
                    }
                };
                let expr = match expr_item {
                    StackItem::Expr(e) => e,
                    StackItem::Sentinel => {
                        return Err(CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))
                    }
                };
                stack.push(StackItem::Expr(Expression::Cast(CastExpr::new(ty_name, expr))));
            } else {
                let b_item = stack
                    .pop()
                    .ok_or_else(|| CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))?;
                let a_item = stack
                    .pop()
                    .ok_or_else(|| CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))?;
                let b = match b_item {
                    StackItem::Expr(e) => e,
                    StackItem::Sentinel => {
                        return Err(CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))
                    }
                };
                let a = match a_item {
                    StackItem::Expr(e) => e,
                    StackItem::Sentinel => {
                        return Err(CompileError::Parse(format!("Expected 2 operands for \"{token}\" operator.")))
                    }
                };
                stack.push(StackItem::Expr(Expression::Binary(BinaryExpr::new(token, a, b))));
            }
        } else if token.len() > 1 && token.ends_with('(') {
            let mut args = Vec::new();
            loop {
                match stack.pop() {
                    None => return Err(CompileError::Parse("Missing argument list terminator.".to_string())),
                    Some(StackItem::Sentinel) => break,
                    Some(StackItem::Expr(e)) => args.push(e),
                }
            }
            args.reverse();
            let name = &token[..token.len() - 1];
            stack.push(StackItem::Expr(Expression::Call(CallExpr::new(name, args))));
        } else {
            match parse_value(&token) {
                Ok(value) => stack.push(StackItem::Expr(Expression::Constant(ConstantExpr {
                    value,
                    ty: RefCell::new(TypeRef::name("Integer")),
                }))),
                Err(_) => stack.push(StackItem::Expr(Expression::Variable(VariableExpr {
                    target: RefCell::new(VarTarget::Name(token)),
                }))),
            }
        }
    }

    if stack.len() != 1 {
        return Err(CompileError::Parse("Expressions must produce one value.".to_string()));
    }
    match stack.pop().unwrap() {
        StackItem::Expr(e) => Ok(e),
        StackItem::Sentinel => Err(CompileError::Parse("Expressions must produce one value.".to_string())),
    }
}

pub fn parse_local(line: &str) -> Result<Local> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^DIM\s+(\w+)\s+AS\s+(\w+)\s*(=\s*(.+))?$").unwrap());
    let caps = re
        .captures(line.trim())
        .ok_or_else(|| CompileError::Parse("Invalid local declaration. Example: Dim value As Integer = 10".to_string()))?;
    let name = caps[1].to_string();
    let ty = caps[2].to_string();
    let initial = match caps.get(4) {
        Some(m) => Some(parse_value(m.as_str().trim())?),
        None => None,
    };
    Ok(Local::new(ty, name, initial))
}

fn parse_field(line: &str, index: usize) -> Result<FieldDecl> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^DIM\s+(\w+)\s+AS\s+(\w+)$").unwrap());
    let caps = re
        .captures(line.trim())
        .ok_or_else(|| CompileError::Parse("Invalid field declaration. Example: Dim value As Integer".to_string()))?;
    let name = caps[1].to_string();
    let ty = caps[2].to_string();
    Ok(FieldDecl::new(ty, name, index))
}

fn parse_struct(lines: &[Line]) -> Result<ComplexType> {
    if lines.len() < 2 {
        return Err(CompileError::Parse("Invalid structure.".to_string()));
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^STRUCTURE\s+(\w+)$").unwrap());
    let caps = re
        .captures(leaf_text(&lines[0])?.trim())
        .ok_or_else(|| CompileError::Parse("Invalid structure header. Example: Structure MyData".to_string()))?;
    let name = caps[1].to_string();

    let mut fields = Vec::new();
    let mut index = 0usize;
    for raw in &lines[1..lines.len() - 1] {
        let text = leaf_text(raw)?;
        if !text.trim().is_empty() {
            fields.push(parse_field(text, index)?);
            index += 1;
        }
    }
    Ok(ComplexType::new(name, fields))
}

fn parse_arguments(arg_list: &str) -> Result<Vec<(String, String, bool)>> {
    let trimmed = arg_list.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^(?:(BYREF)\s+)?(\w+)\s+AS\s+(\w[\w*]*)$").unwrap());
    let mut result = Vec::new();
    for arg in trimmed.split(',') {
        let caps = re
            .captures(arg.trim())
            .ok_or_else(|| CompileError::Parse("Invalid argument. Example: value As Integer".to_string()))?;
        let by_ref = caps.get(1).is_some();
        let name = caps[2].to_string();
        let ty = caps[3].to_string();
        result.push((ty, name, by_ref));
    }
    Ok(result)
}

fn build_params(args: Vec<(String, String, bool)>) -> Vec<Rc<Parameter>> {
    args.into_iter()
        .enumerate()
        .map(|(i, (ty, name, by_ref))| Rc::new(Parameter::new(ty, by_ref, name, i)))
        .collect()
}

fn parse_subroutine(lines: &[Line]) -> Result<SubRoutine> {
    if lines.len() < 2 {
        return Err(CompileError::Parse("Invalid subroutine.".to_string()));
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^SUB\s+(\w+)\s*\((.*)\)$").unwrap());
    let caps = re.captures(leaf_text(&lines[0])?.trim()).ok_or_else(|| {
        CompileError::Parse("Invalid subroutine header. Example: Sub MyCode(a As Integer, b As Integer)".to_string())
    })?;
    let name = caps[1].to_string();
    let params = build_params(parse_arguments(&caps[2])?);

    let mut body = Vec::new();
    for line in &lines[1..lines.len() - 1] {
        if let Some(stmt) = parse_body_statement(line)? {
            body.push(stmt);
        }
    }
    Ok(SubRoutine { name, params, body })
}

fn parse_function(lines: &[Line]) -> Result<Func> {
    if lines.len() < 2 {
        return Err(CompileError::Parse("Invalid function.".to_string()));
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^FUNCTION\s+(\w+)\s*\((.*)\)\s+AS\s+(\w[\w*]*)$").unwrap());
    let caps = re.captures(leaf_text(&lines[0])?.trim()).ok_or_else(|| {
        CompileError::Parse(
            "Invalid function header. Example: Function MyCode(a As Integer, b As Integer) As Integer".to_string(),
        )
    })?;
    let name = caps[1].to_string();
    let params = build_params(parse_arguments(&caps[2])?);
    let return_type = caps[3].to_string();

    let mut body = Vec::new();
    for line in &lines[1..lines.len() - 1] {
        if let Some(stmt) = parse_body_statement(line)? {
            body.push(stmt);
        }
    }
    Ok(Func {
        name,
        params,
        return_type: RefCell::new(TypeRef::name(return_type)),
        body,
    })
}

fn parse_asm_statement(line: &str) -> Result<Statement> {
    let mut words = line.trim().split_whitespace();
    let keyword = words
        .next()
        .ok_or_else(|| CompileError::Parse("Invalid assembly statement.".to_string()))?;
    if !keyword.eq_ignore_ascii_case("ASM") {
        return Err(CompileError::Parse("Invalid assembly statement.".to_string()));
    }
    let verb = words
        .next()
        .ok_or_else(|| CompileError::Parse("Invalid assembly statement.".to_string()))?;
    match verb.to_uppercase().as_str() {
        "LOAD" => {
            let var = words
                .next()
                .ok_or_else(|| CompileError::Parse("Invalid assembly statement.".to_string()))?;
            if words.next().is_some() {
                return Err(CompileError::Parse(
                    "Assembly load statement only accepts 1 parameter.".to_string(),
                ));
            }
            Ok(Statement::AsmLoad(RefCell::new(VarTarget::Name(var.to_string()))))
        }
        "SAVE" => {
            let var = words
                .next()
                .ok_or_else(|| CompileError::Parse("Invalid assembly statement.".to_string()))?;
            if words.next().is_some() {
                return Err(CompileError::Parse(
                    "Assembly save statement only accepts 1 parameter.".to_string(),
                ));
            }
            Ok(Statement::AsmStore(RefCell::new(VarTarget::Name(var.to_string()))))
        }
        "EXEC" => {
            let op = words
                .next()
                .ok_or_else(|| CompileError::Parse("Invalid assembly statement.".to_string()))?;
            let operands: Vec<String> = words.map(|w| w.to_string()).collect();
            Ok(Statement::AsmInstr(AsmInstrStatement {
                op: op.to_string(),
                operands,
            }))
        }
        _ => Err(CompileError::Parse("Unrecognized assembly statement type.".to_string())),
    }
}

fn parse_return_statement(line: &str) -> Result<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^\s*RETURN(?:\s+(.*))?\s*$").unwrap());
    let caps = re
        .captures(line)
        .ok_or_else(|| CompileError::Parse("Invalid return statement.".to_string()))?;
    let expr = match caps.get(1) {
        Some(m) if !m.as_str().trim().is_empty() => parse_expression(m.as_str())?,
        _ => Expression::Void,
    };
    Ok(Statement::Return(ReturnStatement { expr }))
}

fn parse_assign_statement(line: &str) -> Result<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\s*(\w[\w.]*)\s*=\s*(.*)$").unwrap());
    let caps = re
        .captures(line)
        .ok_or_else(|| CompileError::Parse("Invalid assignment statement.".to_string()))?;
    let target = caps[1].to_string();
    let expr = parse_expression(&caps[2])?;
    Ok(Statement::Assign(AssignStatement {
        target: RefCell::new(VarTarget::Name(target)),
        expr,
    }))
}

fn parse_call_statement(line: &str) -> Result<Statement> {
    match parse_expression(line)? {
        Expression::Call(c) => Ok(Statement::Call(c)),
        _ => Err(CompileError::Parse("Inline statement must be call or assignment.".to_string())),
    }
}

fn parse_inline_statement(line: &str) -> Result<Statement> {
    static ASSIGN_RE: OnceLock<Regex> = OnceLock::new();
    let assign_re = ASSIGN_RE.get_or_init(|| Regex::new(r"^\s*\w[\w.]*\s*=").unwrap());
    if assign_re.is_match(line) {
        return parse_assign_statement(line);
    }
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    let call_re = CALL_RE.get_or_init(|| Regex::new(r"^\s*\w[\w.]*\s*\(").unwrap());
    if call_re.is_match(line) {
        return parse_call_statement(line);
    }
    Err(CompileError::Parse("Invalid inline statement.".to_string()))
}

/// Parse one line inside a routine body. `None` for blank lines. Block
/// keywords (`IF`/`WHILE`/…) never reach a body since they're reserved and
/// rejected at the root; a nested block here means a stray `SUB`/`FUNCTION`/
/// `STRUCTURE` was written where a statement was expected.
fn parse_body_statement(line: &Line) -> Result<Option<Statement>> {
    let text = match line {
        Line::Leaf(s) => s,
        Line::Block(_) => {
            return Err(CompileError::Parse(
                "A declaration block is not valid inside a routine body.".to_string(),
            ))
        }
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    let word = first_word(text).unwrap_or_default();
    let stmt = match word.as_str() {
        "CALL" => return Err(CompileError::Parse("\"CALL\" statement is not implemented.".to_string())),
        "RETURN" => parse_return_statement(text)?,
        "DIM" => Statement::Local(Rc::new(parse_local(text)?)),
        "ASM" => parse_asm_statement(text)?,
        _ => parse_inline_statement(text)?,
    };
    Ok(Some(stmt))
}

fn statement_kind_name(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Local(_) => "LocalStatement",
        Statement::Assign(_) => "AssignmentStatement",
        Statement::Return(_) => "ReturnStatement",
        Statement::Call(_) => "CallStatement",
        Statement::AsmLoad(_) => "AssemblyLoadStatement",
        Statement::AsmStore(_) => "AssemblyStoreStatement",
        Statement::AsmInstr(_) => "AssemblyInstructionStatement",
    }
}

fn parse_declaration(lines: &[Line]) -> Result<RootItem> {
    let last = leaf_text(lines.last().ok_or_else(|| CompileError::Parse("Empty block.".to_string()))?)?;
    let words: Vec<&str> = last.trim().split_whitespace().collect();
    if words.len() != 2 || !words[0].eq_ignore_ascii_case("END") {
        return Err(CompileError::Parse("Unknown block type or missing end statement.".to_string()));
    }
    match words[1].to_uppercase().as_str() {
        "SUB" => Ok(RootItem::Callable(Rc::new(Callable::Sub(parse_subroutine(lines)?)))),
        "FUNCTION" => Ok(RootItem::Callable(Rc::new(Callable::Function(parse_function(lines)?)))),
        "STRUCTURE" => Ok(RootItem::Type(Rc::new(parse_struct(lines)?))),
        other @ ("IF" | "WHILE" | "FOR" | "TRY") => {
            Err(CompileError::Parse(format!("\"{other}\" blocks are reserved and not implemented.")))
        }
        other => Err(CompileError::Parse(format!("Unknown block type \"{other}\"."))),
    }
}

enum RootItem {
    Type(Rc<ComplexType>),
    Callable(Rc<Callable>),
}

/// Parse a whole module: fold `lines` into blocks, then classify each
/// top-level item as a composite type, a callable, or (for a non-blank
/// bare statement) a root-level error.
pub fn parse_module(name: &str, lines: &[String]) -> Result<Module> {
    let (tree, _) = collect_blocks(lines, true)?;
    let mut types = Vec::new();
    let mut code = Vec::new();

    for item in &tree {
        match item {
            Line::Leaf(s) if s.trim().is_empty() => {}
            Line::Leaf(_) => {
                if let Some(stmt) = parse_body_statement(item)? {
                    return Err(CompileError::InvalidAtRoot(statement_kind_name(&stmt).to_string()));
                }
            }
            Line::Block(b) => match parse_declaration(b)? {
                RootItem::Type(t) => types.push(t),
                RootItem::Callable(c) => code.push(c),
            },
        }
    }

    Ok(Module::new(name, types, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn parses_constant_and_binary_expression() {
        let expr = parse_expression("a + 3").unwrap();
        match expr {
            Expression::Binary(b) => {
                assert_eq!(b.op, "+");
                assert!(matches!(*b.lhs, Expression::Variable(_)));
                assert!(matches!(*b.rhs, Expression::Constant(_)));
            }
            _ => panic!("expected a binary expression"),
        }
    }

    #[test]
    fn parses_call_with_arguments() {
        let expr = parse_expression("Add(a, b)").unwrap();
        match expr {
            Expression::Call(c) => assert_eq!(c.args.len(), 2),
            _ => panic!("expected a call expression"),
        }
    }

    #[test]
    fn parses_cast_expression() {
        let expr = parse_expression("x AS UInteger").unwrap();
        assert!(matches!(expr, Expression::Cast(_)));
    }

    #[test]
    fn rejects_mismatched_parens() {
        assert!(parse_expression("(a + 1").is_err());
        assert!(parse_expression("a + 1)").is_err());
    }

    #[test]
    fn parses_structure_with_field_offsets() {
        let module = parse_module(
            "M",
            &lines("Structure Point\n  Dim X As Integer\n  Dim Y As Integer\nEnd Structure"),
        )
        .unwrap();
        assert_eq!(module.types.len(), 1);
        let point = &module.types[0];
        assert_eq!(point.field_offset("X").unwrap(), Some(0));
        assert_eq!(point.field_offset("Y").unwrap(), Some(1));
    }

    #[test]
    fn parses_function_with_return_statement() {
        let module = parse_module(
            "M",
            &lines("Function Add(a As Integer, b As Integer) As Integer\n  Return a + b\nEnd Function"),
        )
        .unwrap();
        assert_eq!(module.code.len(), 1);
        match &*module.code[0] {
            Callable::Function(f) => {
                assert_eq!(f.name, "Add");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.body.len(), 1);
            }
            _ => panic!("expected a function"),
        }
    }

    #[test]
    fn non_declaration_at_root_is_an_error() {
        let err = parse_module("M", &lines("Dim x As Integer")).unwrap_err();
        assert!(matches!(err, CompileError::InvalidAtRoot(_)));
    }

    #[test]
    fn missing_end_is_an_error() {
        let err = parse_module("M", &lines("Sub Foo()\n  Return")).unwrap_err();
        assert!(matches!(err, CompileError::MissingEnd(_)));
    }

    #[test]
    fn parses_asm_statements() {
        assert!(matches!(parse_body_statement(&Line::Leaf("Asm Load x".to_string())).unwrap(), Some(Statement::AsmLoad(_))));
        assert!(matches!(parse_body_statement(&Line::Leaf("Asm Save x".to_string())).unwrap(), Some(Statement::AsmStore(_))));
        match parse_body_statement(&Line::Leaf("Asm Exec add R1 R1 R2".to_string())).unwrap() {
            Some(Statement::AsmInstr(i)) => {
                assert_eq!(i.op, "add");
                assert_eq!(i.operands, vec!["R1", "R1", "R2"]);
            }
            _ => panic!("expected an asm instruction statement"),
        }
    }
}
