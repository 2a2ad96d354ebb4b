//! Lowering of function bodies to NCS instruction records.
//!
//! Stack discipline:
//! - the caller reserves the return slot (`RSADD`) for non-void callees,
//!   pushes arguments last-to-first and issues `JSR`,
//! - the callee pops its own parameters before `RETN`,
//! - `depth` counts the bytes the current function has pushed above its
//!   frame base, so a slot at frame position `pos` is addressed with the
//!   stack offset `pos - depth`.

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Stmt, UnaryOp, VarDecl};
use crate::diagnostic::Diagnostic;
use crate::opcode::{Instruction, Label, Op};
use crate::span::Span;
use crate::symbols::{FunctionSymbol, SymbolTable};
use crate::types::{CELL_SIZE, Type, TypePair};

type LResult<T> = Result<T, Diagnostic>;

/// Code and labels of one lowered function.
#[derive(Debug, Default)]
pub struct Lowering {
    pub code: Vec<Instruction>,
    pub labels: Vec<Option<usize>>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    ty: Type,
    pos: i32,
}

enum Slot {
    Stack { pos: i32, ty: Type },
    Global { slot: u32, ty: Type },
}

impl Slot {
    fn ty(&self) -> Type {
        match self {
            Slot::Stack { ty, .. } | Slot::Global { ty, .. } => *ty,
        }
    }
}

struct FunctionBuilder<'a> {
    symbols: &'a SymbolTable,
    code: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    scopes: Vec<Vec<Local>>,
    params: Vec<Local>,
    depth: i32,
    ret: Type,
    /// Globals are addressed through BP everywhere except in the loader,
    /// which runs before BP is saved and sees them as plain locals.
    globals_visible: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Lowers a function definition. Diagnostics are returned alongside the
/// code; code emitted for a function with errors is never serialized.
pub fn lower_function(decl: &FunctionDecl, symbols: &SymbolTable) -> Lowering {
    let mut builder = FunctionBuilder::new(symbols, decl.ret);
    for (index, param) in decl.params.iter().enumerate() {
        if builder.params.iter().any(|p| p.name == param.name) {
            builder.diagnostics.push(Diagnostic::error(
                format!("duplicate parameter \"{}\"", param.name),
                decl.span,
            ));
        }
        builder.params.push(Local {
            name: param.name.clone(),
            ty: param.ty,
            pos: -CELL_SIZE * (index as i32 + 1),
        });
    }

    let epilogue = builder.new_label();
    if let Some(body) = &decl.body {
        builder.lower_block(body);
    }
    builder.bind(epilogue);
    let param_bytes = builder.param_bytes();
    if param_bytes > 0 {
        builder.push(Instruction::movsp(-param_bytes));
    }
    builder.push(Instruction::retn());
    builder.finish()
}

/// Type-checks the initializer of the global in `slot`, with every
/// earlier global in scope.
pub fn check_global(slot: u32, symbols: &SymbolTable) -> Vec<Diagnostic> {
    let mut builder = FunctionBuilder::loader(symbols, Type::Void);
    let globals = symbols.globals();
    for global in globals.iter().take(slot as usize) {
        builder.declare_local(global.name.clone(), global.ty);
        builder.depth += CELL_SIZE;
    }
    if let Some(global) = globals.get(slot as usize) {
        builder.lower_stmt(&Stmt::Local(global.decl.clone()));
    }
    builder.diagnostics
}

/// Builds the loader that reserves and initializes every global, saves
/// BP so functions can reach them, then calls the entry point.
pub fn lower_globals_loader(symbols: &SymbolTable, entry: Option<&FunctionSymbol>) -> Lowering {
    let ret = entry.map_or(Type::Void, |function| function.ret);
    let mut builder = FunctionBuilder::loader(symbols, ret);
    for global in symbols.globals() {
        builder.lower_stmt(&Stmt::Local(global.decl.clone()));
    }
    builder.push(Instruction::simple(Op::SaveBp));
    builder.depth += CELL_SIZE;
    if let Some(entry) = entry {
        let returns = !entry.ret.is_void();
        if returns {
            builder.push(Instruction::rsadd(entry.ret));
            builder.depth += CELL_SIZE;
        }
        builder.push(Instruction::jsr(entry.id));
        if returns {
            let offset = builder.return_slot() - builder.depth;
            builder.push(Instruction::cpdownsp(offset, CELL_SIZE as u16));
            builder.push(Instruction::movsp(-CELL_SIZE));
            builder.depth -= CELL_SIZE;
        }
    }
    builder.push(Instruction::simple(Op::RestoreBp));
    builder.depth -= CELL_SIZE;
    let global_bytes = CELL_SIZE * symbols.globals().len() as i32;
    if global_bytes > 0 {
        builder.push(Instruction::movsp(-global_bytes));
    }
    builder.push(Instruction::retn());
    builder.finish()
}

impl<'a> FunctionBuilder<'a> {
    fn new(symbols: &'a SymbolTable, ret: Type) -> Self {
        FunctionBuilder {
            symbols,
            code: Vec::new(),
            labels: Vec::new(),
            scopes: vec![Vec::new()],
            params: Vec::new(),
            depth: 0,
            ret,
            globals_visible: true,
            diagnostics: Vec::new(),
        }
    }

    fn loader(symbols: &'a SymbolTable, ret: Type) -> Self {
        FunctionBuilder {
            globals_visible: false,
            ..FunctionBuilder::new(symbols, ret)
        }
    }

    fn finish(self) -> Lowering {
        Lowering {
            code: self.code,
            labels: self.labels,
            diagnostics: self.diagnostics,
        }
    }

    fn param_bytes(&self) -> i32 {
        CELL_SIZE * self.params.len() as i32
    }

    /// Frame position of the caller-reserved return slot.
    fn return_slot(&self) -> i32 {
        -self.param_bytes() - CELL_SIZE
    }

    fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    fn bind(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(self.code.len());
        }
    }

    fn declare_local(&mut self, name: String, ty: Type) {
        let pos = self.depth;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Local { name, ty, pos });
        }
    }

    fn lower_block(&mut self, stmts: &[Stmt]) {
        self.scopes.push(Vec::new());
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
        self.pop_scope();
    }

    fn pop_scope(&mut self) {
        let locals = self.scopes.pop().map_or(0, |scope| scope.len()) as i32;
        if locals > 0 {
            self.push(Instruction::movsp(-CELL_SIZE * locals));
            self.depth -= CELL_SIZE * locals;
        }
    }

    /// Lowers a statement that forms its own scope (branch or loop body).
    fn lower_scoped(&mut self, stmt: &Stmt) {
        self.scopes.push(Vec::new());
        self.lower_stmt(stmt);
        self.pop_scope();
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        let depth = self.depth;
        let locals = self.scopes.last().map_or(0, Vec::len);
        if let Err(diag) = self.try_lower_stmt(stmt) {
            self.diagnostics.push(diag);
            let added = self.scopes.last().map_or(0, Vec::len) - locals;
            self.depth = depth + CELL_SIZE * added as i32;
        }
    }

    fn try_lower_stmt(&mut self, stmt: &Stmt) -> LResult<()> {
        match stmt {
            Stmt::Block(stmts) => {
                self.lower_block(stmts);
                Ok(())
            }
            Stmt::Local(decl) => self.lower_local(decl),
            Stmt::Assign { name, value, span } => {
                let slot = self.resolve(name, *span)?;
                let value_ty = self.lower_expr(value)?;
                expect_type(slot.ty(), value_ty, value.span)?;
                match slot {
                    Slot::Stack { pos, .. } => {
                        let offset = pos - self.depth;
                        self.push(Instruction::cpdownsp(offset, CELL_SIZE as u16));
                    }
                    Slot::Global { slot, .. } => self.push(Instruction::write_global(slot)),
                }
                self.push(Instruction::movsp(-CELL_SIZE));
                self.depth -= CELL_SIZE;
                Ok(())
            }
            Stmt::Expr(expr) => {
                let ty = self.lower_expr(expr)?;
                if !ty.is_void() {
                    self.push(Instruction::movsp(-CELL_SIZE));
                    self.depth -= CELL_SIZE;
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.lower_condition(cond)?;
                let otherwise = self.new_label();
                self.push(Instruction::jz(otherwise));
                self.depth -= CELL_SIZE;
                self.lower_scoped(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        let end = self.new_label();
                        self.push(Instruction::jmp(end));
                        self.bind(otherwise);
                        self.lower_scoped(else_branch);
                        self.bind(end);
                    }
                    None => self.bind(otherwise),
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                let top = self.new_label();
                let end = self.new_label();
                self.bind(top);
                self.lower_condition(cond)?;
                self.push(Instruction::jz(end));
                self.depth -= CELL_SIZE;
                self.lower_scoped(body);
                self.push(Instruction::jmp(top));
                self.bind(end);
                Ok(())
            }
            Stmt::Return { value, span } => self.lower_return(value.as_ref(), *span),
        }
    }

    fn lower_local(&mut self, decl: &VarDecl) -> LResult<()> {
        let duplicate = self
            .scopes
            .last()
            .is_some_and(|scope| scope.iter().any(|local| local.name == decl.name));
        if duplicate {
            return Err(Diagnostic::error(
                format!("\"{}\" is already declared in this scope", decl.name),
                decl.span,
            ));
        }
        self.push(Instruction::rsadd(decl.ty));
        self.declare_local(decl.name.clone(), decl.ty);
        self.depth += CELL_SIZE;
        if let Some(init) = &decl.init {
            let ty = self.lower_expr(init)?;
            expect_type(decl.ty, ty, init.span)?;
            self.push(Instruction::cpdownsp(-2 * CELL_SIZE, CELL_SIZE as u16));
            self.push(Instruction::movsp(-CELL_SIZE));
            self.depth -= CELL_SIZE;
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expr>, span: Span) -> LResult<()> {
        let depth = self.depth;
        match (value, self.ret.is_void()) {
            (Some(expr), false) => {
                let ty = self.lower_expr(expr)?;
                expect_type(self.ret, ty, expr.span)?;
                let offset = self.return_slot() - self.depth;
                self.push(Instruction::cpdownsp(offset, CELL_SIZE as u16));
            }
            (None, true) => {}
            (Some(expr), true) => {
                return Err(Diagnostic::error(
                    "a void function cannot return a value",
                    expr.span,
                ));
            }
            (None, false) => {
                return Err(Diagnostic::error(
                    format!("function must return {}", self.ret.with_article()),
                    span,
                ));
            }
        }
        if self.depth > 0 {
            self.push(Instruction::movsp(-self.depth));
        }
        // The epilogue is always label 0 of a function.
        self.push(Instruction::jmp(Label(0)));
        self.depth = depth;
        Ok(())
    }

    fn lower_condition(&mut self, cond: &Expr) -> LResult<()> {
        let ty = self.lower_expr(cond)?;
        if ty != Type::Int {
            return Err(Diagnostic::error(
                format!("condition must be an int, found {ty}"),
                cond.span,
            ));
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> LResult<Type> {
        let ty = match &expr.kind {
            ExprKind::Int(value) => self.push_const(Instruction::const_int(*value), Type::Int),
            ExprKind::Float(value) => self.push_const(Instruction::const_float(*value), Type::Float),
            ExprKind::String(text) => {
                if text.len() > u16::MAX as usize {
                    return Err(Diagnostic::error("string constant is too long", expr.span));
                }
                self.push_const(Instruction::const_string(text.clone()), Type::String)
            }
            ExprKind::Object(value) => {
                self.push_const(Instruction::const_object(*value), Type::Object)
            }
            ExprKind::Ident(name) => match self.resolve(name, expr.span)? {
                Slot::Stack { pos, ty } => {
                    let offset = pos - self.depth;
                    self.push_const(Instruction::cptopsp(offset, CELL_SIZE as u16), ty)
                }
                Slot::Global { slot, ty } => self.push_const(Instruction::read_global(slot), ty),
            },
            ExprKind::Call { name, args } => self.lower_call(name, args, expr.span)?,
            ExprKind::Unary { op, operand } => {
                let ty = self.lower_expr(operand)?;
                let instruction = match (op, ty) {
                    (UnaryOp::Neg, Type::Int | Type::Float) => Op::Neg(ty),
                    (UnaryOp::Not, Type::Int) => Op::Not,
                    _ => {
                        let symbol = if *op == UnaryOp::Neg { "-" } else { "!" };
                        return Err(Diagnostic::error(
                            format!("operator \"{symbol}\" cannot be applied to {ty}"),
                            expr.span,
                        ));
                    }
                };
                self.push(Instruction::simple(instruction));
                ty
            }
            ExprKind::Binary { op, left, right } => {
                let left_ty = self.lower_expr(left)?;
                let right_ty = self.lower_expr(right)?;
                let (instruction, result) = binary_instruction(*op, left_ty, right_ty)
                    .ok_or_else(|| {
                        Diagnostic::error(
                            format!(
                                "operator \"{}\" cannot be applied to {left_ty} and {right_ty}",
                                operator_symbol(*op)
                            ),
                            expr.span,
                        )
                    })?;
                self.push(Instruction::simple(instruction));
                self.depth -= CELL_SIZE;
                result
            }
        };
        Ok(ty)
    }

    fn push_const(&mut self, instruction: Instruction, ty: Type) -> Type {
        self.push(instruction);
        self.depth += CELL_SIZE;
        ty
    }

    fn lower_call(&mut self, name: &str, args: &[Expr], span: Span) -> LResult<Type> {
        let symbols = self.symbols;
        let function = symbols.lookup_function(name).ok_or_else(|| {
            Diagnostic::error(format!("undeclared function \"{name}\""), span)
        })?;
        if function.params.len() != args.len() {
            return Err(Diagnostic::error(
                format!(
                    "function \"{name}\" takes {} argument(s) but {} were given",
                    function.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        if !function.ret.is_void() {
            self.push(Instruction::rsadd(function.ret));
            self.depth += CELL_SIZE;
        }
        for (arg, expected) in args.iter().zip(&function.params).rev() {
            let ty = self.lower_expr(arg)?;
            expect_type(*expected, ty, arg.span)?;
        }
        self.push(Instruction::jsr(function.id));
        self.depth -= CELL_SIZE * args.len() as i32;
        Ok(function.ret)
    }

    fn resolve(&self, name: &str, span: Span) -> LResult<Slot> {
        for scope in self.scopes.iter().rev() {
            if let Some(local) = scope.iter().rev().find(|local| local.name == name) {
                return Ok(Slot::Stack {
                    pos: local.pos,
                    ty: local.ty,
                });
            }
        }
        if let Some(param) = self.params.iter().find(|param| param.name == name) {
            return Ok(Slot::Stack {
                pos: param.pos,
                ty: param.ty,
            });
        }
        if self.globals_visible {
            if let Some(global) = self.symbols.lookup_global(name) {
                return Ok(Slot::Global {
                    slot: global.slot,
                    ty: global.ty,
                });
            }
        }
        Err(Diagnostic::error(
            format!("undeclared identifier \"{name}\""),
            span,
        ))
    }
}

fn expect_type(expected: Type, found: Type, span: Span) -> LResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Diagnostic::error(
            format!("type mismatch: expected {expected}, found {found}"),
            span,
        ))
    }
}

/// Instruction and result type for a binary operator over the operand types.
fn binary_instruction(op: BinaryOp, left: Type, right: Type) -> Option<(Op, Type)> {
    let pair = TypePair::of(left, right)?;
    let numeric = matches!(
        pair,
        TypePair::IntInt | TypePair::FloatFloat | TypePair::IntFloat | TypePair::FloatInt
    );
    let same_type = !matches!(pair, TypePair::IntFloat | TypePair::FloatInt);
    let ordered = matches!(pair, TypePair::IntInt | TypePair::FloatFloat);
    let int_only = pair == TypePair::IntInt;

    let entry = match op {
        BinaryOp::Add if numeric || pair == TypePair::StringString => {
            (Op::Add(pair), pair.arithmetic_result())
        }
        BinaryOp::Sub if numeric => (Op::Sub(pair), pair.arithmetic_result()),
        BinaryOp::Mul if numeric => (Op::Mul(pair), pair.arithmetic_result()),
        BinaryOp::Div if numeric => (Op::Div(pair), pair.arithmetic_result()),
        BinaryOp::Mod if int_only => (Op::Mod, Type::Int),
        BinaryOp::And if int_only => (Op::LogAnd, Type::Int),
        BinaryOp::Or if int_only => (Op::LogOr, Type::Int),
        BinaryOp::Eq if same_type => (Op::Equal(pair), Type::Int),
        BinaryOp::NotEq if same_type => (Op::NotEqual(pair), Type::Int),
        BinaryOp::Less if ordered => (Op::Lt(pair), Type::Int),
        BinaryOp::LessEq if ordered => (Op::Leq(pair), Type::Int),
        BinaryOp::Greater if ordered => (Op::Gt(pair), Type::Int),
        BinaryOp::GreaterEq if ordered => (Op::Geq(pair), Type::Int),
        _ => return None,
    };
    Some(entry)
}

fn operator_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Less => "<",
        BinaryOp::LessEq => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterEq => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Item;
    use crate::opcode::Arg;
    use crate::parser::{ParseEvent, parse_events};

    /// Declares everything in `source` and lowers the function `name`.
    fn lower(source: &str, name: &str) -> Lowering {
        let mut symbols = SymbolTable::new();
        let mut target = None;
        for event in parse_events(source) {
            match event {
                ParseEvent::Declaration(Item::Function(decl)) => {
                    symbols.declare_function(&decl, "test").unwrap();
                    if decl.name == name {
                        target = Some(decl);
                    }
                }
                ParseEvent::Declaration(Item::Global(decl)) => {
                    symbols.declare_global(&decl, "test").unwrap();
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        lower_function(&target.expect("function present"), &symbols)
    }

    #[test]
    fn empty_void_main_is_a_bare_return() {
        let lowering = lower("void main() { }", "main");
        assert!(lowering.diagnostics.is_empty());
        assert_eq!(lowering.code, vec![Instruction::retn()]);
        assert_eq!(lowering.labels, vec![Some(0)]);
    }

    #[test]
    fn locals_are_reserved_initialized_and_dropped() {
        let lowering = lower("void main() { int x = 5; }", "main");
        assert_eq!(
            lowering.code,
            vec![
                Instruction::rsadd(Type::Int),
                Instruction::const_int(5),
                Instruction::cpdownsp(-8, 4),
                Instruction::movsp(-4),
                Instruction::movsp(-4),
                Instruction::retn(),
            ]
        );
    }

    #[test]
    fn return_copies_into_caller_slot_and_pops_params() {
        let lowering = lower("int Id(int a) { return a; }", "Id");
        assert!(lowering.diagnostics.is_empty());
        assert_eq!(
            lowering.code,
            vec![
                Instruction::cptopsp(-4, 4),
                Instruction::cpdownsp(-12, 4),
                Instruction::movsp(-4),
                Instruction::jmp(Label(0)),
                Instruction::movsp(-4),
                Instruction::retn(),
            ]
        );
        assert_eq!(lowering.labels, vec![Some(4)]);
    }

    #[test]
    fn calls_reserve_result_and_push_arguments_in_reverse() {
        let source = "int Sub(int a, int b) { return a - b; }\nvoid main() { Sub(1, 2); }";
        let lowering = lower(source, "main");
        assert!(lowering.diagnostics.is_empty());
        let ops: Vec<_> = lowering.code.iter().map(|ins| ins.op.mnemonic()).collect();
        assert_eq!(
            ops,
            vec!["RSADDI", "CONSTI", "CONSTI", "JSR", "MOVSP", "RETN"]
        );
        assert_eq!(lowering.code[1].arg, Arg::Int(2));
        assert_eq!(lowering.code[2].arg, Arg::Int(1));
    }

    #[test]
    fn globals_are_read_through_bp() {
        let lowering = lower("int g = 1;\nint main2() { return g; }", "main2");
        assert_eq!(lowering.code[0], Instruction::read_global(0));
    }

    #[test]
    fn while_loop_jumps_back_to_its_condition() {
        let lowering = lower("void main() { int i = 0; while (i < 3) { i = i + 1; } }", "main");
        assert!(lowering.diagnostics.is_empty());
        let jumps: Vec<_> = lowering
            .code
            .iter()
            .filter(|ins| ins.op.is_jump())
            .map(|ins| ins.arg.clone())
            .collect();
        assert_eq!(jumps.len(), 2);
        let Arg::Jump(back) = &jumps[1] else {
            panic!("expected jump");
        };
        // The loop head is bound right after the local's initialization.
        assert_eq!(lowering.labels[back.0 as usize], Some(4));
    }

    #[test]
    fn reports_type_errors_and_undeclared_names() {
        let lowering = lower(
            "void main() { int x = \"s\"; y = 1; Missing(); return 3; }",
            "main",
        );
        let messages: Vec<_> = lowering
            .diagnostics
            .iter()
            .map(|diag| diag.message.as_str())
            .collect();
        assert_eq!(messages.len(), 4);
        assert!(messages[0].contains("type mismatch"));
        assert!(messages[1].contains("undeclared identifier"));
        assert!(messages[2].contains("undeclared function"));
        assert!(messages[3].contains("void function"));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let lowering = lower("float f() { return 1 + 2.5; }", "f");
        assert!(lowering.diagnostics.is_empty());
        assert_eq!(lowering.code[2].op, Op::Add(TypePair::IntFloat));
    }

    #[test]
    fn loader_saves_bp_and_forwards_starting_conditional_result() {
        let mut symbols = SymbolTable::new();
        for event in parse_events("int a = 2; int b;\nint StartingConditional() { return a; }") {
            match event {
                ParseEvent::Declaration(Item::Global(decl)) => {
                    symbols.declare_global(&decl, "t").unwrap();
                }
                ParseEvent::Declaration(Item::Function(decl)) => {
                    symbols.declare_function(&decl, "t").unwrap();
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        let entry = symbols.lookup_function("StartingConditional").cloned();
        let lowering = lower_globals_loader(&symbols, entry.as_ref());
        let ops: Vec<_> = lowering.code.iter().map(|ins| ins.op.mnemonic()).collect();
        assert_eq!(
            ops,
            vec![
                "RSADDI", "CONSTI", "CPDOWNSP", "MOVSP", "RSADDI", "SAVEBP", "RSADDI", "JSR",
                "CPDOWNSP", "MOVSP", "RESTOREBP", "MOVSP", "RETN"
            ]
        );
        assert_eq!(lowering.code[8], Instruction::cpdownsp(-20, 4));
        assert_eq!(lowering.code[11], Instruction::movsp(-8));
    }

    #[test]
    fn global_initializers_only_see_earlier_globals() {
        let mut symbols = SymbolTable::new();
        for event in parse_events("int a = b; int b = 1; int c = b;") {
            if let ParseEvent::Declaration(Item::Global(decl)) = event {
                symbols.declare_global(&decl, "t").unwrap();
            }
        }
        assert_eq!(check_global(0, &symbols).len(), 1);
        assert!(check_global(2, &symbols).is_empty());
    }
}
