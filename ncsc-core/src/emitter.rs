//! Bytecode emission for a unit and the includes it pulls in.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::Item;
use crate::codegen::{check_global, lower_function, lower_globals_loader};
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::include::Registration;
use crate::instance::{CompilerInstance, InstanceStack};
use crate::loader::SourceLoader;
use crate::parser::{ParseEvent, Parser};
use crate::span::Span;
use crate::symbols::{FunctionBody, FunctionSymbol, SymbolTable};
use crate::types::Type;

pub const ENTRY_MAIN: &str = "main";
pub const ENTRY_CONDITIONAL: &str = "StartingConditional";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Declare, lower and expand includes.
    Full,
    /// Only parse: collect diagnostics and look for an entry point.
    ScanOnly,
}

/// The entry point serialization will use, if the table has a valid one.
pub fn valid_entry(symbols: &SymbolTable) -> Option<&FunctionSymbol> {
    match symbols.lookup_function(ENTRY_MAIN) {
        Some(main) => main.ret.is_void().then_some(main),
        None => symbols
            .lookup_function(ENTRY_CONDITIONAL)
            .filter(|function| function.ret == Type::Int),
    }
}

pub struct Emitter<'a> {
    parser: &'a dyn Parser,
    loader: &'a dyn SourceLoader,
    symbols: &'a mut SymbolTable,
    entry_seen: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(
        parser: &'a dyn Parser,
        loader: &'a dyn SourceLoader,
        symbols: &'a mut SymbolTable,
    ) -> Self {
        Emitter {
            parser,
            loader,
            symbols,
            entry_seen: false,
        }
    }

    /// Emits the root unit on top of `stack`, then checks its entry
    /// point and generates the globals loader.
    pub fn emit_root(&mut self, stack: &mut InstanceStack, mode: EmitMode) -> Result<(), CoreError> {
        self.entry_seen = false;
        self.emit_unit(stack, mode)?;
        let root = stack.current_mut().ok_or(CoreError::InstanceDestroyed)?;
        self.finish_root(root, mode)
    }

    /// Walks the parse events of the current instance.
    pub fn emit_unit(&mut self, stack: &mut InstanceStack, mode: EmitMode) -> Result<(), CoreError> {
        let (unit, text) = {
            let current = stack.current().ok_or(CoreError::InstanceDestroyed)?;
            (current.name().to_string(), current.source_text()?.into_owned())
        };
        let events = self.parser.parse(&unit, &text);
        trace!(unit, events = events.len(), ?mode, "emitting unit");

        for event in events {
            match event {
                ParseEvent::Diagnostic(diagnostic) => {
                    report(stack, diagnostic.located(&unit, &text))?;
                }
                ParseEvent::Include { path, span } => {
                    if mode == EmitMode::Full {
                        self.include(stack, &path, span, &unit, &text)?;
                    }
                }
                ParseEvent::Declaration(item) => {
                    if is_entry_name(item.name()) {
                        self.entry_seen = true;
                    }
                    if mode == EmitMode::Full {
                        self.declare(stack, item, &unit, &text)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn include(
        &mut self,
        stack: &mut InstanceStack,
        path: &str,
        span: Span,
        unit: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        let current = stack.current().ok_or(CoreError::InstanceDestroyed)?;
        let registry = Rc::clone(current.registry());
        let key = registry.borrow().normalize(path);
        let registration = registry.borrow_mut().register_or_touch(&key);
        if registration == Registration::AlreadyProcessed {
            trace!(key, "skipping include");
            return Ok(());
        }

        let source = match self.loader.load(&key) {
            Ok(source) => source,
            Err(err) => {
                debug!(key, %err, "include not found");
                let diagnostic =
                    Diagnostic::error(format!("unable to open include file \"{path}\""), span);
                return report(stack, diagnostic.located(unit, text));
            }
        };
        let child = CompilerInstance::create(
            key,
            Rc::from(source),
            None,
            current.is_debug(),
            current.includes().nested(),
        )?;

        stack.push(child);
        let emitted = self.emit_unit(stack, EmitMode::Full);
        let mut child = stack.pop().ok_or(CoreError::InstanceDestroyed)?;
        emitted?;

        let defined = child.defined().to_vec();
        let parent = stack.current_mut().ok_or(CoreError::InstanceDestroyed)?;
        let offset = parent.absorb(&mut child)?;
        self.symbols.rebase(&defined, offset);
        child.destroy();
        Ok(())
    }

    fn declare(
        &mut self,
        stack: &mut InstanceStack,
        item: Item,
        unit: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        match item {
            Item::Global(decl) => match self.symbols.declare_global(&decl, unit) {
                Ok(slot) => {
                    for diagnostic in check_global(slot, self.symbols) {
                        report(stack, diagnostic.located(unit, text))?;
                    }
                    Ok(())
                }
                Err(diagnostic) => report(stack, diagnostic.located(unit, text)),
            },
            Item::Function(decl) => {
                let id = match self.symbols.declare_function(&decl, unit) {
                    Ok(id) => id,
                    Err(diagnostic) => return report(stack, diagnostic.located(unit, text)),
                };
                if decl.body.is_none() {
                    return Ok(());
                }
                let lowering = lower_function(&decl, self.symbols);
                for diagnostic in lowering.diagnostics {
                    report(stack, diagnostic.located(unit, text))?;
                }
                let current = stack.current_mut().ok_or(CoreError::InstanceDestroyed)?;
                let body = append_code(current, lowering.code, lowering.labels)?;
                self.symbols.attach_body(id, body);
                current.record_definition(id);
                Ok(())
            }
        }
    }

    fn finish_root(&mut self, root: &mut CompilerInstance, mode: EmitMode) -> Result<(), CoreError> {
        let declared = self.symbols.lookup_function(ENTRY_MAIN).is_some()
            || self.symbols.lookup_function(ENTRY_CONDITIONAL).is_some();
        if !declared && !self.entry_seen {
            debug!(unit = root.name(), "unit has no entry point");
            root.report(Diagnostic::error(CoreError::NoEntryPoint.to_string(), Span::default()));
            root.mark_include();
        }
        if mode == EmitMode::ScanOnly || self.symbols.globals().is_empty() {
            return Ok(());
        }

        let entry = valid_entry(self.symbols).cloned();
        let ret = entry.as_ref().map_or(Type::Void, |function| function.ret);
        let lowering = lower_globals_loader(self.symbols, entry.as_ref());
        let id = self.symbols.declare_loader(ret, root.name());
        let body = append_code(root, lowering.code, lowering.labels)?;
        self.symbols.attach_body(id, body);
        root.record_definition(id);
        Ok(())
    }
}

fn is_entry_name(name: &str) -> bool {
    name == ENTRY_MAIN || name == ENTRY_CONDITIONAL
}

fn report(stack: &mut InstanceStack, diagnostic: Diagnostic) -> Result<(), CoreError> {
    stack
        .current_mut()
        .ok_or(CoreError::InstanceDestroyed)?
        .report(diagnostic);
    Ok(())
}

fn append_code(
    instance: &mut CompilerInstance,
    code: Vec<crate::opcode::Instruction>,
    labels: Vec<Option<usize>>,
) -> Result<FunctionBody, CoreError> {
    let buffer = instance.buffer_mut()?;
    let start = buffer.len();
    let len = code.len();
    buffer.ensure_capacity(start + len)?;
    for instruction in code {
        buffer.append(instruction)?;
    }
    Ok(FunctionBody { start, len, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include::IncludeRegistry;
    use crate::instance::IncludeScope;
    use crate::loader::MemoryLoader;
    use crate::opcode::{Arg, Instruction};
    use crate::parser::NssParser;

    struct Run {
        root: CompilerInstance,
        symbols: SymbolTable,
    }

    fn emit(source: &str, loader: &MemoryLoader, scope: IncludeScope) -> Run {
        let mut symbols = SymbolTable::new();
        let mut stack = InstanceStack::new();
        let root =
            CompilerInstance::create("main", Rc::from(source.as_bytes()), Some("main.nss"), false, scope)
                .unwrap();
        stack.push(root);
        Emitter::new(&NssParser, loader, &mut symbols)
            .emit_root(&mut stack, EmitMode::Full)
            .unwrap();
        let root = stack.pop().unwrap();
        Run { root, symbols }
    }

    #[test]
    fn includes_are_merged_and_rebased() {
        let loader = MemoryLoader::new().with_file("lib", "int Two() { return 2; }");
        let run = emit(
            "void Before() { }\n#include \"lib\"\nvoid main() { int x = Two(); }",
            &loader,
            IncludeScope::private(),
        );
        assert_eq!(run.root.error_count(), 0, "{:?}", run.root.diagnostics());
        let two = run.symbols.lookup_function("Two").unwrap();
        let body = two.body.as_ref().unwrap();
        // `Before` is a single RETN, so the include's code starts at 1.
        assert_eq!(body.start, 1);
        let records = run.root.buffer().unwrap().records();
        assert_eq!(records[body.start], Instruction::const_int(2));
        assert_eq!(run.root.defined().len(), 3);
    }

    #[test]
    fn a_second_include_of_the_same_unit_is_skipped() {
        let loader = MemoryLoader::new().with_file("lib", "int Two() { return 2; }");
        let once = emit(
            "#include \"lib\"\nvoid main() { Two(); }",
            &loader,
            IncludeScope::private(),
        );
        let twice = emit(
            "#include \"lib\"\n#include \"LIB\"\n#include \"dir/lib.nss\"\nvoid main() { Two(); }",
            &loader,
            IncludeScope::private(),
        );
        assert_eq!(twice.root.error_count(), 0, "{:?}", twice.root.diagnostics());
        assert_eq!(
            once.root.buffer().unwrap().records(),
            twice.root.buffer().unwrap().records()
        );
    }

    #[test]
    fn nested_includes_share_the_registry() {
        let loader = MemoryLoader::new()
            .with_file("a", "#include \"b\"\nint A() { return B(); }")
            .with_file("b", "#include \"a\"\nint B() { return 1; }");
        let scope = IncludeScope::Shared(IncludeRegistry::shared());
        let run = emit("#include \"a\"\nvoid main() { A(); }", &loader, scope.clone());
        assert_eq!(run.root.error_count(), 0, "{:?}", run.root.diagnostics());
        assert_eq!(scope.registry().borrow().keys(), vec!["main", "a", "b"]);
    }

    #[test]
    fn include_diagnostics_name_their_unit() {
        let loader = MemoryLoader::new().with_file("broken", "int F() { return \"x\"; }");
        let run = emit(
            "#include \"broken\"\nvoid main() { }",
            &loader,
            IncludeScope::private(),
        );
        assert_eq!(run.root.error_count(), 1);
        let diagnostic = &run.root.diagnostics()[0];
        assert_eq!(diagnostic.unit.as_deref(), Some("broken"));
    }

    #[test]
    fn missing_includes_are_errors() {
        let run = emit(
            "#include \"nowhere\"\nvoid main() { }",
            &MemoryLoader::new(),
            IncludeScope::private(),
        );
        assert_eq!(run.root.error_count(), 1);
        assert!(run.root.diagnostics()[0].message.contains("nowhere"));
    }

    #[test]
    fn units_without_entry_point_are_includes() {
        let run = emit("int Helper() { return 1; }", &MemoryLoader::new(), IncludeScope::private());
        assert!(run.root.is_include());
        assert_eq!(run.root.error_count(), 1);
    }

    #[test]
    fn forward_calls_fail_on_a_cold_table() {
        let run = emit(
            "void main() { Later(); }\nvoid Later() { }",
            &MemoryLoader::new(),
            IncludeScope::private(),
        );
        assert_eq!(run.root.error_count(), 1);
        assert!(run.root.diagnostics()[0].message.contains("Later"));
    }

    #[test]
    fn globals_get_a_loader_calling_the_entry_point() {
        let run = emit("int g = 3;\nvoid main() { g = g + 1; }", &MemoryLoader::new(), IncludeScope::private());
        assert_eq!(run.root.error_count(), 0, "{:?}", run.root.diagnostics());
        let loader = run.symbols.lookup_function(crate::symbols::GLOBALS_LOADER).unwrap();
        let body = loader.body.as_ref().unwrap();
        let main = run.symbols.lookup_function("main").unwrap();
        let records = &run.root.buffer().unwrap().records()[body.start..body.start + body.len];
        assert!(records.contains(&Instruction::new(crate::opcode::Op::Jsr, Arg::Call(main.id))));
    }

    #[test]
    fn scan_only_declares_nothing() {
        let loader = MemoryLoader::new().with_file("lib", "int Two() { return 2; }");
        let mut symbols = SymbolTable::new();
        let mut stack = InstanceStack::new();
        stack.push(
            CompilerInstance::create(
                "main",
                Rc::from(&b"#include \"lib\"\nvoid main() { }"[..]),
                None,
                false,
                IncludeScope::private(),
            )
            .unwrap(),
        );
        Emitter::new(&NssParser, &loader, &mut symbols)
            .emit_root(&mut stack, EmitMode::ScanOnly)
            .unwrap();
        let root = stack.pop().unwrap();
        assert!(symbols.functions().is_empty());
        assert!(!root.is_include());
        assert!(root.buffer().is_none());
    }
}
