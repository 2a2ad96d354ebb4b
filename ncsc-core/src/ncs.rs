//! NCS serialization of a finalized main-script instance.
//!
//! File layout:
//!
//! ```text
//! 0   "NCS V1.0B"
//! 9   u32 total file size (little-endian)
//! 13  stub:     [RSADDI] JSR <loader | entry>; RETN
//!     loader:   globals reserved and initialized, SAVEBP, call entry, RESTOREBP
//!     functions: entry point, then every function reachable from it
//! ```
//!
//! Only functions reachable from the entry point are written, so an
//! include contributes the functions that are actually called.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::emitter::{ENTRY_CONDITIONAL, ENTRY_MAIN};
use crate::error::CoreError;
use crate::instance::CompilerInstance;
use crate::io::write_file_fully;
use crate::opcode::{Arg, FunctionId, Instruction};
use crate::symbols::{FunctionBody, FunctionSymbol, GLOBALS_LOADER, SymbolTable};
use crate::types::{CELL_SIZE, Type};

pub const NCS_MAGIC: &[u8; 9] = b"NCS V1.0B";
pub const SIZE_FIELD_OFFSET: usize = 9;
pub const HEADER_SIZE: usize = 13;
/// Initial size of the serialization region.
pub const NCS_REGION_SIZE: usize = 512 * 1024;

/// Where one function landed in the artifact. Kept alongside the bytes
/// rather than inside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLayout {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct NcsArtifact {
    pub bytes: Vec<u8>,
    pub layout: Vec<FunctionLayout>,
}

/// Picks the entry point: `main` returning void, otherwise
/// `StartingConditional` returning int.
pub fn entry_point(symbols: &SymbolTable) -> Result<&FunctionSymbol, CoreError> {
    if let Some(main) = symbols.lookup_function(ENTRY_MAIN) {
        if !main.ret.is_void() {
            return Err(CoreError::WrongReturnType {
                function: ENTRY_MAIN,
                expected: Type::Void,
                found: main.ret,
            });
        }
        return Ok(main);
    }
    match symbols.lookup_function(ENTRY_CONDITIONAL) {
        Some(conditional) if conditional.ret == Type::Int => Ok(conditional),
        Some(conditional) => Err(CoreError::WrongReturnType {
            function: ENTRY_CONDITIONAL,
            expected: Type::Int,
            found: conditional.ret,
        }),
        None => Err(CoreError::NoEntryPoint),
    }
}

/// Assembles the artifact bytes and writes them to `output_name`, or to
/// `output_path` when no name is given. Returns the path written.
pub fn write_ncs(
    instance: &mut CompilerInstance,
    symbols: &SymbolTable,
    output_name: Option<&Path>,
    output_path: Option<&Path>,
) -> Result<(NcsArtifact, PathBuf), CoreError> {
    let artifact = assemble(instance, symbols)?;
    let target = output_name
        .or(output_path)
        .ok_or(CoreError::NoOutputName)?;
    write_file_fully(target, &artifact.bytes)?;
    debug!(path = %target.display(), bytes = artifact.bytes.len(), "wrote NCS");
    Ok((artifact, target.to_path_buf()))
}

struct Placed<'s> {
    symbol: &'s FunctionSymbol,
    body: &'s FunctionBody,
    /// Byte offset of every record plus the end of the function.
    offsets: Vec<usize>,
}

/// Builds the artifact in the instance's output window. The instance
/// must be finalized; its instruction buffer is sealed and released.
pub fn assemble(
    instance: &mut CompilerInstance,
    symbols: &SymbolTable,
) -> Result<NcsArtifact, CoreError> {
    let entry = entry_point(symbols)?;
    if instance.tables().is_none() {
        return Err(CoreError::NotFinalized);
    }
    let mut buffer = instance.take_buffer().unwrap_or_default();
    buffer.seal();
    let records = buffer.records();

    let loader = symbols
        .lookup_function(GLOBALS_LOADER)
        .filter(|_| !symbols.globals().is_empty());
    let mut order: Vec<&FunctionSymbol> = Vec::new();
    order.extend(loader);
    order.extend(reachable(entry, symbols, records)?);

    let returns_value = !entry.ret.is_void();
    let mut stub = Vec::new();
    if returns_value {
        stub.push(Instruction::rsadd(entry.ret));
    }
    stub.push(Instruction::jsr(loader.unwrap_or(entry).id));
    stub.push(Instruction::retn());

    // Layout pass: byte offset of every record.
    let mut cursor = HEADER_SIZE;
    let stub_offsets = place(&stub, &mut cursor);
    let mut placed = Vec::with_capacity(order.len());
    let mut function_offsets: HashMap<FunctionId, usize> = HashMap::new();
    for symbol in order {
        let body = symbol
            .body
            .as_ref()
            .ok_or_else(|| CoreError::UnresolvedCall(symbol.name.clone()))?;
        let code = body_records(records, body, &symbol.name)?;
        function_offsets.insert(symbol.id, cursor);
        let offsets = place(code, &mut cursor);
        placed.push(Placed {
            symbol,
            body,
            offsets,
        });
    }
    let total = cursor;

    // Encoding pass.
    let global_count = symbols.globals().len() as i32;
    let mut stub_bytes = Vec::new();
    for (instruction, &at) in stub.iter().zip(&stub_offsets) {
        let target = call_target(instruction, &function_offsets)?;
        instruction.encode(target.map_or(0, |target| target as i32 - at as i32), &mut stub_bytes);
    }

    let mut window = instance.take_output().ok_or(CoreError::InstanceDestroyed)?;
    let tables = instance.tables_mut().ok_or(CoreError::NotFinalized)?;
    tables.reset();
    let mut layout = Vec::with_capacity(placed.len());
    for function in &placed {
        let code = body_records(records, function.body, &function.symbol.name)?;
        let out = if function.symbol.name == GLOBALS_LOADER {
            &mut tables.globals
        } else {
            &mut tables.functions
        };
        for (index, instruction) in code.iter().enumerate() {
            let at = function.offsets[index];
            let resolved = match &instruction.arg {
                Arg::Jump(label) => {
                    let target = function
                        .body
                        .labels
                        .get(label.0 as usize)
                        .copied()
                        .flatten()
                        .and_then(|record| function.offsets.get(record))
                        .ok_or_else(|| CoreError::UnresolvedJump {
                            function: function.symbol.name.clone(),
                            label: label.0,
                        })?;
                    *target as i32 - at as i32
                }
                Arg::Call(_) => {
                    let target = call_target(instruction, &function_offsets)?.unwrap_or(at);
                    target as i32 - at as i32
                }
                Arg::Global(slot) => -CELL_SIZE * (global_count - *slot as i32),
                _ => 0,
            };
            instruction.encode(resolved, out);
        }
        layout.push(FunctionLayout {
            name: function.symbol.name.clone(),
            offset: function.offsets[0],
            len: function.offsets[function.offsets.len() - 1] - function.offsets[0],
        });
    }
    let debug_layout = tables.debug_enabled();
    let sections: [&[u8]; 3] = [&stub_bytes, &tables.globals, &tables.functions];
    let section_len: usize = sections.iter().map(|section| section.len()).sum();

    window.grow_to(NCS_REGION_SIZE.max(HEADER_SIZE + section_len))?;
    window.write(NCS_MAGIC)?;
    window.write(&[0; 4])?;
    for section in sections {
        window.write(section)?;
    }
    debug_assert_eq!(window.len(), total);
    let size = window.len() as u32;
    window.patch(SIZE_FIELD_OFFSET, &size.to_le_bytes())?;

    if debug_layout {
        for function in &layout {
            debug!(
                name = function.name,
                offset = function.offset,
                len = function.len,
                "function layout"
            );
        }
    }
    Ok(NcsArtifact {
        bytes: window.into_bytes(),
        layout,
    })
}

fn place(code: &[Instruction], cursor: &mut usize) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(code.len() + 1);
    for instruction in code {
        offsets.push(*cursor);
        *cursor += instruction.encoded_len();
    }
    offsets.push(*cursor);
    offsets
}

fn body_records<'r>(
    records: &'r [Instruction],
    body: &FunctionBody,
    name: &str,
) -> Result<&'r [Instruction], CoreError> {
    records
        .get(body.start..body.start + body.len)
        .ok_or_else(|| CoreError::UnresolvedCall(name.to_string()))
}

fn call_target(
    instruction: &Instruction,
    function_offsets: &HashMap<FunctionId, usize>,
) -> Result<Option<usize>, CoreError> {
    match &instruction.arg {
        Arg::Call(id) => function_offsets
            .get(id)
            .copied()
            .map(Some)
            .ok_or_else(|| CoreError::UnresolvedCall(format!("#{}", id.0))),
        _ => Ok(None),
    }
}

/// The entry point followed by every function it can reach, the rest in
/// declaration order.
fn reachable<'s>(
    entry: &'s FunctionSymbol,
    symbols: &'s SymbolTable,
    records: &[Instruction],
) -> Result<Vec<&'s FunctionSymbol>, CoreError> {
    let mut seen = BTreeSet::from([entry.id]);
    let mut pending = vec![entry];
    while let Some(function) = pending.pop() {
        let body = function
            .body
            .as_ref()
            .ok_or_else(|| CoreError::UnresolvedCall(function.name.clone()))?;
        for instruction in body_records(records, body, &function.name)? {
            if let Arg::Call(id) = instruction.arg {
                if seen.insert(id) {
                    let callee = symbols
                        .function(id)
                        .ok_or_else(|| CoreError::UnresolvedCall(format!("#{}", id.0)))?;
                    pending.push(callee);
                }
            }
        }
    }
    let mut order = vec![entry];
    order.extend(
        seen.into_iter()
            .filter(|id| *id != entry.id)
            .filter_map(|id| symbols.function(id)),
    );
    Ok(order)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::disasm::disassemble;
    use crate::emitter::{EmitMode, Emitter};
    use crate::finalize::finalize_main_script;
    use crate::instance::{IncludeScope, InstanceStack};
    use crate::loader::MemoryLoader;
    use crate::parser::NssParser;
    use tempfile::tempdir;

    fn compile(source: &str, loader: &MemoryLoader) -> (CompilerInstance, SymbolTable) {
        let mut symbols = SymbolTable::new();
        let mut stack = InstanceStack::new();
        stack.push(
            CompilerInstance::create("main", Rc::from(source.as_bytes()), None, false, IncludeScope::private())
                .unwrap(),
        );
        Emitter::new(&NssParser, loader, &mut symbols)
            .emit_root(&mut stack, EmitMode::Full)
            .unwrap();
        let mut instance = stack.pop().unwrap();
        assert_eq!(instance.error_count(), 0, "{:?}", instance.diagnostics());
        finalize_main_script(&mut instance, 0).unwrap();
        (instance, symbols)
    }

    fn mnemonics(bytes: &[u8]) -> Vec<String> {
        disassemble(bytes)
            .unwrap()
            .into_iter()
            .map(|decoded| decoded.op.mnemonic())
            .collect()
    }

    #[test]
    fn empty_main_is_stub_plus_return() {
        let (mut instance, symbols) = compile("void main() { }", &MemoryLoader::new());
        let artifact = assemble(&mut instance, &symbols).unwrap();
        assert_eq!(&artifact.bytes[..9], NCS_MAGIC);
        let size = u32::from_le_bytes(artifact.bytes[9..13].try_into().unwrap());
        assert_eq!(size as usize, artifact.bytes.len());
        assert_eq!(
            artifact.bytes[13..],
            [0x1E, 0x00, 0x00, 0x00, 0x00, 0x08, 0x20, 0x00, 0x20, 0x00]
        );
        assert_eq!(
            artifact.layout,
            vec![FunctionLayout {
                name: "main".to_string(),
                offset: 21,
                len: 2
            }]
        );
    }

    #[test]
    fn starting_conditional_reserves_its_result() {
        let (mut instance, symbols) =
            compile("int StartingConditional() { return 1; }", &MemoryLoader::new());
        let artifact = assemble(&mut instance, &symbols).unwrap();
        assert_eq!(
            mnemonics(&artifact.bytes)[..3],
            ["RSADDI".to_string(), "JSR".to_string(), "RETN".to_string()]
        );
    }

    #[test]
    fn entry_point_gate() {
        assert!(matches!(
            entry_point(&SymbolTable::new()),
            Err(CoreError::NoEntryPoint)
        ));

        let mut symbols = SymbolTable::new();
        for event in crate::parser::parse_events("int main() { return 0; }") {
            if let crate::parser::ParseEvent::Declaration(crate::ast::Item::Function(decl)) = event {
                symbols.declare_function(&decl, "main").unwrap();
            }
        }
        let mut instance =
            CompilerInstance::create("main", Rc::from(&b""[..]), None, false, IncludeScope::private())
                .unwrap();
        finalize_main_script(&mut instance, 0).unwrap();
        let err = assemble(&mut instance, &symbols).unwrap_err();
        assert_eq!(err.to_string(), "The \"main\" function must return a void");
    }

    #[test]
    fn refuses_unfinalized_instances() {
        let mut symbols = SymbolTable::new();
        let mut stack = InstanceStack::new();
        stack.push(
            CompilerInstance::create(
                "main",
                Rc::from(&b"void main() { }"[..]),
                None,
                false,
                IncludeScope::private(),
            )
            .unwrap(),
        );
        Emitter::new(&NssParser, &MemoryLoader::new(), &mut symbols)
            .emit_root(&mut stack, EmitMode::Full)
            .unwrap();
        let mut instance = stack.pop().unwrap();
        assert!(matches!(
            assemble(&mut instance, &symbols),
            Err(CoreError::NotFinalized)
        ));
    }

    #[test]
    fn only_reachable_include_functions_are_written() {
        let loader = MemoryLoader::new().with_file(
            "lib",
            "int Used() { return 1; }\nint Unused() { return 2; }\nint AlsoUsed() { return Used(); }",
        );
        let (mut instance, symbols) =
            compile("#include \"lib\"\nvoid main() { AlsoUsed(); }", &loader);
        let artifact = assemble(&mut instance, &symbols).unwrap();
        let names: Vec<_> = artifact.layout.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["main", "Used", "AlsoUsed"]);
    }

    #[test]
    fn calls_resolve_to_relative_offsets() {
        let (mut instance, symbols) =
            compile("void Callee() { }\nvoid main() { Callee(); }", &MemoryLoader::new());
        let artifact = assemble(&mut instance, &symbols).unwrap();
        let decoded = disassemble(&artifact.bytes).unwrap();
        let callee = artifact.layout.iter().find(|f| f.name == "Callee").unwrap();
        let call = decoded
            .iter()
            .filter(|ins| ins.op == crate::opcode::Op::Jsr)
            .nth(1)
            .unwrap();
        assert_eq!(call.offset as i64 + call.operand_int().unwrap() as i64, callee.offset as i64);
    }

    #[test]
    fn globals_are_addressed_from_bp() {
        let (mut instance, symbols) =
            compile("int a = 1; int b = 2;\nvoid main() { a = b; }", &MemoryLoader::new());
        let artifact = assemble(&mut instance, &symbols).unwrap();
        let decoded = disassemble(&artifact.bytes).unwrap();
        let reads: Vec<_> = decoded
            .iter()
            .filter(|ins| ins.op == crate::opcode::Op::CpTopBp)
            .map(|ins| ins.operand_int().unwrap())
            .collect();
        let writes: Vec<_> = decoded
            .iter()
            .filter(|ins| ins.op == crate::opcode::Op::CpDownBp)
            .map(|ins| ins.operand_int().unwrap())
            .collect();
        assert_eq!(reads, vec![-4]);
        assert_eq!(writes, vec![-8]);
        assert_eq!(artifact.layout[0].name, GLOBALS_LOADER);
    }

    #[test]
    fn writes_to_output_name_before_output_path() {
        let dir = tempdir().expect("tempdir");
        let (mut instance, symbols) = compile("void main() { }", &MemoryLoader::new());
        let name = dir.path().join("named.ncs");
        let path = dir.path().join("fallback.ncs");
        let (artifact, written) =
            write_ncs(&mut instance, &symbols, Some(&name), Some(&path)).unwrap();
        assert_eq!(written, name);
        assert!(!path.exists());
        assert_eq!(std::fs::read(&name).unwrap(), artifact.bytes);
    }

    #[test]
    fn missing_output_name_is_an_error() {
        let (mut instance, symbols) = compile("void main() { }", &MemoryLoader::new());
        assert!(matches!(
            write_ncs(&mut instance, &symbols, None, None),
            Err(CoreError::NoOutputName)
        ));
    }
}
