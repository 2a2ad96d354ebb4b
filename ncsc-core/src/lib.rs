//! Core of the NSS script compiler.
//!
//! The pipeline is roughly:
//!
//!   source .nss
//!     -> lexer / parser   (parse events: includes, declarations, diagnostics)
//!     -> emitter          (include expansion, symbol tables, instruction buffers)
//!     -> finalize         (output tables of the main script)
//!     -> ncs              (NCS V1.0B artifact on disk)
//!
//! `orchestrator::Session` drives one file through the two-pass workflow;
//! `batch` runs many files through one session. Higher-level tools should
//! depend on this crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod ast;
pub mod parser;

// ---------------------------------------------------------------------
// Semantic layers: types, symbols, lowering
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod opcode;
pub mod codegen;

// ---------------------------------------------------------------------
// Compiler instances and include handling
// ---------------------------------------------------------------------

pub mod buffer;
pub mod include;
pub mod instance;
pub mod loader;
pub mod emitter;
pub mod finalize;

// ---------------------------------------------------------------------
// Output: NCS serialization and decoding
// ---------------------------------------------------------------------

pub mod io;
pub mod ncs;
pub mod disasm;

// ---------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------

pub mod orchestrator;
pub mod batch;

pub use diagnostic::{Diagnostic, Severity};
pub use error::CoreError;
pub use orchestrator::{CompileOptions, CompileReport, CompileState, CompileStatus, Session};
