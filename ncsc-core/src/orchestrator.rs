//! Per-file compilation workflow.
//!
//! ```text
//! Start -> Parsed -> IncludeAlreadyDone -> IncludeAccepted      (2)
//!                 -> IncludeAccepted                            (2)
//!                 -> MainWithErrors -> Rejected                 (0)
//!                                   -> MainClean -> ...
//!                 -> MainClean -> SerializedOk                  (1)
//!                              -> SerializedFail                (0)
//! ```
//!
//! The first pass compiles against the registry shared by the whole run.
//! A main script that does not come out of it clean is compiled again
//! into a second, output-oriented instance with its own include scope,
//! seeded with the function signatures the first pass saw.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::diagnostic::Diagnostic;
use crate::emitter::{EmitMode, Emitter};
use crate::error::CoreError;
use crate::finalize::{FLAG_DEBUG, finalize_main_script};
use crate::include::{IncludeRegistry, Registration, SharedRegistry};
use crate::instance::{CompilerInstance, IncludeScope, InstanceStack};
use crate::io::{output_file_name, read_file_fully, resolve_source_path};
use crate::loader::{FsLoader, SourceLoader};
use crate::ncs::{FunctionLayout, write_ncs};
use crate::parser::{NssParser, Parser};
use crate::symbols::SymbolTable;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Debug mode: instances own their source and debug flags are set.
    pub debug: bool,
    /// Extra directories searched for includes after the source's own.
    pub include_dirs: Vec<PathBuf>,
    /// Explicit output file; takes precedence over the derived name.
    pub output: Option<PathBuf>,
    /// Directory for derived output names.
    pub output_dir: Option<PathBuf>,
}

impl CompileOptions {
    fn flags(&self) -> u8 {
        if self.debug { FLAG_DEBUG } else { 0 }
    }
}

/// Result code of one compiled file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    Failed,
    Compiled,
    Include,
}

impl CompileStatus {
    pub fn code(self) -> u8 {
        match self {
            CompileStatus::Failed => 0,
            CompileStatus::Compiled => 1,
            CompileStatus::Include => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompileStatus::Failed => "failed",
            CompileStatus::Compiled => "passed",
            CompileStatus::Include => "include",
        }
    }
}

impl fmt::Display for CompileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Start,
    Parsed,
    IncludeAlreadyDone,
    MainWithErrors,
    MainClean,
    SerializedOk,
    SerializedFail,
    IncludeAccepted,
    Rejected,
}

#[derive(Debug)]
pub struct CompileReport {
    pub unit: String,
    pub status: CompileStatus,
    pub trace: Vec<CompileState>,
    pub diagnostics: Vec<Diagnostic>,
    pub output: Option<PathBuf>,
    pub layout: Vec<FunctionLayout>,
    /// Why serialization or the unit as a whole failed.
    pub error: Option<CoreError>,
}

impl CompileReport {
    fn new(unit: &str, trace: Vec<CompileState>, status: CompileStatus) -> Self {
        CompileReport {
            unit: unit.to_string(),
            status,
            trace,
            diagnostics: Vec::new(),
            output: None,
            layout: Vec::new(),
            error: None,
        }
    }

    /// Report for a unit whose compilation was aborted by `error`.
    pub fn aborted(unit: &str, error: CoreError) -> Self {
        CompileReport {
            error: Some(error),
            ..CompileReport::new(unit, vec![CompileState::Start], CompileStatus::Failed)
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

/// One compilation run: options, front end and the include registry
/// shared by every file compiled through it.
pub struct Session {
    options: CompileOptions,
    parser: Box<dyn Parser>,
    registry: SharedRegistry,
}

impl Session {
    pub fn new(options: CompileOptions) -> Self {
        Session::with_parser(options, Box::new(NssParser))
    }

    pub fn with_parser(options: CompileOptions, parser: Box<dyn Parser>) -> Self {
        Session {
            options,
            parser,
            registry: IncludeRegistry::shared(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Output file derived for `source`, honoring `output_dir`.
    pub fn derived_output(&self, source: &Path) -> PathBuf {
        let derived = output_file_name(source);
        match (&self.options.output_dir, derived.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => derived,
        }
    }

    /// Reads and compiles one file. Includes are searched next to the
    /// file first, then in the configured include directories.
    pub fn compile_file(&mut self, path: &Path) -> Result<CompileReport, CoreError> {
        let source_path = resolve_source_path(path);
        let source = read_file_fully(&source_path)?;
        let base = source_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut dirs = vec![base];
        dirs.extend(self.options.include_dirs.iter().cloned());
        let loader = FsLoader::new(dirs);
        let output = self.derived_output(&source_path);
        let unit_path = source_path.to_string_lossy().into_owned();
        self.compile_source(&unit_path, Rc::from(source), &loader, Some(&output))
    }

    /// Runs the workflow for one unit held in memory. `output_path` is
    /// used when no explicit output was configured.
    pub fn compile_source(
        &mut self,
        unit_path: &str,
        source: Rc<[u8]>,
        loader: &dyn SourceLoader,
        output_path: Option<&Path>,
    ) -> Result<CompileReport, CoreError> {
        let unit = IncludeRegistry::key_for_path(unit_path);
        let debug = self.options.debug;
        let flags = self.options.flags();
        let mut trace = vec![CompileState::Start];
        let mut stack = InstanceStack::new();

        let mut first = CompilerInstance::create(
            unit.clone(),
            Rc::clone(&source),
            Some(unit_path),
            debug,
            IncludeScope::Shared(Rc::clone(&self.registry)),
        )?;
        if debug {
            first.apply_debug_flags(flags);
        }
        let already_processed = first.registration() == Some(Registration::AlreadyProcessed);
        let mode = if already_processed {
            EmitMode::ScanOnly
        } else {
            EmitMode::Full
        };
        stack.push(first);
        let mut symbols = SymbolTable::new();
        Emitter::new(self.parser.as_ref(), loader, &mut symbols).emit_root(&mut stack, mode)?;
        let mut first = stack.pop().ok_or(CoreError::InstanceDestroyed)?;
        trace.push(CompileState::Parsed);

        let errors = first.error_count();
        debug!(unit, errors, include = first.is_include(), ?mode, "first pass done");

        if errors > 0 && first.is_include() {
            if already_processed {
                trace.push(CompileState::IncludeAlreadyDone);
            }
            trace.push(CompileState::IncludeAccepted);
            let mut report = CompileReport::new(&unit, trace, CompileStatus::Include);
            report.diagnostics = first.take_diagnostics();
            first.destroy();
            info!(unit, "include");
            return Ok(report);
        }

        let (mut instance, symbols) = if errors > 0 || mode == EmitMode::ScanOnly {
            trace.push(CompileState::MainWithErrors);
            let mut second = CompilerInstance::create(
                unit.clone(),
                Rc::clone(&source),
                Some(unit_path),
                debug,
                IncludeScope::private(),
            )?;
            if debug {
                second.apply_debug_flags(flags);
            }
            finalize_main_script(&mut second, flags)?;
            let mut seeded = SymbolTable::seeded_from(&symbols);
            stack.push(second);
            Emitter::new(self.parser.as_ref(), loader, &mut seeded)
                .emit_root(&mut stack, EmitMode::Full)?;
            let mut second = stack.pop().ok_or(CoreError::InstanceDestroyed)?;
            first.destroy();

            if second.error_count() > 0 {
                trace.push(CompileState::Rejected);
                let mut report = CompileReport::new(&unit, trace, CompileStatus::Failed);
                report.diagnostics = second.take_diagnostics();
                second.destroy();
                info!(unit, errors = report.error_count(), "rejected");
                return Ok(report);
            }
            (second, seeded)
        } else {
            finalize_main_script(&mut first, flags)?;
            (first, symbols)
        };
        trace.push(CompileState::MainClean);

        let output_name = self.options.output.as_deref();
        let written = write_ncs(&mut instance, &symbols, output_name, output_path);
        let diagnostics = instance.take_diagnostics();
        instance.destroy();

        let report = match written {
            Ok((artifact, path)) => {
                trace.push(CompileState::SerializedOk);
                let mut report = CompileReport::new(&unit, trace, CompileStatus::Compiled);
                report.output = Some(path);
                report.layout = artifact.layout;
                report
            }
            Err(err) => {
                warn!(unit, %err, "serialization failed");
                trace.push(CompileState::SerializedFail);
                let mut report = CompileReport::new(&unit, trace, CompileStatus::Failed);
                report.error = Some(err);
                report
            }
        };
        info!(unit, status = %report.status, "compiled");
        Ok(CompileReport {
            diagnostics,
            ..report
        })
    }
}
