//! Sequential compilation of many scripts through one session.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::include::IncludeRegistry;
use crate::io::{SOURCE_EXTENSION, read_file_fully};
use crate::orchestrator::{CompileReport, CompileStatus, Session};

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub compiled: usize,
    pub failed: usize,
    pub includes: usize,
    pub elapsed: Duration,
    pub reports: Vec<(PathBuf, CompileReport)>,
}

impl BatchSummary {
    fn record(&mut self, path: PathBuf, report: CompileReport) {
        self.processed += 1;
        match report.status {
            CompileStatus::Compiled => self.compiled += 1,
            CompileStatus::Failed => self.failed += 1,
            CompileStatus::Include => self.includes += 1,
        }
        self.reports.push((path, report));
    }
}

/// Every `.nss` file below `root`, sorted by path.
pub fn collect_sources(root: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root.as_ref())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        })
        .collect();
    files.sort();
    files
}

/// Reads a list file naming one script per line. Blank lines and lines
/// starting with `#` are skipped; relative entries are taken relative to
/// the list's directory.
pub fn read_source_list(list: impl AsRef<Path>) -> Result<Vec<PathBuf>, CoreError> {
    let list = list.as_ref();
    let bytes = read_file_fully(list)?;
    let base = list.parent().unwrap_or_else(|| Path::new(""));
    let files = String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| base.join(line))
        .collect::<Vec<_>>();
    debug!(list = %list.display(), files = files.len(), "read source list");
    Ok(files)
}

/// Compiles `files` in order. `observer` sees each report as soon as it
/// is produced; an aborted unit is reported as failed and the batch
/// moves on.
pub fn compile_files(
    session: &mut Session,
    files: &[PathBuf],
    mut observer: impl FnMut(&Path, &CompileReport),
) -> BatchSummary {
    let started = Instant::now();
    let mut summary = BatchSummary::default();
    for path in files {
        let report = session.compile_file(path).unwrap_or_else(|err| {
            let unit = IncludeRegistry::key_for_path(&path.to_string_lossy());
            debug!(unit, %err, "unit aborted");
            CompileReport::aborted(&unit, err)
        });
        observer(path, &report);
        summary.record(path.clone(), report);
    }
    summary.elapsed = started.elapsed();
    info!(
        processed = summary.processed,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "batch finished"
    );
    summary
}

pub fn compile_directory(
    session: &mut Session,
    root: impl AsRef<Path>,
    observer: impl FnMut(&Path, &CompileReport),
) -> BatchSummary {
    let files = collect_sources(root);
    compile_files(session, &files, observer)
}

/// Compiles every script named in the list file `list`.
pub fn compile_list(
    session: &mut Session,
    list: impl AsRef<Path>,
    observer: impl FnMut(&Path, &CompileReport),
) -> Result<BatchSummary, CoreError> {
    let files = read_source_list(list)?;
    Ok(compile_files(session, &files, observer))
}
