use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use ncsc_core::batch::{collect_sources, compile_files, read_source_list};
use ncsc_core::disasm::{disassemble, render};
use ncsc_core::{CompileOptions, CompileReport, CompileStatus, Session};
use tracing_subscriber::EnvFilter;

/// コマンドライン引数を定義するための構造体
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scripts to compile (the .nss extension may be omitted)
    #[arg(required_unless_present = "list", value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    #[arg(short, long, value_name = "FILE", help = "Compile the scripts named in a list file, one per line")]
    list: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE", help = "Output file (single input only)")]
    output: Option<PathBuf>,

    #[arg(
        short = 'i',
        long = "include",
        value_name = "DIR",
        help = "Additional include directory; may be repeated"
    )]
    include_dirs: Vec<PathBuf>,

    #[arg(short = 'g', long, help = "Compile in debug mode")]
    debug: bool,

    #[arg(short = 'd', long, help = "Treat inputs as directories and compile every .nss below them")]
    directory: bool,

    #[arg(long, help = "Print the instruction listing of compiled .ncs files")]
    disasm: bool,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn execute(cli: Cli) -> Result<()> {
    if cli.disasm {
        for input in &cli.inputs {
            print_listing(input)?;
        }
        return Ok(());
    }

    if cli.output.is_some() && (cli.directory || cli.list.is_some() || cli.inputs.len() > 1) {
        bail!("--output can only be used with a single input script");
    }

    let mut files = if cli.directory {
        let mut files = Vec::new();
        for dir in &cli.inputs {
            if !dir.is_dir() {
                bail!("{} is not a directory", dir.display());
            }
            files.extend(collect_sources(dir));
        }
        files
    } else {
        cli.inputs.clone()
    };
    if let Some(list) = &cli.list {
        files.extend(
            read_source_list(list)
                .with_context(|| format!("failed to read list file {}", list.display()))?,
        );
    }

    let mut session = Session::new(CompileOptions {
        debug: cli.debug,
        include_dirs: cli.include_dirs,
        output: cli.output,
        output_dir: None,
    });
    let verbose = cli.verbose > 0;
    let summary = compile_files(&mut session, &files, |path, report| {
        print_report(path, report, verbose)
    });

    println!(
        "Total Execution time = {} ms",
        summary.elapsed.as_millis()
    );
    println!(
        "Processed {} scripts: {} passed, {} include, {} failed",
        summary.processed, summary.compiled, summary.includes, summary.failed
    );
    if summary.failed > 0 {
        bail!("{} of {} scripts failed", summary.failed, summary.processed);
    }
    Ok(())
}

fn print_report(path: &Path, report: &CompileReport, verbose: bool) {
    // An include's missing entry point is what makes it an include.
    if report.status != CompileStatus::Include || verbose {
        for diagnostic in &report.diagnostics {
            eprintln!("{diagnostic}");
        }
    }
    if let Some(err) = &report.error {
        eprintln!("{}: error: {err}", path.display());
    }
    println!("Script {} - {}", report.unit, report.status);
}

fn print_listing(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let decoded =
        disassemble(&bytes).with_context(|| format!("failed to decode {}", path.display()))?;
    println!("; {} ({} bytes)", path.display(), bytes.len());
    print!("{}", render(&decoded));
    Ok(())
}
