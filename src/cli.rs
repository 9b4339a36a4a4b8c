//! The fnxc command-line interface.
//!
//! Exit codes: `0` on success, `1` on a user error or panic, `2` on an
//! internal unimplemented path.

use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::fs;
use std::path::PathBuf;

use onyx_base::{Style, Unimplemented};
use onyx_compile::Program;

use crate::emit;

pub const EXIT_OK: i32 = 0;
pub const EXIT_PANIC: i32 = 1;
pub const EXIT_UNIMPLEMENTED: i32 = 2;

#[derive(Parser)]
#[command(name = "fnxc")]
#[command(about = "The Fancy Onyx compiler", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile an Onyx program
    Compile(CompileArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmitKind {
    /// An executable file
    Exe,
    /// An MLIR archive
    Mlir,
    /// An LLIR archive
    Llir,
}

#[derive(Debug, clap::Args)]
pub struct CompileArgs {
    /// The input source path
    pub input: PathBuf,

    /// Output file path
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Disable output
    #[arg(long)]
    pub no_output: bool,

    /// What to emit
    #[arg(long, value_enum, default_value_t = EmitKind::Exe)]
    pub emit: EmitKind,

    /// Skip emission, parse and typecheck only
    #[arg(long)]
    pub no_emit: bool,

    /// Cache directory; defaults to `<cwd>/.fnxccache/`
    #[arg(long, short = 'C')]
    pub cache: Option<PathBuf>,

    /// Disable the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Optimization level, passed through to the backend
    #[arg(short = 'O', default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub opt: u8,

    /// C include paths
    #[arg(short = 'I')]
    pub include_paths: Vec<PathBuf>,

    /// C library search paths
    #[arg(short = 'L')]
    pub library_paths: Vec<PathBuf>,

    /// C libraries to link
    #[arg(short = 'l')]
    pub libraries: Vec<String>,

    /// C preprocessor definitions
    #[arg(short = 'D')]
    pub defines: Vec<String>,

    /// Onyx import paths
    #[arg(short = 'M')]
    pub import_paths: Vec<PathBuf>,

    /// Macro require paths
    #[arg(short = 'R')]
    pub require_paths: Vec<PathBuf>,

    /// Target triple
    #[arg(short = 't')]
    pub target: Option<String>,

    /// Target features
    #[arg(short = 'm')]
    pub features: Vec<String>,

    /// Increase logger verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease logger verbosity (-q, -qq)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

/// Run the CLI, returning the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile(args) => {
            init_logger(args.verbose, args.quiet);
            cmd_compile(args)
        }
    }
}

/// Map the -v/-q counts onto the logger's level scale.
fn init_logger(verbose: u8, quiet: u8) {
    let level = match verbose as i8 - quiet as i8 {
        i8::MIN..=-2 => log::LevelFilter::Off,
        -1 => log::LevelFilter::Error,
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let _ = env_logger::Builder::new().filter_level(level).try_init();
}

fn cmd_compile(args: CompileArgs) -> i32 {
    if !args.no_cache {
        let cache_dir = args
            .cache
            .clone()
            .unwrap_or_else(|| env::current_dir().unwrap_or_default().join(".fnxccache"));
        if let Err(error) = fs::create_dir_all(&cache_dir) {
            log::warn!(target: "cli", "can not create cache dir: {error}");
        }
    }

    let mut program = Program::new();
    let compilation = match program.compile(&args.input) {
        Ok(compilation) => compilation,
        Err(panic) => {
            eprintln!("{}", panic.render(&program.source_map));
            return EXIT_PANIC;
        }
    };

    for panic in &compilation.panics {
        eprintln!("{}", panic.render(&program.source_map));
    }

    if !compilation.is_clean() {
        eprintln!(
            "{}: {} error(s) emitted",
            Style::error_label("failure"),
            compilation.panics.len()
        );
        return EXIT_PANIC;
    }

    if args.no_emit {
        return EXIT_OK;
    }

    match args.emit {
        EmitKind::Mlir => {
            let output = if args.no_output {
                emit::Output::Disabled
            } else {
                match &args.output {
                    Some(path) => emit::Output::Path(path.clone()),
                    None => emit::Output::Stdout,
                }
            };

            match emit::emit_mlir(&compilation, output) {
                Ok(()) => EXIT_OK,
                Err(error) => {
                    eprintln!("{}: {error}", Style::error_label("error"));
                    EXIT_PANIC
                }
            }
        }

        EmitKind::Exe | EmitKind::Llir => {
            // LLVM lowering and linking live behind this interface, but
            // are not wired up.
            let report = Unimplemented::new("LLIR lowering");
            eprintln!("{}", report);
            EXIT_UNIMPLEMENTED
        }
    }
}
