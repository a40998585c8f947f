//! CLI argument parsing for hipo.

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};

use crate::config::DEBUG_STAGES;

/// hipo - compiler and stack machine for a small PHP-flavoured language
#[derive(Parser, Debug)]
#[command(name = "hipo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./hipo.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Trace one pipeline stage (repeatable)
    #[arg(
        long,
        global = true,
        value_name = "STAGE",
        value_parser = PossibleValuesParser::new(DEBUG_STAGES.iter().copied())
    )]
    pub debug: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a source file to bytecode
    #[command(alias = "c")]
    Compile(CompileArgs),

    /// Execute a bytecode file
    Run(RunArgs),

    /// Compile and execute a source file without writing anything
    #[command(alias = "x")]
    Exec(ExecArgs),

    /// Print a bytecode file with instruction addresses
    Dump(DumpArgs),
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Source file
    pub source: PathBuf,

    /// Output bytecode file
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Bytecode file
    pub bytecode: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Source file
    pub source: PathBuf,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Bytecode file
    pub bytecode: PathBuf,
}
