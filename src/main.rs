// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! hipo - compiler and stack machine for a small PHP-flavoured language
//!
//! This is the main entry point for the hipo CLI/REPL.
//!
//! ## Commands
//!
//! - `compile` writes bytecode plus token, AST and symbol table dumps
//! - `run` executes a bytecode file
//! - `exec` compiles and runs in one step
//! - `dump` prints a bytecode listing
//! - no command starts the interactive REPL

mod cli;
mod config;
mod repl;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use hipo_engine::compiler::Bytecode;
use hipo_engine::{Engine, lexer};
use owo_colors::OwoColorize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, CompileArgs};
use config::Config;

/// Compile stages that leave an error file behind.
const ERROR_STAGES: &[&str] = &["lexer", "parser", "semantic", "codegen"];

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_error(&e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&cli, &config);

    let result = match &cli.command {
        Some(Commands::Compile(args)) => compile(args, &config),
        Some(Commands::Run(args)) => run_bytecode(&args.bytecode),
        Some(Commands::Exec(args)) => exec(&args.source),
        Some(Commands::Dump(args)) => dump(&args.bytecode),
        None => run_repl(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Installs the stderr subscriber.
fn init_tracing(cli: &Cli, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(log_directives(&cli.debug, cli.verbose, &config.debug))
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Filter directives when `RUST_LOG` is unset.
///
/// `--debug` wins over `-v`, which wins over the config file.
fn log_directives(cli_debug: &[String], verbose: u8, config_debug: &[String]) -> String {
    if !cli_debug.is_empty() {
        return stage_directives(cli_debug);
    }
    match verbose {
        0 if !config_debug.is_empty() => stage_directives(config_debug),
        0 => "warn".to_string(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn stage_directives(stages: &[String]) -> String {
    let mut directives = vec!["warn".to_string()];
    for stage in stages {
        let target = match stage.as_str() {
            "lexer" => "hipo_engine::lexer",
            "parser" => "hipo_engine::parser",
            "semantic" => "hipo_engine::semantic",
            "codegen" => "hipo_engine::compiler",
            "vm" => "hipo_engine::vm",
            _ => "hipo_engine",
        };
        directives.push(format!("{}=trace", target));
    }
    directives.join(",")
}

fn compile(args: &CompileArgs, config: &Config) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.bytecode_path());
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    for stage in ERROR_STAGES {
        let stale = error_file(&dir, stage);
        if stale.exists() {
            fs::remove_file(&stale)
                .with_context(|| format!("failed to remove {}", stale.display()))?;
        }
    }

    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("failed to read source file {}", args.source.display()))?;

    let compilation = match Engine::new().compile(&source) {
        Ok(compilation) => compilation,
        Err(e) => {
            let stage = e.stage();
            let path = error_file(&dir, stage);
            fs::write(&path, format!("{}\n", e))
                .with_context(|| format!("failed to write {}", path.display()))?;
            return Err(anyhow::Error::new(e).context(format!("{} stage failed", stage)));
        }
    };

    compilation
        .bytecode
        .save(&output)
        .with_context(|| format!("failed to write bytecode to {}", output.display()))?;

    if config.artifacts {
        let artifacts = [
            ("tokens.txt", lexer::dump_tokens(&source, &compilation.tokens)),
            ("ast.txt", format!("{:#?}\n", compilation.program)),
            ("symbols.txt", compilation.analysis.dump()),
        ];
        for (name, content) in artifacts {
            let path = dir.join(name);
            fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    info!(output = %output.display(), "bytecode written");
    println!(
        "{} {} instructions to {}",
        "Compiled".green().bold(),
        compilation.bytecode.len(),
        output.display().cyan()
    );
    Ok(())
}

fn error_file(dir: &Path, stage: &str) -> PathBuf {
    dir.join(format!("{}_errors.txt", stage))
}

fn run_bytecode(path: &Path) -> Result<()> {
    let bytecode = Bytecode::load_file(path)
        .with_context(|| format!("failed to read bytecode file {}", path.display()))?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let result = Engine::new().run(&bytecode, &mut stdin.lock(), &mut stdout.lock());
    stdout.flush()?;
    result.context("vm stage failed")?;
    Ok(())
}

fn exec(path: &Path) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let result = Engine::new().eval_file(path, &mut stdin.lock(), &mut stdout.lock());
    stdout.flush()?;
    if let Err(e) = result {
        let stage = e.stage();
        return Err(anyhow::Error::new(e).context(format!("{} stage failed", stage)));
    }
    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    let bytecode = Bytecode::load_file(path)
        .with_context(|| format!("failed to read bytecode file {}", path.display()))?;
    print!("{}", bytecode.listing());
    Ok(())
}

/// Start the interactive REPL
fn run_repl(config: &Config) -> Result<()> {
    let mut repl = repl::Repl::new(config.history_size).context("failed to initialize REPL")?;
    repl.run().context("REPL error")?;
    Ok(())
}

fn print_error(error: &anyhow::Error) {
    eprintln!("{}: {:#}", "Error".red().bold(), error);
}
