// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for hipo.
//!
//! Every entry is compiled as a whole program and run on the console.

use hipo_engine::compiler::Bytecode;
use hipo_engine::{Engine, Error};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = ".hipo_history";

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
    Bytecode,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let parts: Vec<&str> = rest.splitn(2, char::is_whitespace).collect();
        let cmd = parts.first()?.to_lowercase();
        let arg = parts.get(1).copied();

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            "bytecode" | "bc" => Some((ReplCommand::Bytecode, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Compile and run a source file"),
            (".bytecode", "Toggle printing the generated program"),
        ]
    }
}

const KEYWORDS: &[&str] = &["echo", "if", "else", "while", "function"];

const BUILTINS: &[&str] = &["floatval", "readline", "PHP_EOL"];

/// Completion, hints, highlighting and multi-line validation
#[derive(Default)]
struct HipoHelper {
    completions: Vec<String>,
}

impl HipoHelper {
    fn new() -> Self {
        let completions = KEYWORDS
            .iter()
            .chain(BUILTINS)
            .copied()
            .chain(["floatval(readline())"])
            .chain(
                ReplCommand::all_commands()
                    .iter()
                    .map(|&(cmd, _)| cmd.split_whitespace().next().unwrap_or(cmd)),
            )
            .map(String::from)
            .collect();

        Self { completions }
    }

    fn word_start(line: &str) -> usize {
        line.rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl Completer for HipoHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .completions
            .iter()
            .filter(|kw| kw.starts_with(word))
            .map(|kw| Pair {
                display: kw.clone(),
                replacement: kw[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for HipoHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[Self::word_start(line)..];
        if word.len() < 2 {
            return None;
        }

        self.completions
            .iter()
            .find(|kw| kw.starts_with(word) && kw.len() > word.len())
            .map(|kw| kw[word.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for HipoHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();

        for c in line.chars() {
            if c.is_alphanumeric() || c == '_' || (c == '$' && current_word.is_empty()) {
                current_word.push(c);
                continue;
            }
            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }
            let colored = match c {
                '(' | ')' | '{' | '}' => c.to_string().yellow().to_string(),
                '+' | '-' | '*' | '/' | '=' | '<' | '>' | '!' | '&' | '|' => {
                    c.to_string().cyan().to_string()
                }
                '.' if line.starts_with('.') => c.to_string().magenta().to_string(),
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    if word.starts_with('$') {
        word.green().to_string()
    } else if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if BUILTINS.contains(&word) {
        word.cyan().to_string()
    } else if word.chars().all(|c| c.is_ascii_digit()) {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for HipoHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        if is_balanced(ctx.input()) {
            Ok(ValidationResult::Valid(None))
        } else {
            Ok(ValidationResult::Incomplete)
        }
    }
}

/// Check whether braces and parentheses are balanced.
///
/// Comments are skipped. A closer without its opener counts as balanced so the
/// parser gets to report it.
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            '(' => stack.push(')'),
            '{' => stack.push('}'),
            ')' | '}' => {
                if stack.pop() != Some(c) {
                    return true;
                }
            }
            _ => {}
        }
    }

    stack.is_empty()
}

/// Wraps a REPL entry in the program markers unless it already has them.
fn wrap_source(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("<?php") {
        trimmed.to_string()
    } else {
        format!("<?php\n{}\n?>", trimmed)
    }
}

impl Helper for HipoHelper {}

/// The interactive REPL
pub struct Repl {
    engine: Engine,
    editor: Editor<HipoHelper, DefaultHistory>,
    history_path: PathBuf,
    show_bytecode: bool,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(history_size: usize) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(history_size)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(HipoHelper::new()));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hipo")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let _ = editor.load_history(&history_path);

        Ok(Self {
            engine: Engine::new(),
            editor,
            history_path,
            show_bytecode: false,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "hipo>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.compile_and_run(&wrap_source(trimmed));
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);

        println!();
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!("{}", r#"   _     _             "#.bright_cyan().bold());
        println!("{}", r#"  | |__ (_)_ __   ___  "#.bright_cyan().bold());
        println!("{}", r#"  | '_ \| | '_ \ / _ \ "#.bright_cyan().bold());
        println!("{}", r#"  | | | | | |_) | (_) |"#.bright_cyan().bold());
        println!("{}", r#"  |_| |_|_| .__/ \___/ "#.bright_cyan().bold());
        println!("{}", r#"          |_|          "#.bright_cyan().bold());
        println!();
        println!(
            "  {} {} {}",
            "hipo".white().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{}: {}", "hipo".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
            }
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(Path::new(path.trim())),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
            ReplCommand::Bytecode => {
                self.show_bytecode = !self.show_bytecode;
                let state = if self.show_bytecode { "on" } else { "off" };
                println!("{} {}", "bytecode listing".dimmed(), state.yellow());
            }
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!(
            "  {}",
            "Entries are program bodies; <?php ?> is added when missing.".dimmed()
        );
        println!();
    }

    fn load_file(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(source) => self.compile_and_run(&source),
            Err(e) => eprintln!("{}: {}: {}", "Error".red().bold(), path.display(), e),
        }
    }

    fn compile_and_run(&mut self, source: &str) {
        let compilation = match self.engine.compile(source) {
            Ok(compilation) => compilation,
            Err(e) => return print_error(&e),
        };
        if self.show_bytecode {
            print_listing(&compilation.bytecode);
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let result = self
            .engine
            .run(&compilation.bytecode, &mut stdin.lock(), &mut stdout.lock());
        let _ = stdout.flush();
        if let Err(e) = result {
            print_error(&e);
        }
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

fn print_listing(bytecode: &Bytecode) {
    for line in bytecode.listing().lines() {
        println!("{}", line.dimmed());
    }
}

/// Print a compile or runtime error with its stage
fn print_error(error: &Error) {
    eprintln!("{} {}", format!("[{}]", error.stage()).red().bold(), error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(
            ReplCommand::parse(".help"),
            Some((ReplCommand::Help, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".exit"),
            Some((ReplCommand::Exit, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".load test.php"),
            Some((ReplCommand::Load, Some("test.php")))
        ));
        assert!(matches!(
            ReplCommand::parse(".bytecode"),
            Some((ReplCommand::Bytecode, None))
        ));
        assert!(ReplCommand::parse("echo 1 . PHP_EOL;").is_none());
        assert!(ReplCommand::parse(".unknown").is_none());
    }

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced("$x = (1 + 2);"));
        assert!(is_balanced("function f($a) { echo $a . PHP_EOL; }"));
        assert!(!is_balanced("while ($i < 3) {"));
        assert!(!is_balanced("if (($a > 1)"));
        assert!(is_balanced("// just a comment ("));
        assert!(is_balanced("/* { */ $x;"));
        assert!(is_balanced("}"));
    }

    #[test]
    fn test_wrap_source() {
        assert_eq!(wrap_source("echo 1 . PHP_EOL;"), "<?php\necho 1 . PHP_EOL;\n?>");
        assert_eq!(wrap_source("  <?php $x; ?>  "), "<?php $x; ?>");
    }

    #[test]
    fn test_wrapped_entry_compiles() {
        let source = wrap_source("$x = 2; echo $x * 3 . PHP_EOL;");
        let mut output = Vec::new();
        Engine::new()
            .eval(&source, &mut "".as_bytes(), &mut output)
            .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "[Saida] 6\n");
    }

    #[test]
    fn test_highlight_word() {
        assert_eq!(highlight_word("$x"), "$x".green().to_string());
        assert_eq!(highlight_word("while"), "while".magenta().bold().to_string());
        assert_eq!(highlight_word("other"), "other");
    }
}
