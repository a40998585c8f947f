//! Lexical analysis (tokenization) for hipo source code.
//!
//! The lexer transforms source text into a stream of tokens that can be
//! consumed by the parser.
//!
//! ## Structure
//!
//! - `scanner.rs` - Main `Scanner` struct that produces tokens
//! - `token.rs` - `Token` and `TokenKind` definitions
//!
//! ## Usage
//!
//! ```rust
//! use hipo_engine::lexer::{Scanner, TokenKind};
//!
//! let mut scanner = Scanner::new("<?php $x = 42; ?>");
//!
//! loop {
//!     let token = scanner.next_token();
//!     if matches!(token.kind, TokenKind::Eof) {
//!         break;
//!     }
//!     println!("{:?}", token.kind);
//! }
//! ```

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Location, Span, Token, TokenKind};

use crate::Error;

/// Tokenizes a whole source file, including the trailing `Eof` token.
///
/// Fails on the first character the language does not recognize.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let tokens = scan(source);
    for token in &tokens {
        let TokenKind::Invalid(ch) = token.kind else {
            continue;
        };
        let location = token.span.location(source);
        return Err(Error::Lexical {
            message: format!("unexpected character '{}'", ch),
            line: location.line,
            column: location.column,
        });
    }
    Ok(tokens)
}

/// Scans the whole source, keeping `Invalid` tokens, up to and including `Eof`.
pub(crate) fn scan(source: &str) -> Vec<Token> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = scanner.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

/// Renders a token stream one token per line, as written to the tokens artifact.
pub fn dump_tokens(source: &str, tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let location = token.span.location(source);
        let text = source.get(token.span.start..token.span.end).unwrap_or("");
        out.push_str(&format!("{:<8} {:?} '{}'\n", location, token.kind, text));
    }
    out
}
