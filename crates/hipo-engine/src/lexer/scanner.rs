//! The scanner that produces tokens from source text.

use tracing::trace;

use super::{Span, Token, TokenKind};

/// A scanner that tokenizes hipo source code.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
        }
    }

    /// Returns the source text this scanner reads from.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.current_pos;

        let Some((_pos, ch)) = self.advance() else {
            trace!(offset = start, "token: Eof");
            return Token::new(TokenKind::Eof, Span::new(start, start));
        };

        let kind = match ch {
            // Single-character tokens
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,

            // Multi-character tokens
            '<' => self.scan_less_than(),
            '>' => self.scan_greater_than(),
            '=' => self.scan_equal(),
            '!' => self.scan_bang(),
            '&' => self.scan_pair('&', TokenKind::AmpAmp),
            '|' => self.scan_pair('|', TokenKind::PipePipe),
            '?' => self.scan_pair('>', TokenKind::CloseTag),

            // Numbers
            '0'..='9' => self.scan_number(start),

            // Variables
            '$' => self.scan_variable(start),

            // Identifiers and keywords
            _ if is_id_start(ch) => self.scan_identifier(start),

            _ => TokenKind::Invalid(ch),
        };

        let token = Token::new(kind, Span::new(start, self.current_pos));
        trace!(kind = ?token.kind, start = token.span.start, end = token.span.end, "token");
        token
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        self.advance();
                        self.advance();
                        while let Some(ch) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => {
                        self.advance();
                        self.advance();
                        let mut prev = ' ';
                        while let Some(ch) = self.peek() {
                            self.advance();
                            if prev == '*' && ch == '/' {
                                break;
                            }
                            prev = ch;
                        }
                    }
                    // Division operator
                    _ => break,
                },
                _ => break,
            }
        }
    }

    fn scan_less_than(&mut self) -> TokenKind {
        if self.source[self.current_pos..].starts_with("?php") {
            for _ in 0.."?php".len() {
                self.advance();
            }
            return TokenKind::OpenTag;
        }
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::LessEqual
        } else {
            TokenKind::Less
        }
    }

    fn scan_greater_than(&mut self) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::GreaterEqual
        } else {
            TokenKind::Greater
        }
    }

    fn scan_equal(&mut self) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::EqualEqual
        } else {
            TokenKind::Equal
        }
    }

    fn scan_bang(&mut self) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::BangEqual
        } else {
            TokenKind::Bang
        }
    }

    /// Scans the second half of a two-character token such as `&&` or `?>`.
    fn scan_pair(&mut self, second: char, kind: TokenKind) -> TokenKind {
        if self.peek() == Some(second) {
            self.advance();
            kind
        } else {
            let first = self.source[..self.current_pos].chars().next_back().unwrap_or(second);
            TokenKind::Invalid(first)
        }
    }

    fn scan_number(&mut self, start: usize) -> TokenKind {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }

        // A fraction needs at least one digit after the dot
        if self.peek() == Some('.') && matches!(self.peek_next(), Some('0'..='9')) {
            self.advance();
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }

        let text = &self.source[start..self.current_pos];
        TokenKind::Number(text.parse().unwrap_or(0.0))
    }

    fn scan_variable(&mut self, start: usize) -> TokenKind {
        match self.peek() {
            Some(ch) if is_id_start(ch) => {
                self.consume_identifier_chars();
                TokenKind::Variable(self.source[start..self.current_pos].to_string())
            }
            _ => TokenKind::Invalid('$'),
        }
    }

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        self.consume_identifier_chars();
        let word = &self.source[start..self.current_pos];
        TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()))
    }

    fn consume_identifier_chars(&mut self) {
        while let Some(ch) = self.peek() {
            if !is_id_continue(ch) {
                break;
            }
            self.advance();
        }
    }
}

fn is_id_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_id_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
