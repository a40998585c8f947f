//! Token definitions for the hipo lexer.

use std::fmt;

/// A span in the source code, representing a range of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Resolves the start of this span to a 1-based line and column.
    ///
    /// Columns count characters, not bytes.
    pub fn location(&self, source: &str) -> Location {
        let before = source.get(..self.start).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map(|tail| tail.chars().count())
            .unwrap_or(0)
            + 1;
        Location { line, column }
    }
}

/// A human-facing source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The different kinds of tokens in a hipo program.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Numeric literal (integer or decimal)
    Number(f64),
    /// Variable name, including the leading `$`
    Variable(String),
    /// Bare identifier (function names)
    Identifier(String),

    // Keywords
    /// `echo`
    Echo,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `function`
    Function,
    /// `floatval`
    Floatval,
    /// `readline`
    Readline,
    /// `PHP_EOL`
    PhpEol,

    // Program markers
    /// `<?php`
    OpenTag,
    /// `?>`
    CloseTag,

    // Operators
    /// ==
    EqualEqual,
    /// !=
    BangEqual,
    /// &&
    AmpAmp,
    /// ||
    PipePipe,
    /// !
    Bang,
    /// >=
    GreaterEqual,
    /// <=
    LessEqual,
    /// >
    Greater,
    /// <
    Less,
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// =
    Equal,

    // Punctuation
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// .
    Dot,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// {
    LeftBrace,
    /// }
    RightBrace,

    // Special
    /// A character the language does not recognize
    Invalid(char),
    /// End of file
    Eof,
}

impl TokenKind {
    /// Maps a reserved word to its keyword token.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "echo" => TokenKind::Echo,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "function" => TokenKind::Function,
            "floatval" => TokenKind::Floatval,
            "readline" => TokenKind::Readline,
            "PHP_EOL" => TokenKind::PhpEol,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns true if this token is a keyword.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Echo
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Function
                | TokenKind::Floatval
                | TokenKind::Readline
                | TokenKind::PhpEol
        )
    }

    /// Returns true if this token is a relational operator.
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            TokenKind::EqualEqual
                | TokenKind::BangEqual
                | TokenKind::GreaterEqual
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::Less
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Variable(name) => write!(f, "variable {}", name),
            TokenKind::Identifier(name) => write!(f, "identifier {}", name),
            TokenKind::Echo => f.write_str("'echo'"),
            TokenKind::If => f.write_str("'if'"),
            TokenKind::Else => f.write_str("'else'"),
            TokenKind::While => f.write_str("'while'"),
            TokenKind::Function => f.write_str("'function'"),
            TokenKind::Floatval => f.write_str("'floatval'"),
            TokenKind::Readline => f.write_str("'readline'"),
            TokenKind::PhpEol => f.write_str("'PHP_EOL'"),
            TokenKind::OpenTag => f.write_str("'<?php'"),
            TokenKind::CloseTag => f.write_str("'?>'"),
            TokenKind::EqualEqual => f.write_str("'=='"),
            TokenKind::BangEqual => f.write_str("'!='"),
            TokenKind::AmpAmp => f.write_str("'&&'"),
            TokenKind::PipePipe => f.write_str("'||'"),
            TokenKind::Bang => f.write_str("'!'"),
            TokenKind::GreaterEqual => f.write_str("'>='"),
            TokenKind::LessEqual => f.write_str("'<='"),
            TokenKind::Greater => f.write_str("'>'"),
            TokenKind::Less => f.write_str("'<'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Equal => f.write_str("'='"),
            TokenKind::Semicolon => f.write_str("';'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::LeftParen => f.write_str("'('"),
            TokenKind::RightParen => f.write_str("')'"),
            TokenKind::LeftBrace => f.write_str("'{'"),
            TokenKind::RightBrace => f.write_str("'}'"),
            TokenKind::Invalid(ch) => write!(f, "unexpected character '{}'", ch),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_len() {
        let span = Span::new(3, 8);
        assert_eq!(span.len(), 5);
        assert!(!span.is_empty());
        assert!(Span::new(4, 4).is_empty());
    }

    #[test]
    fn test_span_location() {
        let source = "<?php\n  $x = 1;\n?>";
        let offset = source.find('$').unwrap();
        let loc = Span::new(offset, offset + 2).location(source);
        assert_eq!(loc, Location { line: 2, column: 3 });
        assert_eq!(loc.to_string(), "2:3");
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("echo"), Some(TokenKind::Echo));
        assert_eq!(TokenKind::keyword("PHP_EOL"), Some(TokenKind::PhpEol));
        assert_eq!(TokenKind::keyword("Echo"), None);
        assert!(TokenKind::Floatval.is_keyword());
        assert!(!TokenKind::Plus.is_keyword());
    }

    #[test]
    fn test_relational() {
        assert!(TokenKind::LessEqual.is_relational());
        assert!(!TokenKind::AmpAmp.is_relational());
    }
}
