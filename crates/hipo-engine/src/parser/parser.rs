//! The main parser implementation.

use std::borrow::Cow;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::Error;
use crate::ast::*;
use crate::lexer::{self, Span, Token, TokenKind};

/// A recursive descent parser for hipo programs.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Cow<'a, [Token]>,
    position: usize,
    eof: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self::with_tokens(source, Cow::Owned(lexer::scan(source)))
    }

    /// Creates a parser over an already scanned token stream.
    pub fn from_tokens(source: &'a str, tokens: &'a [Token]) -> Self {
        Self::with_tokens(source, Cow::Borrowed(tokens))
    }

    fn with_tokens(source: &'a str, tokens: Cow<'a, [Token]>) -> Self {
        let end = source.len();
        Self {
            source,
            tokens,
            position: 0,
            eof: Token::new(TokenKind::Eof, Span::new(end, end)),
        }
    }

    /// Parses the source code into a Program AST node.
    pub fn parse_program(&mut self) -> Result<Program, Error> {
        trace!("enter <program>");
        self.expect(&TokenKind::OpenTag)?;
        let body = self.parse_body(true)?;
        self.expect(&TokenKind::CloseTag)?;

        if !self.is_at_end() {
            return Err(self.error(format!(
                "unexpected {} after '?>'",
                self.current().kind
            )));
        }

        Ok(Program { body })
    }

    /// Parses a body: the declaration phase followed by statements.
    ///
    /// The declaration phase ends at the first token that is neither a
    /// function declaration nor a not-yet-declared variable.
    fn parse_body(&mut self, allow_functions: bool) -> Result<Body, Error> {
        trace!(allow_functions, "enter <body>");
        let mut declarations = Vec::new();
        let mut declared = FxHashSet::default();

        loop {
            if allow_functions && self.check(&TokenKind::Function) {
                declarations.push(Declaration::Function(self.parse_function_declaration()?));
                continue;
            }
            if let TokenKind::Variable(name) = &self.current().kind {
                // `$f(...)` is a call statement, not a declaration
                if declared.contains(name) || self.peek_kind() == Some(&TokenKind::LeftParen) {
                    break;
                }
                let name = name.clone();
                declarations.push(Declaration::Var(self.parse_variable_declaration()?));
                declared.insert(name);
                continue;
            }
            break;
        }

        let statements = self.parse_statements()?;
        Ok(Body {
            declarations,
            statements,
        })
    }

    fn parse_variable_declaration(&mut self) -> Result<VarDecl, Error> {
        let name = self.expect_variable()?;
        trace!(%name, "enter <var_decl>");

        let initializer = if self.check(&TokenKind::Equal) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon)?;

        Ok(VarDecl { name, initializer })
    }

    fn parse_function_declaration(&mut self) -> Result<FuncDecl, Error> {
        self.advance(); // consume 'function'

        let name = self.expect_identifier()?;
        trace!(%name, "enter <func_decl>");
        self.expect(&TokenKind::LeftParen)?;
        let params = self.parse_parameters()?;
        self.expect(&TokenKind::RightParen)?;

        self.expect(&TokenKind::LeftBrace)?;
        let body = self.parse_body(false)?;
        self.expect(&TokenKind::RightBrace)?;

        Ok(FuncDecl { name, params, body })
    }

    fn parse_parameters(&mut self) -> Result<Vec<String>, Error> {
        let mut params = Vec::new();

        if matches!(self.current().kind, TokenKind::Variable(_)) {
            loop {
                params.push(self.expect_variable()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        Ok(params)
    }

    fn parse_statements(&mut self) -> Result<Vec<Statement>, Error> {
        let mut statements = Vec::new();
        while self.at_statement_start() {
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn at_statement_start(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Echo
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Variable(_)
                | TokenKind::Identifier(_)
        )
    }

    /// Parses a single statement.
    pub fn parse_statement(&mut self) -> Result<Statement, Error> {
        match &self.current().kind {
            TokenKind::Echo => self.parse_echo_statement(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Variable(_) => self.parse_variable_statement(),
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier()?;
                let args = self.parse_arguments()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Statement::Call(Call { name, args }))
            }
            _ => Err(self.error(format!(
                "expected statement (echo, if, while or $var), found {}",
                self.current().kind
            ))),
        }
    }

    fn parse_echo_statement(&mut self) -> Result<Statement, Error> {
        self.advance(); // consume 'echo'
        let expr = self.parse_expression()?;
        self.expect(&TokenKind::Dot)?;
        self.expect(&TokenKind::PhpEol)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Statement::Echo(expr))
    }

    fn parse_if_statement(&mut self) -> Result<Statement, Error> {
        self.advance(); // consume 'if'
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_condition()?;
        self.expect(&TokenKind::RightParen)?;
        let then_body = self.parse_block()?;

        let else_body = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Statement::If(IfStatement {
            condition,
            then_body,
            else_body,
        }))
    }

    fn parse_while_statement(&mut self) -> Result<Statement, Error> {
        self.advance(); // consume 'while'
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_condition()?;
        self.expect(&TokenKind::RightParen)?;
        let body = self.parse_block()?;
        Ok(Statement::While(WhileStatement { condition, body }))
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, Error> {
        self.expect(&TokenKind::LeftBrace)?;
        let statements = self.parse_statements()?;
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }

    /// `$x = expr;` or `$f(args);`
    fn parse_variable_statement(&mut self) -> Result<Statement, Error> {
        let name = self.expect_variable()?;

        if self.check(&TokenKind::Equal) {
            self.advance();
            let expr = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon)?;
            return Ok(Statement::Assign(Assignment { name, expr }));
        }

        if self.check(&TokenKind::LeftParen) {
            let args = self.parse_arguments()?;
            self.expect(&TokenKind::Semicolon)?;
            let name = name.strip_prefix('$').unwrap_or(&name).to_string();
            return Ok(Statement::Call(Call { name, args }));
        }

        Err(self.error(format!(
            "expected '=' or '(' after variable, found {}",
            self.current().kind
        )))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, Error> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();

        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    fn parse_condition(&mut self) -> Result<Condition, Error> {
        Ok(Condition::from(self.parse_disjunction()?))
    }

    fn parse_disjunction(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_conjunction()?;
        while self.check(&TokenKind::PipePipe) {
            self.advance();
            let right = self.parse_conjunction()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_conjunction(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_negation()?;
        while self.check(&TokenKind::AmpAmp) {
            self.advance();
            let right = self.parse_negation()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    /// Parses `!cond`, a parenthesized condition, or a relation.
    ///
    /// A parenthesized condition may continue as arithmetic and then as a
    /// relation, so `($a + 1) * 2 > $b` parses as expected.
    fn parse_negation(&mut self) -> Result<Expr, Error> {
        if self.check(&TokenKind::Bang) {
            self.advance();
            let operand = self.parse_negation()?;
            return Ok(Expr::unary(UnaryOp::Not, operand));
        }

        if self.check(&TokenKind::LeftParen) {
            self.advance();
            let inner = self.parse_disjunction()?;
            self.expect(&TokenKind::RightParen)?;

            let arithmetic = self.parse_more_factors(inner)?;
            let arithmetic = self.parse_more_terms(arithmetic)?;
            if self.current().kind.is_relational() {
                return self.parse_relation_with(arithmetic);
            }
            return Ok(arithmetic);
        }

        let left = self.parse_expression()?;
        self.parse_relation_with(left)
    }

    fn parse_relation_with(&mut self, left: Expr) -> Result<Expr, Error> {
        let op = match self.current().kind {
            TokenKind::EqualEqual => BinaryOp::Eq,
            TokenKind::BangEqual => BinaryOp::Ne,
            TokenKind::GreaterEqual => BinaryOp::Ge,
            TokenKind::LessEqual => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::Less => BinaryOp::Lt,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_expression()?;
        Ok(Expr::binary(op, left, right))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Parses an arithmetic expression or `floatval(readline())`.
    pub fn parse_expression(&mut self) -> Result<Expr, Error> {
        if self.check(&TokenKind::Floatval) {
            self.advance();
            self.expect(&TokenKind::LeftParen)?;
            self.expect(&TokenKind::Readline)?;
            self.expect(&TokenKind::LeftParen)?;
            self.expect(&TokenKind::RightParen)?;
            self.expect(&TokenKind::RightParen)?;
            return Ok(Expr::Read);
        }

        let term = self.parse_term()?;
        self.parse_more_terms(term)
    }

    fn parse_more_terms(&mut self, mut left: Expr) -> Result<Expr, Error> {
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, Error> {
        let negative = self.check(&TokenKind::Minus);
        if negative {
            self.advance();
        }

        let mut factor = self.parse_factor()?;
        if negative {
            factor = Expr::unary(UnaryOp::Neg, factor);
        }

        self.parse_more_factors(factor)
    }

    fn parse_more_factors(&mut self, mut left: Expr) -> Result<Expr, Error> {
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, Error> {
        match &self.current().kind {
            TokenKind::Variable(name) => {
                let expr = Expr::Var(name.clone());
                self.advance();
                Ok(expr)
            }
            TokenKind::Number(n) => {
                let expr = Expr::Number(*n);
                self.advance();
                Ok(expr)
            }
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier()?;
                let args = self.parse_arguments()?;
                Ok(Expr::Call(Call { name, args }))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.error(format!(
                "expected variable, number, function call or '(', found {}",
                self.current().kind
            ))),
        }
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&self.eof)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.position + 1).map(|token| &token.kind)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), Error> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", kind, self.current().kind)))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, Error> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(format!("expected identifier, found {}", self.current().kind)))
        }
    }

    fn expect_variable(&mut self) -> Result<String, Error> {
        if let TokenKind::Variable(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(format!("expected variable, found {}", self.current().kind)))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    /// Builds an error positioned at the current token.
    ///
    /// An unrecognized character surfaces as a lexical error rather than a
    /// syntax error.
    fn error(&self, message: String) -> Error {
        let location = self.current().span.location(self.source);
        match self.current().kind {
            TokenKind::Invalid(ch) => Error::Lexical {
                message: format!("unexpected character '{}'", ch),
                line: location.line,
                column: location.column,
            },
            _ => Error::Syntax {
                message,
                line: location.line,
                column: location.column,
            },
        }
    }
}
