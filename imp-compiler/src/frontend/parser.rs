//! Hand-written recursive-descent parser for the Imp language.
//!
//! Syntax errors are recorded into the [`Diagnostics`] sink; parsing stops at
//! the first one (there is no recovery, the phase boundary validation aborts
//! compilation anyway).

use super::ast::{Cond, Decl, Expr, Program, Stmt, Target};
use super::lexer::{position_to_line_col, tokenize, SpannedToken, Token};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ir::{ArithOp, RelOp};

pub fn parse(source: &str, diags: &mut Diagnostics) -> Option<Program> {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(offset) => {
            let (line, col) = position_to_line_col(source, offset);
            let ch = source[offset..].chars().next().unwrap_or('\0');
            diags.error(
                DiagnosticKind::Syntax,
                line,
                col,
                format!("unexpected character '{}'", ch),
            );
            return None;
        }
    };
    Parser {
        source,
        tokens,
        pos: 0,
        diags,
    }
    .program()
}

struct Parser<'s, 'd> {
    source: &'s str,
    tokens: Vec<SpannedToken>,
    pos: usize,
    diags: &'d mut Diagnostics,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|t| t.token.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Line/column of the current token (or of end-of-input).
    fn position(&self) -> (usize, usize) {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.source.len());
        position_to_line_col(self.source, offset)
    }

    fn syntax_error(&mut self, message: String) {
        let (line, col) = self.position();
        self.diags.error(DiagnosticKind::Syntax, line, col, message);
    }

    fn expect(&mut self, expected: &Token) -> Option<()> {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                Some(())
            }
            Some(t) => {
                let found = t.clone();
                self.syntax_error(format!("expected {}, found {}", expected, found));
                None
            }
            None => {
                self.syntax_error(format!("expected {}, found end of input", expected));
                None
            }
        }
    }

    fn expect_ident(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            Some(t) => {
                let found = t.clone();
                self.syntax_error(format!("expected identifier, found {}", found));
                None
            }
            None => {
                self.syntax_error("expected identifier, found end of input".to_string());
                None
            }
        }
    }

    // ── Program and declarations ────────────────────────────────────────

    fn program(mut self) -> Option<Program> {
        let decls = if self.peek() == Some(&Token::Declare) {
            self.pos += 1;
            self.declarations()?
        } else {
            Vec::new()
        };
        self.expect(&Token::Begin)?;
        let body = self.commands(&[Token::End])?;
        self.expect(&Token::End)?;
        if self.peek().is_some() {
            self.syntax_error("unexpected input after END".to_string());
            return None;
        }
        Some(Program { decls, body })
    }

    fn declarations(&mut self) -> Option<Vec<Decl>> {
        let mut decls = Vec::new();
        loop {
            let (line, col) = self.position();
            let name = self.expect_ident()?;
            if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                let lo = self.signed_bound()?;
                self.expect(&Token::Colon)?;
                let hi = self.signed_bound()?;
                self.expect(&Token::RParen)?;
                decls.push(Decl::Array {
                    name,
                    lo,
                    hi,
                    line,
                    col,
                });
            } else {
                decls.push(Decl::Var { name, line, col });
            }
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                return Some(decls);
            }
        }
    }

    /// Array bound: an optionally negated numeral fitting in an `i64`.
    fn signed_bound(&mut self) -> Option<i64> {
        let negative = if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            true
        } else {
            false
        };
        let (line, col) = self.position();
        match self.advance() {
            Some(Token::Number(n)) => {
                let value = if negative { -n } else { n };
                match i64::try_from(&value) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        self.diags.error(
                            DiagnosticKind::LiteralRange,
                            line,
                            col,
                            format!("array bound {} does not fit in 64 bits", value),
                        );
                        None
                    }
                }
            }
            Some(t) => {
                self.diags.error(
                    DiagnosticKind::Syntax,
                    line,
                    col,
                    format!("expected numeral, found {}", t),
                );
                None
            }
            None => {
                self.syntax_error("expected numeral, found end of input".to_string());
                None
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    fn commands(&mut self, stop: &[Token]) -> Option<Vec<Stmt>> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(t) if stop.contains(t) => return Some(out),
                Some(_) => out.push(self.command()?),
                None => {
                    self.syntax_error("unexpected end of input".to_string());
                    return None;
                }
            }
        }
    }

    fn command(&mut self) -> Option<Stmt> {
        match self.peek() {
            Some(Token::If) => self.if_command(),
            Some(Token::While) => self.while_command(),
            Some(Token::Repeat) => self.repeat_command(),
            Some(Token::For) => self.for_command(),
            Some(Token::Read) => {
                self.pos += 1;
                let target = self.target()?;
                self.expect(&Token::Semicolon)?;
                Some(Stmt::Read { target })
            }
            Some(Token::Write) => {
                self.pos += 1;
                let value = self.expr()?;
                self.expect(&Token::Semicolon)?;
                Some(Stmt::Write { value })
            }
            Some(Token::Ident(_)) => {
                let target = self.target()?;
                self.expect(&Token::Assign)?;
                let value = self.expr()?;
                self.expect(&Token::Semicolon)?;
                Some(Stmt::Assign { target, value })
            }
            Some(t) => {
                let found = t.clone();
                self.syntax_error(format!("expected command, found {}", found));
                None
            }
            None => {
                self.syntax_error("expected command, found end of input".to_string());
                None
            }
        }
    }

    fn if_command(&mut self) -> Option<Stmt> {
        self.expect(&Token::If)?;
        let cond = self.condition()?;
        self.expect(&Token::Then)?;
        let then_branch = self.commands(&[Token::Else, Token::Endif])?;
        let else_branch = if self.peek() == Some(&Token::Else) {
            self.pos += 1;
            Some(self.commands(&[Token::Endif])?)
        } else {
            None
        };
        self.expect(&Token::Endif)?;
        Some(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_command(&mut self) -> Option<Stmt> {
        self.expect(&Token::While)?;
        let cond = self.condition()?;
        self.expect(&Token::Do)?;
        let body = self.commands(&[Token::Endwhile])?;
        self.expect(&Token::Endwhile)?;
        Some(Stmt::While { cond, body })
    }

    fn repeat_command(&mut self) -> Option<Stmt> {
        self.expect(&Token::Repeat)?;
        let body = self.commands(&[Token::Until])?;
        self.expect(&Token::Until)?;
        let cond = self.condition()?;
        self.expect(&Token::Semicolon)?;
        Some(Stmt::Repeat { body, cond })
    }

    fn for_command(&mut self) -> Option<Stmt> {
        let (line, col) = self.position();
        self.expect(&Token::For)?;
        let var = self.expect_ident()?;
        self.expect(&Token::From)?;
        let from = self.expr()?;
        let downto = match self.advance() {
            Some(Token::To) => false,
            Some(Token::Downto) => true,
            other => {
                self.syntax_error(format!(
                    "expected TO or DOWNTO, found {}",
                    other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
                ));
                return None;
            }
        };
        let to = self.expr()?;
        self.expect(&Token::Do)?;
        let body = self.commands(&[Token::Endfor])?;
        self.expect(&Token::Endfor)?;
        Some(Stmt::For {
            var,
            from,
            downto,
            to,
            body,
            line,
            col,
        })
    }

    // ── Expressions and conditions ──────────────────────────────────────

    fn condition(&mut self) -> Option<Cond> {
        let left = self.expr()?;
        let op = match self.advance() {
            Some(Token::Eq) => RelOp::Eq,
            Some(Token::Neq) => RelOp::Ne,
            Some(Token::Lt) => RelOp::Lt,
            Some(Token::Gt) => RelOp::Gt,
            Some(Token::Le) => RelOp::Le,
            Some(Token::Ge) => RelOp::Ge,
            other => {
                self.syntax_error(format!(
                    "expected relational operator, found {}",
                    other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
                ));
                return None;
            }
        };
        let right = self.expr()?;
        Some(Cond { op, left, right })
    }

    fn expr(&mut self) -> Option<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Some(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn term(&mut self) -> Option<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Rem,
                _ => return Some(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn factor(&mut self) -> Option<Expr> {
        let (line, col) = self.position();
        match self.peek() {
            Some(Token::Number(_)) => {
                let Some(Token::Number(value)) = self.advance() else {
                    unreachable!()
                };
                Some(Expr::Num { value, line, col })
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Some(inner)
            }
            Some(Token::Ident(_)) => Some(Expr::Ref(self.target()?)),
            Some(t) => {
                let found = t.clone();
                self.syntax_error(format!("expected expression, found {}", found));
                None
            }
            None => {
                self.syntax_error("expected expression, found end of input".to_string());
                None
            }
        }
    }

    fn target(&mut self) -> Option<Target> {
        let (line, col) = self.position();
        let name = self.expect_ident()?;
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let index = self.index_expr()?;
            self.expect(&Token::RParen)?;
            Some(Target::Elem {
                name,
                index: Box::new(index),
                line,
                col,
            })
        } else {
            Some(Target::Var { name, line, col })
        }
    }

    /// An array index: a general expression, or a negated numeral for cells
    /// below a negative lower bound (run-time values can never go below
    /// zero, so only a literal can address those).
    fn index_expr(&mut self) -> Option<Expr> {
        if self.peek() != Some(&Token::Minus) {
            return self.expr();
        }
        self.pos += 1;
        let (line, col) = self.position();
        match self.advance() {
            Some(Token::Number(n)) => Some(Expr::Num {
                value: -n,
                line,
                col,
            }),
            other => {
                self.syntax_error(format!(
                    "expected numeral after '-', found {}",
                    other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".into())
                ));
                None
            }
        }
    }
}
