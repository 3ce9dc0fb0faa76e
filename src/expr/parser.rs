//! Recursive-descent parser producing a resolved expression tree.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := NUMBER | IDENT | IDENT '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Exponentiation is right associative and binds tighter than unary minus, so
//! `-x^2` is `-(x^2)` and `2^-1` is `0.5`.
//!
//! Identifiers are resolved while parsing: `x`, declared parameters (as slot
//! indices), constants and functions. Anything else is rejected here so a bad
//! model never reaches the solver.

use crate::error::{FitError, Result};
use crate::expr::lexer::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func1 {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Sech,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Cbrt,
    Abs,
    Erf,
    Erfc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func2 {
    Pow,
    Atan2,
    Min,
    Max,
    Hypot,
}

impl Func1 {
    fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "sin" => Func1::Sin,
            "cos" => Func1::Cos,
            "tan" => Func1::Tan,
            "asin" => Func1::Asin,
            "acos" => Func1::Acos,
            "atan" => Func1::Atan,
            "sinh" => Func1::Sinh,
            "cosh" => Func1::Cosh,
            "tanh" => Func1::Tanh,
            "sech" => Func1::Sech,
            "exp" => Func1::Exp,
            "ln" | "log" => Func1::Ln,
            "log10" => Func1::Log10,
            "sqrt" => Func1::Sqrt,
            "cbrt" => Func1::Cbrt,
            "abs" => Func1::Abs,
            "erf" => Func1::Erf,
            "erfc" => Func1::Erfc,
            _ => return None,
        };
        Some(f)
    }

    pub(crate) fn apply(self, v: f64) -> f64 {
        match self {
            Func1::Sin => v.sin(),
            Func1::Cos => v.cos(),
            Func1::Tan => v.tan(),
            Func1::Asin => v.asin(),
            Func1::Acos => v.acos(),
            Func1::Atan => v.atan(),
            Func1::Sinh => v.sinh(),
            Func1::Cosh => v.cosh(),
            Func1::Tanh => v.tanh(),
            Func1::Sech => 1.0 / v.cosh(),
            Func1::Exp => v.exp(),
            Func1::Ln => v.ln(),
            Func1::Log10 => v.log10(),
            Func1::Sqrt => v.sqrt(),
            Func1::Cbrt => v.cbrt(),
            Func1::Abs => v.abs(),
            Func1::Erf => crate::math::erf(v),
            Func1::Erfc => crate::math::erfc(v),
        }
    }
}

impl Func2 {
    fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "pow" => Func2::Pow,
            "atan2" => Func2::Atan2,
            "min" => Func2::Min,
            "max" => Func2::Max,
            "hypot" => Func2::Hypot,
            _ => return None,
        };
        Some(f)
    }

    pub(crate) fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Func2::Pow => a.powf(b),
            Func2::Atan2 => a.atan2(b),
            Func2::Min => a.min(b),
            Func2::Max => a.max(b),
            Func2::Hypot => a.hypot(b),
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

/// Resolved expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Number(f64),
    X,
    Param(usize),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call1(Func1, Box<Node>),
    Call2(Func2, Box<Node>, Box<Node>),
}

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    parameters: &'a [String],
    referenced: Vec<bool>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Token], parameters: &'a [String]) -> Self {
        Self {
            tokens,
            pos: 0,
            parameters,
            referenced: vec![false; parameters.len()],
        }
    }

    /// Parse the whole token stream; returns the tree and, per declared
    /// parameter, whether the expression references it.
    pub(crate) fn parse(mut self) -> Result<(Node, Vec<bool>)> {
        let node = self.expr()?;
        let tok = self.peek();
        if tok.kind != TokenKind::End {
            return Err(FitError::parse(tok.position, "unexpected trailing input"));
        }
        Ok((node, self.referenced))
    }

    fn peek(&self) -> &Token {
        // `tokenize` always terminates the stream with `End`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        let tok = self.peek();
        if tok.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(FitError::parse(tok.position, format!("expected {what}")))
        }
    }

    fn expr(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            TokenKind::Plus => {
                self.advance();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node> {
        let base = self.primary()?;
        if self.peek().kind == TokenKind::Caret {
            self.advance();
            let exponent = self.unary()?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node> {
        let tok = self.advance().clone();
        match tok.kind {
            TokenKind::Number(v) => Ok(Node::Number(v)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.advance();
                    self.call(&name, tok.position)
                } else {
                    self.identifier(&name)
                }
            }
            TokenKind::End => Err(FitError::parse(tok.position, "unexpected end of expression")),
            _ => Err(FitError::parse(tok.position, "expected a number, identifier or '('")),
        }
    }

    fn identifier(&mut self, name: &str) -> Result<Node> {
        if name == "x" {
            return Ok(Node::X);
        }
        if let Some(idx) = self.parameters.iter().position(|p| p == name) {
            self.referenced[idx] = true;
            return Ok(Node::Param(idx));
        }
        if let Some(v) = constant(name) {
            return Ok(Node::Number(v));
        }
        Err(FitError::UnknownIdentifier(name.to_string()))
    }

    fn call(&mut self, name: &str, position: usize) -> Result<Node> {
        let mut args = vec![self.expr()?];
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            args.push(self.expr()?);
        }
        self.expect(TokenKind::RParen, "')' after function arguments")?;

        if let Some(f) = Func1::lookup(name) {
            let [arg] = <[Node; 1]>::try_from(args).map_err(|args| {
                FitError::parse(position, format!("{name}() takes 1 argument, got {}", args.len()))
            })?;
            return Ok(Node::Call1(f, Box::new(arg)));
        }
        if let Some(f) = Func2::lookup(name) {
            let [a, b] = <[Node; 2]>::try_from(args).map_err(|args| {
                FitError::parse(position, format!("{name}() takes 2 arguments, got {}", args.len()))
            })?;
            return Ok(Node::Call2(f, Box::new(a), Box::new(b)));
        }
        Err(FitError::UnknownIdentifier(name.to_string()))
    }
}

impl Node {
    pub(crate) fn eval(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            Node::Number(v) => *v,
            Node::X => x,
            Node::Param(i) => params.get(*i).copied().unwrap_or(f64::NAN),
            Node::Neg(a) => -a.eval(x, params),
            Node::Binary(op, a, b) => {
                let a = a.eval(x, params);
                let b = b.eval(x, params);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => pow(a, b),
                }
            }
            Node::Call1(f, a) => f.apply(a.eval(x, params)),
            Node::Call2(f, a, b) => f.apply(a.eval(x, params), b.eval(x, params)),
        }
    }
}

/// `powi` for small integral exponents keeps polynomial terms exact.
fn pow(base: f64, exponent: f64) -> f64 {
    if exponent.fract() == 0.0 && exponent.abs() <= 64.0 {
        base.powi(exponent as i32)
    } else {
        base.powf(exponent)
    }
}
