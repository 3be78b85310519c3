use crate::traits::{Scalar, State};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- Variables & environment ---

/// The two state variables a formula may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    X,
    Y,
}

impl Variable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Variable::X),
            "y" => Some(Variable::Y),
            _ => None,
        }
    }
}

/// Current bindings for `x` and `y`.
/// Passed explicitly to every evaluation; nothing is read from ambient state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment<T = f64> {
    pub x: T,
    pub y: T,
}

impl<T: Scalar> Environment<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn get(&self, var: Variable) -> T {
        match var {
            Variable::X => self.x,
            Variable::Y => self.y,
        }
    }
}

impl From<State> for Environment<f64> {
    fn from(state: State) -> Self {
        Self::new(state.x, state.y)
    }
}

// --- Errors ---

/// What the parser was looking for when it gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Char(char),
    Digit,
    /// Start of a factor: a number, a variable, or `(`.
    Factor,
    EndOfInput,
    /// Parentheses nested deeper than the limit.
    NestingAtMost(usize),
    /// Formula text longer than the limit, in bytes.
    LengthAtMost(usize),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Char(c) => write!(f, "'{c}'"),
            Expected::Digit => f.write_str("digit"),
            Expected::Factor => f.write_str("number, variable or '('"),
            Expected::EndOfInput => f.write_str("end of input"),
            Expected::NestingAtMost(n) => write!(f, "at most {n} nested groups"),
            Expected::LengthAtMost(n) => write!(f, "formula of at most {n} bytes"),
        }
    }
}

/// What the parser actually saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
    Char(char),
    End,
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Found::Char(c) => write!(f, "'{c}'"),
            Found::End => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("{expected} expected at position {position}, found {found}")]
    Syntax {
        position: usize,
        expected: Expected,
        found: Found,
    },
    #[error("unknown name `{name}` at position {position}: only `x` and `y` are defined")]
    Name { position: usize, name: String },
}

impl EvalError {
    /// Byte offset into the formula where the error was detected.
    pub fn position(&self) -> usize {
        match self {
            EvalError::Syntax { position, .. } | EvalError::Name { position, .. } => *position,
        }
    }
}

// --- Operators ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }

    /// Plain IEEE754 arithmetic. Division by zero yields inf or NaN.
    pub fn apply<T: Scalar>(self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

/// Longest formula accepted, in bytes.
pub const MAX_FORMULA_LEN: usize = 4096;
/// Deepest parenthesis nesting accepted.
pub const MAX_NESTING: usize = 64;

fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

// --- Recursive-descent parser ---

/// Receives the productions recognised by the parser, in evaluation order.
/// Folding into numbers evaluates directly; folding into `Expr` builds a tree.
trait Fold {
    type Value;
    fn constant(&mut self, value: f64) -> Self::Value;
    fn variable(&mut self, var: Variable) -> Self::Value;
    fn binary(&mut self, op: BinaryOp, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn negate(&mut self, value: Self::Value) -> Self::Value;
}

struct Direct<'e, T> {
    env: &'e Environment<T>,
}

impl<T: Scalar> Fold for Direct<'_, T> {
    type Value = T;

    fn constant(&mut self, value: f64) -> T {
        constant(value)
    }

    fn variable(&mut self, var: Variable) -> T {
        self.env.get(var)
    }

    fn binary(&mut self, op: BinaryOp, lhs: T, rhs: T) -> T {
        op.apply(lhs, rhs)
    }

    fn negate(&mut self, value: T) -> T {
        -value
    }
}

struct TreeBuilder;

impl Fold for TreeBuilder {
    type Value = Expr;

    fn constant(&mut self, value: f64) -> Expr {
        Expr::Constant(value)
    }

    fn variable(&mut self, var: Variable) -> Expr {
        Expr::Variable(var)
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn negate(&mut self, value: Expr) -> Expr {
        Expr::Negate(Box::new(value))
    }
}

/// Grammar:
///
/// ```text
/// expression := term ( ('+'|'-') term )*
/// term       := factor ( ('*'|'/') factor )*
/// factor     := '-'? ( '(' expression ')' | variable | number )
/// variable   := 'x' | 'y'
/// number     := digit+ ('.' digit+)?
/// ```
///
/// Whitespace is skipped before every token. `pos` is a byte offset and the
/// parser is consumed by `run`, so a cursor never outlives one evaluation.
/// Length and nesting are capped so recursion here, in `Expr` and in the
/// compiler stays within a small stack.
struct Parser<'a, F> {
    src: &'a str,
    pos: usize,
    depth: usize,
    fold: F,
}

impl<'a, F: Fold> Parser<'a, F> {
    fn new(src: &'a str, fold: F) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
            fold,
        }
    }

    fn run(mut self) -> Result<F::Value, EvalError> {
        if self.src.len() > MAX_FORMULA_LEN {
            let (position, found) = self
                .src
                .char_indices()
                .find(|&(i, _)| i >= MAX_FORMULA_LEN)
                .map_or((self.src.len(), Found::End), |(i, c)| (i, Found::Char(c)));
            return Err(EvalError::Syntax {
                position,
                expected: Expected::LengthAtMost(MAX_FORMULA_LEN),
                found,
            });
        }
        let value = self.expression()?;
        match self.peek() {
            None => Ok(value),
            Some(_) => Err(self.syntax(Expected::EndOfInput)),
        }
    }

    fn raw_peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek(&mut self) -> Option<char> {
        while let Some(c) = self.raw_peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }
        self.raw_peek()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn syntax(&self, expected: Expected) -> EvalError {
        EvalError::Syntax {
            position: self.pos,
            expected,
            found: self.raw_peek().map_or(Found::End, Found::Char),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), EvalError> {
        if self.peek() == Some(c) {
            self.bump(c);
            Ok(())
        } else {
            Err(self.syntax(Expected::Char(c)))
        }
    }

    fn expression(&mut self) -> Result<F::Value, EvalError> {
        let mut value = self.term()?;
        loop {
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => break,
            };
            self.bump(op.symbol());
            let rhs = self.term()?;
            value = self.fold.binary(op, value, rhs);
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<F::Value, EvalError> {
        let mut value = self.factor()?;
        loop {
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => break,
            };
            self.bump(op.symbol());
            let rhs = self.factor()?;
            value = self.fold.binary(op, value, rhs);
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<F::Value, EvalError> {
        // At most one sign per factor: `--y` fails in `primary`.
        let negated = self.peek() == Some('-');
        if negated {
            self.bump('-');
        }
        let value = self.primary()?;
        Ok(if negated { self.fold.negate(value) } else { value })
    }

    fn primary(&mut self) -> Result<F::Value, EvalError> {
        match self.peek() {
            Some('(') => {
                if self.depth >= MAX_NESTING {
                    return Err(self.syntax(Expected::NestingAtMost(MAX_NESTING)));
                }
                self.bump('(');
                self.depth += 1;
                let value = self.expression()?;
                self.expect(')')?;
                self.depth -= 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.variable(),
            _ => Err(self.syntax(Expected::Factor)),
        }
    }

    fn variable(&mut self) -> Result<F::Value, EvalError> {
        let src = self.src;
        let start = self.pos;
        while let Some(c) = self.raw_peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump(c);
            } else {
                break;
            }
        }
        let name = &src[start..self.pos];
        match Variable::from_name(name) {
            Some(var) => Ok(self.fold.variable(var)),
            None => Err(EvalError::Name {
                position: start,
                name: name.to_string(),
            }),
        }
    }

    fn digits(&mut self) {
        while let Some(c) = self.raw_peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.bump(c);
        }
    }

    fn number(&mut self) -> Result<F::Value, EvalError> {
        let src = self.src;
        let start = self.pos;
        self.digits();
        if self.raw_peek() == Some('.') {
            self.bump('.');
            if !matches!(self.raw_peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.syntax(Expected::Digit));
            }
            self.digits();
        }
        let value: f64 = src[start..self.pos]
            .parse()
            .map_err(|_| EvalError::Syntax {
                position: start,
                expected: Expected::Digit,
                found: src[start..].chars().next().map_or(Found::End, Found::Char),
            })?;
        Ok(self.fold.constant(value))
    }
}

/// Evaluates `formula` against `env`, scanning the text from the start.
///
/// No structure is retained between calls. For repeated sampling, parse the
/// formula once with [`parse`] and evaluate the tree or its bytecode instead.
pub fn evaluate<T: Scalar>(formula: &str, env: &Environment<T>) -> Result<T, EvalError> {
    Parser::new(formula, Direct { env }).run()
}

/// Parses a formula into an expression tree.
pub fn parse(formula: &str) -> Result<Expr, EvalError> {
    Parser::new(formula, TreeBuilder).run()
}

// --- AST ---

/// Expression tree for a parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(f64),
    Variable(Variable),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
}

impl Expr {
    pub fn eval<T: Scalar>(&self, env: &Environment<T>) -> T {
        match self {
            Expr::Constant(value) => constant(*value),
            Expr::Variable(var) => env.get(*var),
            Expr::Binary(op, lhs, rhs) => op.apply(lhs.eval(env), rhs.eval(env)),
            Expr::Negate(inner) => -inner.eval(env),
        }
    }
}

// --- Bytecode & VM ---

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(f64),
    /// Pushes the current value of `x` or `y`.
    LoadVar(Variable),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Compiles an `Expr` into postfix `Bytecode`.
pub struct Compiler;

impl Compiler {
    pub fn compile(expr: &Expr) -> Bytecode {
        let mut ops = Vec::new();
        Self::compile_recursive(expr, &mut ops);
        Bytecode { ops }
    }

    fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) {
        match expr {
            Expr::Constant(value) => ops.push(OpCode::LoadConst(*value)),
            Expr::Variable(var) => ops.push(OpCode::LoadVar(*var)),
            Expr::Binary(op, lhs, rhs) => {
                Self::compile_recursive(lhs, ops);
                Self::compile_recursive(rhs, ops);
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                });
            }
            Expr::Negate(inner) => {
                Self::compile_recursive(inner, ops);
                ops.push(OpCode::Neg);
            }
        }
    }
}

/// Stack-based virtual machine for evaluating compiled formulas.
///
/// The VM is stateless; `execute` takes the environment and a scratch stack
/// so callers can reuse the allocation across many evaluations.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, env: &Environment<T>, stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(value) => stack.push(constant(*value)),
                OpCode::LoadVar(var) => stack.push(env.get(*var)),
                OpCode::Add => Self::binary(stack, BinaryOp::Add),
                OpCode::Sub => Self::binary(stack, BinaryOp::Sub),
                OpCode::Mul => Self::binary(stack, BinaryOp::Mul),
                OpCode::Div => Self::binary(stack, BinaryOp::Div),
                OpCode::Neg => {
                    let a = Self::pop(stack);
                    stack.push(-a);
                }
            }
        }

        // Compiled code always leaves exactly one value.
        Self::pop(stack)
    }

    fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
        stack.pop().unwrap_or_else(T::nan)
    }

    fn binary<T: Scalar>(stack: &mut Vec<T>, op: BinaryOp) {
        let b = Self::pop(stack);
        let a = Self::pop(stack);
        stack.push(op.apply(a, b));
    }
}

// --- Formula ---

/// A validated formula: the text as typed and its expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    text: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        Ok(Self {
            expr: parse(text)?,
            text: text.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn compile(&self) -> Bytecode {
        Compiler::compile(&self.expr)
    }

    pub fn eval<T: Scalar>(&self, env: &Environment<T>) -> T {
        self.expr.eval(env)
    }
}

impl FromStr for Formula {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
