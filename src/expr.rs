//! Expression parser and evaluator for filter expressions.
//!
//! Supports expressions like:
//! - `delay > 90`
//! - `line == 'A'`
//! - `delay > 90 AND name != 'Bob'`
//! - `(age >= 18) OR (has_permission == true)`
//! - `value IS NULL`
//! - `value IS NOT NULL`
//! - `line IN ('A', 'C', 'E')`
//! - `service_date >= '2024-01-01'`
//!
//! Views parse their filter once at creation and evaluate it per base row
//! through [`eval_expr_fast`], reading cells straight from the table.
//!
//! Computed view columns use [`parse_computed`]: either arithmetic over
//! numeric columns (`delay * 60`, `(a + b) / 2`) or any of the predicates
//! above, which yield a boolean column.

use crate::column::{ColumnType, ColumnValue};
use crate::temporal;
use std::collections::HashMap;

/// A parsed expression that can be evaluated against a row.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Compare column to a literal value
    Compare {
        column: String,
        op: CompareOp,
        value: LiteralValue,
    },
    /// Check if column is NULL
    IsNull { column: String },
    /// Check if column is NOT NULL
    IsNotNull { column: String },
    /// Membership in a literal list
    In {
        column: String,
        values: Vec<LiteralValue>,
        negated: bool,
    },
    /// Logical AND of two expressions
    And(Box<Expr>, Box<Expr>),
    /// Logical OR of two expressions
    Or(Box<Expr>, Box<Expr>),
    /// Logical NOT of an expression
    Not(Box<Expr>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,      // ==
    Ne,      // !=
    Lt,      // <
    Le,      // <=
    Gt,      // >
    Ge,      // >=
}

/// Literal values that can appear in expressions
#[derive(Debug, Clone)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

/// Token types for lexing
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    // Operators
    Eq,       // ==
    Ne,       // !=
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    And,
    Or,
    Not,
    Is,
    In,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

/// Lexer for tokenizing expression strings
struct Lexer {
    input: Vec<char>,
    pos: usize,
    /// Last token ended an operand, so `-` is subtraction
    after_operand: bool,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            after_operand: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self) -> Token {
        let mut num_str = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                num_str.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                num_str.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            Token::Float(num_str.parse().unwrap_or(0.0))
        } else {
            Token::Int(num_str.parse().unwrap_or(0))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, String> {
        self.advance(); // consume opening quote
        let mut s = String::new();

        while let Some(c) = self.peek() {
            if c == quote {
                self.advance(); // consume closing quote
                return Ok(Token::String(s));
            } else if c == '\\' {
                self.advance();
                if let Some(escaped) = self.advance() {
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        '\\' => s.push('\\'),
                        '\'' => s.push('\''),
                        '"' => s.push('"'),
                        _ => s.push(escaped),
                    }
                }
            } else {
                s.push(c);
                self.advance();
            }
        }

        Err("Unterminated string".to_string())
    }

    fn next_token(&mut self) -> Result<Token, String> {
        let token = self.scan()?;
        self.after_operand = matches!(
            token,
            Token::Ident(_) | Token::Int(_) | Token::Float(_) | Token::RParen
        );
        Ok(token)
    }

    fn scan(&mut self) -> Result<Token, String> {
        self.skip_whitespace();

        match self.peek() {
            None => Ok(Token::Eof),
            Some(c) => {
                match c {
                    '(' => { self.advance(); Ok(Token::LParen) }
                    ')' => { self.advance(); Ok(Token::RParen) }
                    ',' => { self.advance(); Ok(Token::Comma) }
                    '=' => {
                        self.advance();
                        if self.peek() == Some('=') {
                            self.advance();
                            Ok(Token::Eq)
                        } else {
                            Ok(Token::Eq) // Single = also means ==
                        }
                    }
                    '!' => {
                        self.advance();
                        if self.peek() == Some('=') {
                            self.advance();
                            Ok(Token::Ne)
                        } else {
                            Ok(Token::Not)
                        }
                    }
                    '<' => {
                        self.advance();
                        if self.peek() == Some('=') {
                            self.advance();
                            Ok(Token::Le)
                        } else {
                            Ok(Token::Lt)
                        }
                    }
                    '>' => {
                        self.advance();
                        if self.peek() == Some('=') {
                            self.advance();
                            Ok(Token::Ge)
                        } else {
                            Ok(Token::Gt)
                        }
                    }
                    '\'' | '"' => self.read_string(c),
                    '+' => { self.advance(); Ok(Token::Plus) }
                    '*' => { self.advance(); Ok(Token::Star) }
                    '/' => { self.advance(); Ok(Token::Slash) }
                    '-' if !self.after_operand && self.input.get(self.pos + 1).map_or(false, |c| c.is_ascii_digit() || *c == '.') => {
                        self.advance(); // consume '-'
                        let token = self.read_number();
                        match token {
                            Token::Int(v) => Ok(Token::Int(-v)),
                            Token::Float(v) => Ok(Token::Float(-v)),
                            other => Ok(other),
                        }
                    }
                    '-' => { self.advance(); Ok(Token::Minus) }
                    _ if c.is_ascii_digit() => Ok(self.read_number()),
                    _ if c.is_alphabetic() || c == '_' => {
                        let ident = self.read_ident();
                        // Check for keywords
                        match ident.to_uppercase().as_str() {
                            "AND" => Ok(Token::And),
                            "OR" => Ok(Token::Or),
                            "NOT" => Ok(Token::Not),
                            "IS" => Ok(Token::Is),
                            "IN" => Ok(Token::In),
                            "NULL" => Ok(Token::Null),
                            "TRUE" => Ok(Token::Bool(true)),
                            "FALSE" => Ok(Token::Bool(false)),
                            _ => Ok(Token::Ident(ident)),
                        }
                    }
                    _ => Err(format!("Unexpected character: {}", c)),
                }
            }
        }
    }
}

/// Parser for building expression AST
struct Parser {
    lexer: Lexer,
    current: Token,
}

impl Parser {
    fn new(input: &str) -> Result<Self, String> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn advance(&mut self) -> Result<(), String> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(format!("Expected {:?}, got {:?}", expected, self.current))
        }
    }

    /// Parse a full expression
    fn parse(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    /// Parse OR expressions (lowest precedence)
    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;

        while self.current == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// Parse AND expressions
    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;

        while self.current == Token::And {
            self.advance()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// Parse NOT expressions
    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.current == Token::Not {
            self.advance()?;
            let expr = self.parse_not()?;
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_comparison()
        }
    }

    /// Parse comparison expressions
    fn parse_comparison(&mut self) -> Result<Expr, String> {
        // Handle parentheses
        if self.current == Token::LParen {
            self.advance()?;
            let expr = self.parse()?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        // Expect a column name
        let column = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(format!("Expected column name, got {:?}", self.current)),
        };
        self.advance()?;

        // Handle IS NULL / IS NOT NULL
        if self.current == Token::Is {
            self.advance()?;
            if self.current == Token::Not {
                self.advance()?;
                if self.current != Token::Null {
                    return Err("Expected NULL after IS NOT".to_string());
                }
                self.advance()?;
                return Ok(Expr::IsNotNull { column });
            } else if self.current == Token::Null {
                self.advance()?;
                return Ok(Expr::IsNull { column });
            } else {
                return Err("Expected NULL or NOT NULL after IS".to_string());
            }
        }

        // Handle [NOT] IN (...)
        if self.current == Token::In {
            self.advance()?;
            return self.parse_in_list(column, false);
        }
        if self.current == Token::Not {
            self.advance()?;
            self.expect(&Token::In)?;
            return self.parse_in_list(column, true);
        }

        // Parse comparison operator
        let op = match &self.current {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            _ => return Err(format!("Expected comparison operator, got {:?}", self.current)),
        };
        self.advance()?;

        let value = self.parse_literal()?;
        Ok(Expr::Compare { column, op, value })
    }

    fn parse_literal(&mut self) -> Result<LiteralValue, String> {
        let value = match &self.current {
            Token::Int(n) => LiteralValue::Int(*n),
            Token::Float(f) => LiteralValue::Float(*f),
            Token::String(s) => LiteralValue::String(s.clone()),
            Token::Bool(b) => LiteralValue::Bool(*b),
            Token::Null => LiteralValue::Null,
            _ => return Err(format!("Expected literal value, got {:?}", self.current)),
        };
        self.advance()?;
        Ok(value)
    }

    /// sum := term (('+' | '-') term)*
    fn parse_sum(&mut self) -> Result<Arith, String> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = Arith::Binary(Box::new(left), op, Box::new(right));
        }
    }

    /// term := factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Arith, String> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_factor()?;
            left = Arith::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_factor(&mut self) -> Result<Arith, String> {
        let factor = match self.current.clone() {
            Token::Int(n) => Arith::Int(n),
            Token::Float(f) => Arith::Float(f),
            Token::Ident(name) => Arith::Column(name),
            Token::Minus => {
                self.advance()?;
                return Ok(Arith::Neg(Box::new(self.parse_factor()?)));
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_sum()?;
                self.expect(&Token::RParen)?;
                return Ok(inner);
            }
            other => return Err(format!("Expected number, column or '(', got {:?}", other)),
        };
        self.advance()?;
        Ok(factor)
    }

    fn parse_in_list(&mut self, column: String, negated: bool) -> Result<Expr, String> {
        self.expect(&Token::LParen)?;
        let mut values = vec![self.parse_literal()?];
        while self.current == Token::Comma {
            self.advance()?;
            values.push(self.parse_literal()?);
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::In { column, values, negated })
    }
}

/// Parse an expression string into an Expr AST.
pub fn parse_expr(input: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse()?;

    // Ensure we consumed all input
    if parser.current != Token::Eof {
        return Err(format!("Unexpected token after expression: {:?}", parser.current));
    }

    Ok(expr)
}

/// Arithmetic over numeric columns and literals.
#[derive(Debug, Clone)]
pub enum Arith {
    Column(String),
    Int(i64),
    Float(f64),
    Neg(Box<Arith>),
    Binary(Box<Arith>, ArithOp, Box<Arith>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A computed column: a number or a predicate result.
#[derive(Debug, Clone)]
pub enum Computed {
    Arith(Arith),
    Predicate(Expr),
}

/// Parse a computed column expression. Arithmetic is tried first; anything
/// that is not pure arithmetic must be a predicate.
pub fn parse_computed(input: &str) -> Result<Computed, String> {
    let arith = Parser::new(input).and_then(|mut parser| {
        let arith = parser.parse_sum()?;
        if parser.current != Token::Eof {
            return Err(format!("Unexpected token after expression: {:?}", parser.current));
        }
        Ok(arith)
    });
    match arith {
        Ok(arith) => Ok(Computed::Arith(arith)),
        Err(_) => parse_expr(input).map(Computed::Predicate),
    }
}

impl Computed {
    /// Table columns the expression reads.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Computed::Predicate(expr) => extract_columns(expr),
            Computed::Arith(arith) => {
                let mut columns = Vec::new();
                arith_columns(arith, &mut columns);
                columns.sort();
                columns.dedup();
                columns
            }
        }
    }

    /// Result type, given the types of the columns it reads. Arithmetic on
    /// integers stays integer except for division; anything touching a
    /// float is float.
    pub fn output_type<F>(&self, column_type: &F) -> Result<ColumnType, String>
    where
        F: Fn(&str) -> Option<ColumnType>,
    {
        match self {
            Computed::Predicate(_) => Ok(ColumnType::Boolean),
            Computed::Arith(arith) => arith_type(arith, column_type),
        }
    }

    /// Evaluate against one row. Nulls propagate; integer overflow and
    /// division by zero give null.
    pub fn eval<F>(&self, get_column: &F) -> ColumnValue
    where
        F: Fn(&str) -> Option<ColumnValue>,
    {
        match self {
            Computed::Predicate(expr) => ColumnValue::Boolean(eval_expr_fast(expr, get_column)),
            Computed::Arith(arith) => eval_arith(arith, get_column),
        }
    }
}

fn arith_columns(arith: &Arith, columns: &mut Vec<String>) {
    match arith {
        Arith::Column(name) => columns.push(name.clone()),
        Arith::Int(_) | Arith::Float(_) => {}
        Arith::Neg(inner) => arith_columns(inner, columns),
        Arith::Binary(left, _, right) => {
            arith_columns(left, columns);
            arith_columns(right, columns);
        }
    }
}

fn arith_type<F>(arith: &Arith, column_type: &F) -> Result<ColumnType, String>
where
    F: Fn(&str) -> Option<ColumnType>,
{
    match arith {
        Arith::Int(_) => Ok(ColumnType::Integer),
        Arith::Float(_) => Ok(ColumnType::Float),
        Arith::Column(name) => match column_type(name) {
            Some(ty) if ty.is_numeric() => Ok(ty),
            Some(ty) => Err(format!("Column '{}' is {}, arithmetic needs a number", name, ty)),
            None => Err(format!("Column '{}' not found", name)),
        },
        Arith::Neg(inner) => arith_type(inner, column_type),
        Arith::Binary(left, op, right) => {
            let left = arith_type(left, column_type)?;
            let right = arith_type(right, column_type)?;
            if *op != ArithOp::Div && left == ColumnType::Integer && right == ColumnType::Integer {
                Ok(ColumnType::Integer)
            } else {
                Ok(ColumnType::Float)
            }
        }
    }
}

fn eval_arith<F>(arith: &Arith, get_column: &F) -> ColumnValue
where
    F: Fn(&str) -> Option<ColumnValue>,
{
    match arith {
        Arith::Int(n) => ColumnValue::Integer(*n),
        Arith::Float(f) => ColumnValue::Float(*f),
        Arith::Column(name) => match get_column(name) {
            Some(v @ ColumnValue::Integer(_)) | Some(v @ ColumnValue::Float(_)) => v,
            _ => ColumnValue::Null,
        },
        Arith::Neg(inner) => match eval_arith(inner, get_column) {
            ColumnValue::Integer(n) => n.checked_neg().map_or(ColumnValue::Null, ColumnValue::Integer),
            ColumnValue::Float(f) => ColumnValue::Float(-f),
            _ => ColumnValue::Null,
        },
        Arith::Binary(left, op, right) => {
            let left = eval_arith(left, get_column);
            let right = eval_arith(right, get_column);
            match (left, right, op) {
                (ColumnValue::Integer(a), ColumnValue::Integer(b), ArithOp::Add) => {
                    a.checked_add(b).map_or(ColumnValue::Null, ColumnValue::Integer)
                }
                (ColumnValue::Integer(a), ColumnValue::Integer(b), ArithOp::Sub) => {
                    a.checked_sub(b).map_or(ColumnValue::Null, ColumnValue::Integer)
                }
                (ColumnValue::Integer(a), ColumnValue::Integer(b), ArithOp::Mul) => {
                    a.checked_mul(b).map_or(ColumnValue::Null, ColumnValue::Integer)
                }
                (a, b, op) => match (a.as_f64(), b.as_f64()) {
                    (Some(_), Some(b)) if *op == ArithOp::Div && b == 0.0 => ColumnValue::Null,
                    (Some(a), Some(b)) => ColumnValue::Float(match op {
                        ArithOp::Add => a + b,
                        ArithOp::Sub => a - b,
                        ArithOp::Mul => a * b,
                        ArithOp::Div => a / b,
                    }),
                    _ => ColumnValue::Null,
                },
            }
        }
    }
}

/// Evaluate an expression against a materialized row.
pub fn eval_expr(expr: &Expr, row: &HashMap<String, ColumnValue>) -> bool {
    eval_expr_fast(expr, &|column: &str| row.get(column).cloned())
}

/// Compare a column value to a literal value.
fn compare_values(col_val: &ColumnValue, op: &CompareOp, lit_val: &LiteralValue) -> bool {
    match (col_val, lit_val) {
        // NULL comparisons: any comparison involving NULL yields UNKNOWN (treated as false).
        // Use IS NULL / IS NOT NULL to test for nulls.
        (ColumnValue::Null, _) | (_, LiteralValue::Null) => false,

        (ColumnValue::Integer(a), LiteralValue::Int(b)) => compare_ord(*a, *b, op),
        (ColumnValue::Integer(a), LiteralValue::Float(b)) => compare_ord(*a as f64, *b, op),
        (ColumnValue::Float(a), LiteralValue::Float(b)) => compare_ord(*a, *b, op),
        (ColumnValue::Float(a), LiteralValue::Int(b)) => compare_ord(*a, *b as f64, op),

        (ColumnValue::String(a), LiteralValue::String(b)) => compare_ord(a.as_str(), b.as_str(), op),

        // Temporal columns compare against ISO string literals
        (ColumnValue::Date(a), LiteralValue::String(b)) => match temporal::parse_date(b) {
            Some(b) => compare_ord(*a, b, op),
            None => false,
        },
        (ColumnValue::DateTime(a), LiteralValue::String(b)) => match temporal::parse_datetime(b) {
            Some(b) => compare_ord(*a, b, op),
            None => false,
        },

        (ColumnValue::Boolean(a), LiteralValue::Bool(b)) => {
            match op {
                CompareOp::Eq => a == b,
                CompareOp::Ne => a != b,
                _ => false, // < > <= >= don't make sense for bools
            }
        }

        // Type mismatches return false
        _ => false,
    }
}

/// Compare two ordered values.
fn compare_ord<T: PartialOrd>(a: T, b: T, op: &CompareOp) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

// ============================================================================
// Fast evaluation (zero-allocation) using direct column access
// ============================================================================

/// Evaluate an expression using a column lookup function.
/// This avoids allocating a HashMap per row - the lookup function
/// directly accesses column data.
pub fn eval_expr_fast<F>(expr: &Expr, get_column: &F) -> bool
where
    F: Fn(&str) -> Option<ColumnValue>,
{
    match expr {
        Expr::Compare { column, op, value } => {
            match get_column(column) {
                None => false,
                Some(col_val) => compare_values(&col_val, op, value),
            }
        }
        Expr::IsNull { column } => {
            matches!(get_column(column), Some(ColumnValue::Null) | None)
        }
        Expr::IsNotNull { column } => {
            match get_column(column) {
                Some(ColumnValue::Null) | None => false,
                Some(_) => true,
            }
        }
        Expr::In { column, values, negated } => {
            match get_column(column) {
                None | Some(ColumnValue::Null) => false,
                Some(col_val) => {
                    let found = values
                        .iter()
                        .any(|lit| compare_values(&col_val, &CompareOp::Eq, lit));
                    found != *negated
                }
            }
        }
        Expr::And(left, right) => {
            eval_expr_fast(left, get_column) && eval_expr_fast(right, get_column)
        }
        Expr::Or(left, right) => {
            eval_expr_fast(left, get_column) || eval_expr_fast(right, get_column)
        }
        Expr::Not(inner) => {
            !eval_expr_fast(inner, get_column)
        }
    }
}

/// Extract all column names referenced in an expression.
pub fn extract_columns(expr: &Expr) -> Vec<String> {
    let mut columns = Vec::new();
    extract_columns_recursive(expr, &mut columns);
    columns.sort();
    columns.dedup();
    columns
}

fn extract_columns_recursive(expr: &Expr, columns: &mut Vec<String>) {
    match expr {
        Expr::Compare { column, .. } => columns.push(column.clone()),
        Expr::IsNull { column } => columns.push(column.clone()),
        Expr::IsNotNull { column } => columns.push(column.clone()),
        Expr::In { column, .. } => columns.push(column.clone()),
        Expr::And(left, right) | Expr::Or(left, right) => {
            extract_columns_recursive(left, columns);
            extract_columns_recursive(right, columns);
        }
        Expr::Not(inner) => extract_columns_recursive(inner, columns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row() -> HashMap<String, ColumnValue> {
        let mut row = HashMap::new();
        row.insert("id".to_string(), ColumnValue::Integer(1));
        row.insert("line".to_string(), ColumnValue::String("A".to_string()));
        row.insert("delay".to_string(), ColumnValue::Float(95.5));
        row.insert("active".to_string(), ColumnValue::Boolean(true));
        row.insert("day".to_string(), ColumnValue::Date(temporal::parse_date("2024-03-10").unwrap()));
        row.insert("nullable".to_string(), ColumnValue::Null);
        row
    }

    #[test]
    fn test_simple_comparison() {
        let row = make_row();

        let expr = parse_expr("delay > 90").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("delay < 90").unwrap();
        assert!(!eval_expr(&expr, &row));

        let expr = parse_expr("id == 1").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("line == 'A'").unwrap();
        assert!(eval_expr(&expr, &row));
    }

    #[test]
    fn test_and_or() {
        let row = make_row();

        let expr = parse_expr("delay > 90 AND id == 1").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("delay > 90 AND id == 2").unwrap();
        assert!(!eval_expr(&expr, &row));

        let expr = parse_expr("delay < 90 OR id == 1").unwrap();
        assert!(eval_expr(&expr, &row));
    }

    #[test]
    fn test_not() {
        let row = make_row();

        let expr = parse_expr("NOT delay < 90").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("NOT delay > 90").unwrap();
        assert!(!eval_expr(&expr, &row));
    }

    #[test]
    fn test_is_null() {
        let row = make_row();

        let expr = parse_expr("nullable IS NULL").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("delay IS NULL").unwrap();
        assert!(!eval_expr(&expr, &row));

        let expr = parse_expr("delay IS NOT NULL").unwrap();
        assert!(eval_expr(&expr, &row));
    }

    #[test]
    fn test_parentheses() {
        let row = make_row();

        let expr = parse_expr("(delay > 90) AND (id == 1)").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("(delay < 90 OR id == 1) AND active == true").unwrap();
        assert!(eval_expr(&expr, &row));
    }

    #[test]
    fn test_in_list() {
        let row = make_row();

        let expr = parse_expr("line IN ('A', 'C', 'E')").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("line NOT IN ('A', 'C')").unwrap();
        assert!(!eval_expr(&expr, &row));

        let expr = parse_expr("nullable IN (1, 2)").unwrap();
        assert!(!eval_expr(&expr, &row));

        assert!(parse_expr("line IN ()").is_err());
    }

    #[test]
    fn test_date_literal() {
        let row = make_row();

        let expr = parse_expr("day >= '2024-03-01'").unwrap();
        assert!(eval_expr(&expr, &row));

        let expr = parse_expr("day < '2024-03-01'").unwrap();
        assert!(!eval_expr(&expr, &row));
    }

    #[test]
    fn test_computed_arithmetic() {
        let row = make_row();
        let get = |c: &str| row.get(c).cloned();

        let computed = parse_computed("delay * 2 - id").unwrap();
        assert!(matches!(computed, Computed::Arith(_)));
        assert_eq!(computed.eval(&get), ColumnValue::Float(190.0));
        assert_eq!(computed.columns(), vec!["delay".to_string(), "id".to_string()]);

        let computed = parse_computed("(id + 4) * -3").unwrap();
        assert_eq!(computed.eval(&get), ColumnValue::Integer(-15));

        assert_eq!(parse_computed("id / 0").unwrap().eval(&get), ColumnValue::Null);
        assert_eq!(parse_computed("nullable + 1").unwrap().eval(&get), ColumnValue::Null);
        assert_eq!(parse_computed("id-1").unwrap().eval(&get), ColumnValue::Integer(0));
    }

    #[test]
    fn test_computed_predicate_and_types() {
        let row = make_row();
        let get = |c: &str| row.get(c).cloned();
        let types = |c: &str| match c {
            "id" => Some(ColumnType::Integer),
            "delay" => Some(ColumnType::Float),
            "line" => Some(ColumnType::String),
            _ => None,
        };

        let late = parse_computed("delay > 90 AND line == 'A'").unwrap();
        assert!(matches!(late, Computed::Predicate(_)));
        assert_eq!(late.eval(&get), ColumnValue::Boolean(true));
        assert_eq!(late.output_type(&types), Ok(ColumnType::Boolean));

        assert_eq!(parse_computed("id * 3").unwrap().output_type(&types), Ok(ColumnType::Integer));
        assert_eq!(parse_computed("id / 3").unwrap().output_type(&types), Ok(ColumnType::Float));
        assert_eq!(parse_computed("id + delay").unwrap().output_type(&types), Ok(ColumnType::Float));
        assert!(parse_computed("line + 1").unwrap().output_type(&types).is_err());
        assert!(parse_computed("delay >").is_err());
    }

    #[test]
    fn test_negative_literals_still_parse_in_filters() {
        let row = make_row();
        assert!(eval_expr(&parse_expr("id > -5").unwrap(), &row));
        assert!(eval_expr(&parse_expr("id IN (-1, 1)").unwrap(), &row));
    }

    #[test]
    fn test_extract_columns() {
        let expr = parse_expr("delay > 1 AND (line IN ('A') OR delay IS NULL)").unwrap();
        assert_eq!(extract_columns(&expr), vec!["delay".to_string(), "line".to_string()]);
    }
}
