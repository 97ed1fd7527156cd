//! Arithmetic evaluation of spoken expressions.
//!
//! Operator words are turned into symbols, everything else is stripped, and the
//! remaining tokens go through shunting-yard into postfix form before being
//! evaluated on a value stack.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const DEFAULT_MAX_LENGTH: usize = 200;
pub const DEFAULT_MAX_DEPTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("no expression found")]
    Empty,
    #[error("expression is too long")]
    TooLong,
    #[error("no tokens in expression")]
    NoTokens,
    #[error("parentheses nested too deeply")]
    TooDeep,
    #[error("unbalanced parentheses")]
    Unbalanced,
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("malformed expression")]
    Malformed,
    #[error("division by zero")]
    DivisionByZero,
}

static OPERATOR_WORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bумножить\s+на\b", " * "),
        (r"\bумножить\b", " * "),
        (r"\b(?:разделить|поделить|делить)\s+на\b", " / "),
        (r"\bплюс\b", " + "),
        (r"\bминус\b", " - "),
        (r"\bmultiplied\s+by\b", " * "),
        (r"\bmultiply\s+by\b", " * "),
        (r"\b(?:multiply|times)\b", " * "),
        (r"\b(?:divided|divide)\s+by\b", " / "),
        (r"\bover\b", " / "),
        (r"\bplus\b", " + "),
        (r"\bminus\b", " - "),
    ]
    .into_iter()
    .map(|(pattern, symbol)| (Regex::new(pattern).expect("operator word regex"), symbol))
    .collect()
});

static STANDALONE_X: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[xх]\b").expect("standalone x regex"));

static DIGIT_X_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\s*[xх]\s*(\d)").expect("digit x regex"));

static STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9+\-*/().,]+").expect("strip regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(Operator),
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, MathError> {
        match self {
            Self::Add => Ok(a + b),
            Self::Sub => Ok(a - b),
            Self::Mul => Ok(a * b),
            Self::Div if b == 0.0 => Err(MathError::DivisionByZero),
            Self::Div => Ok(a / b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MathEvaluator {
    pub max_length: usize,
    pub max_depth: usize,
}

impl Default for MathEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH, DEFAULT_MAX_DEPTH)
    }
}

impl MathEvaluator {
    pub fn new(max_length: usize, max_depth: usize) -> Self {
        Self {
            max_length,
            max_depth,
        }
    }

    /// Reduce free text to the bare arithmetic expression it contains
    pub fn extract_expression(&self, text: &str) -> String {
        let mut cleaned = text.to_lowercase().replace('ё', "е");
        for (re, symbol) in OPERATOR_WORDS.iter() {
            cleaned = re.replace_all(&cleaned, *symbol).into_owned();
        }
        cleaned = STANDALONE_X.replace_all(&cleaned, " * ").into_owned();
        // overlapping matches like "2x3x4" need several passes
        while DIGIT_X_DIGIT.is_match(&cleaned) {
            cleaned = DIGIT_X_DIGIT.replace_all(&cleaned, "$1 * $2").into_owned();
        }
        let cleaned = STRIP.replace_all(&cleaned, " ");
        // lone sentence punctuation left over from stripped words
        cleaned
            .split_whitespace()
            .filter(|piece| !piece.chars().all(|c| c == ',' || c == '.'))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn evaluate(&self, text: &str) -> Result<f64, MathError> {
        let expr = self.extract_expression(text);
        if expr.is_empty() {
            return Err(MathError::Empty);
        }
        if expr.chars().count() > self.max_length {
            return Err(MathError::TooLong);
        }

        let tokens = tokenize(&expr)?;
        if tokens.is_empty() {
            return Err(MathError::NoTokens);
        }
        if max_depth(&tokens)? > self.max_depth {
            return Err(MathError::TooDeep);
        }

        let postfix = to_postfix(&rewrite_unary(&tokens))?;
        eval_postfix(&postfix)
    }
}

/// Render a result: integers without decimals, otherwise up to 6 places.
/// Non-finite values render as an empty string.
pub fn format_value(value: f64) -> String {
    if !value.is_finite() {
        return String::new();
    }
    let rounded = value.round();
    if (value - rounded).abs() < 1e-9 {
        // adding 0.0 turns -0.0 into 0.0
        return format!("{:.0}", rounded + 0.0);
    }
    let fixed = format!("{value:.6}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn tokenize(expr: &str) -> Result<Vec<Token>, MathError> {
    let mut tokens = Vec::new();
    let mut number = String::new();

    for c in expr.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
            continue;
        }
        flush_number(&mut number, &mut tokens)?;
        match c {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            c if c.is_whitespace() => {}
            c => match Operator::from_char(c) {
                Some(op) => tokens.push(Token::Op(op)),
                None => return Err(MathError::InvalidCharacter(c)),
            },
        }
    }
    flush_number(&mut number, &mut tokens)?;
    Ok(tokens)
}

fn flush_number(number: &mut String, tokens: &mut Vec<Token>) -> Result<(), MathError> {
    if number.is_empty() {
        return Ok(());
    }
    let valid = match number.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty() && !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => true,
    };
    if !valid {
        return Err(MathError::Malformed);
    }
    let value = number.parse().map_err(|_| MathError::Malformed)?;
    tokens.push(Token::Number(value));
    number.clear();
    Ok(())
}

fn max_depth(tokens: &[Token]) -> Result<usize, MathError> {
    let mut depth = 0usize;
    let mut deepest = 0;
    for token in tokens {
        match token {
            Token::Open => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            Token::Close => {
                depth = depth.checked_sub(1).ok_or(MathError::Unbalanced)?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(MathError::Unbalanced);
    }
    Ok(deepest)
}

/// Rewrite each unary minus as `(0 - operand)`.
///
/// The operand is a number, a parenthesized group, or another unary minus.
/// When none follows, a bare `0 -` is emitted and evaluation reports it.
fn rewrite_unary(tokens: &[Token]) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        i = rewrite_one(tokens, i, &mut out);
    }
    out
}

/// Emit the token at `i` (rewriting unary minus), return the next index
fn rewrite_one(tokens: &[Token], i: usize, out: &mut Vec<Token>) -> usize {
    let is_unary = tokens[i] == Token::Op(Operator::Sub)
        && matches!(i.checked_sub(1).map(|p| tokens[p]), None | Some(Token::Op(_)) | Some(Token::Open));
    if !is_unary {
        out.push(tokens[i]);
        return i + 1;
    }

    let Some(operand_end) = operand_end(tokens, i + 1) else {
        out.push(Token::Number(0.0));
        out.push(Token::Op(Operator::Sub));
        return i + 1;
    };

    out.push(Token::Open);
    out.push(Token::Number(0.0));
    out.push(Token::Op(Operator::Sub));
    let mut j = i + 1;
    while j < operand_end {
        j = rewrite_one(tokens, j, out);
    }
    out.push(Token::Close);
    operand_end
}

/// Exclusive end index of the operand starting at `start`
fn operand_end(tokens: &[Token], start: usize) -> Option<usize> {
    match tokens.get(start)? {
        Token::Number(_) => Some(start + 1),
        Token::Op(Operator::Sub) => operand_end(tokens, start + 1),
        Token::Open => {
            let mut depth = 0usize;
            for (offset, token) in tokens[start..].iter().enumerate() {
                match token {
                    Token::Open => depth += 1,
                    Token::Close => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(start + offset + 1);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

fn to_postfix(tokens: &[Token]) -> Result<Vec<Token>, MathError> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for &token in tokens {
        match token {
            Token::Number(_) => output.push(token),
            Token::Op(op) => {
                while let Some(&Token::Op(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Token::Op(top));
                    stack.pop();
                }
                stack.push(token);
            }
            Token::Open => stack.push(token),
            Token::Close => loop {
                match stack.pop() {
                    Some(Token::Open) => break,
                    Some(t) => output.push(t),
                    None => return Err(MathError::Unbalanced),
                }
            },
        }
    }

    while let Some(token) = stack.pop() {
        if matches!(token, Token::Open | Token::Close) {
            return Err(MathError::Unbalanced);
        }
        output.push(token);
    }
    Ok(output)
}

fn eval_postfix(tokens: &[Token]) -> Result<f64, MathError> {
    let mut stack: Vec<f64> = Vec::new();
    for token in tokens {
        match *token {
            Token::Number(value) => stack.push(value),
            Token::Op(op) => {
                let b = stack.pop().ok_or(MathError::Malformed)?;
                let a = stack.pop().ok_or(MathError::Malformed)?;
                stack.push(op.apply(a, b)?);
            }
            Token::Open | Token::Close => return Err(MathError::Malformed),
        }
    }
    match stack.as_slice() {
        [value] => Ok(*value),
        _ => Err(MathError::Malformed),
    }
}
