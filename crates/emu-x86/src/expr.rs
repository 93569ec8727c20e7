//! Debugger expression evaluation.
//!
//! Lexing runs an ordered regex table against the input; the longer
//! operators (`==`, `&&`, ...) sit before their single-character prefixes
//! so no longest-match machinery is needed. Parsing is recursive descent
//! over a token range: strip a spanning parenthesis pair, otherwise split
//! at the dominant operator (lowest precedence at depth 0, rightmost on
//! ties, which keeps the binaries left-associative).
//!
//! All arithmetic is wrapping `u32`; comparisons and logical operators
//! produce 0 or 1.

use std::sync::LazyLock;

use intel_386::Cpu386;
use intel_386::registers::{REGS8, REGS16, REGS32};
use regex::Regex;
use thiserror::Error;

/// Hard cap on tokens per evaluation.
const MAX_TOKENS: usize = 32;

/// Evaluation failures. These are user errors, reported and forgotten;
/// the monitor keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("no token matches at position {0}")]
    Lex(usize),
    #[error("expression has more than {MAX_TOKENS} tokens")]
    TooManyTokens,
    #[error("empty expression")]
    Empty,
    #[error("unbalanced parentheses")]
    Parens,
    #[error("malformed expression")]
    Malformed,
    #[error("bad numeric literal '{0}'")]
    BadNumber(String),
    #[error("unknown register ${0}")]
    UnknownRegister(String),
    #[error("division by zero")]
    DivideByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Number,
    Register,
    Plus,
    Minus,
    Neg,
    Star,
    Slash,
    LParen,
    RParen,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
}

/// The lexer rule table, compiled once. Order matters: multi-character
/// operators come before their prefixes.
static RULES: LazyLock<Vec<(Regex, Option<TokenKind>)>> = LazyLock::new(|| {
    let table: &[(&str, Option<TokenKind>)] = &[
        (r"^ +", None), // spaces are dropped
        (r"^&&", Some(TokenKind::And)),
        (r"^\|\|", Some(TokenKind::Or)),
        (r"^==", Some(TokenKind::Eq)),
        (r"^!=", Some(TokenKind::Ne)),
        (r"^!", Some(TokenKind::Not)),
        (r"^\+", Some(TokenKind::Plus)),
        (r"^-", Some(TokenKind::Minus)),
        (r"^\*", Some(TokenKind::Star)),
        (r"^/", Some(TokenKind::Slash)),
        (r"^\(", Some(TokenKind::LParen)),
        (r"^\)", Some(TokenKind::RParen)),
        (r"^\$[a-zA-Z][a-zA-Z0-9]*", Some(TokenKind::Register)),
        (r"^0[xX][0-9a-fA-F]+", Some(TokenKind::Number)),
        (r"^[0-9]+", Some(TokenKind::Number)),
    ];
    table
        .iter()
        .map(|&(pattern, kind)| (Regex::new(pattern).expect("lexer rule"), kind))
        .collect()
});

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0;

    'outer: while pos < input.len() {
        for (re, kind) in RULES.iter() {
            let Some(m) = re.find(&input[pos..]) else {
                continue;
            };
            log::trace!("token {:?} at {pos}: {:?}", kind, m.as_str());
            if let Some(kind) = *kind {
                // A '-' is unary unless it follows a value-producing token.
                let kind = if kind == TokenKind::Minus
                    && !matches!(
                        tokens.last().map(|t| t.kind),
                        Some(TokenKind::Number | TokenKind::Register | TokenKind::RParen)
                    ) {
                    TokenKind::Neg
                } else {
                    kind
                };
                if tokens.len() == MAX_TOKENS {
                    return Err(EvalError::TooManyTokens);
                }
                tokens.push(Token {
                    kind,
                    text: m.as_str().to_string(),
                });
            }
            pos += m.end();
            continue 'outer;
        }
        return Err(EvalError::Lex(pos));
    }

    Ok(tokens)
}

/// Operator precedence; lower binds looser. The dominant operator of a
/// range is the loosest one at depth 0.
fn precedence(kind: TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Or => Some(0),
        TokenKind::And => Some(1),
        TokenKind::Eq | TokenKind::Ne => Some(2),
        TokenKind::Plus | TokenKind::Minus => Some(3),
        TokenKind::Star | TokenKind::Slash => Some(4),
        TokenKind::Neg | TokenKind::Not => Some(5),
        _ => None,
    }
}

/// Evaluate `input` against the CPU's current state.
pub fn eval(input: &str, cpu: &Cpu386) -> Result<u32, EvalError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }

    // One balance check up front; the recursion can then treat depth
    // bookkeeping as infallible.
    let mut depth = 0i32;
    for t in &tokens {
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(EvalError::Parens);
        }
    }
    if depth != 0 {
        return Err(EvalError::Parens);
    }

    eval_range(&tokens, 0, tokens.len() - 1, cpu)
}

fn eval_range(tokens: &[Token], l: usize, r: usize, cpu: &Cpu386) -> Result<u32, EvalError> {
    if l > r {
        return Err(EvalError::Malformed);
    }

    if l == r {
        let t = &tokens[l];
        return match t.kind {
            TokenKind::Number => parse_number(&t.text),
            TokenKind::Register => register_value(&t.text[1..], cpu),
            _ => Err(EvalError::Malformed),
        };
    }

    if spanned_by_parens(tokens, l, r) {
        return eval_range(tokens, l + 1, r - 1, cpu);
    }

    let op = dominant_operator(tokens, l, r).ok_or(EvalError::Malformed)?;
    match tokens[op].kind {
        TokenKind::Neg => Ok(eval_range(tokens, op + 1, r, cpu)?.wrapping_neg()),
        TokenKind::Not => Ok(u32::from(eval_range(tokens, op + 1, r, cpu)? == 0)),
        kind => {
            if op == l {
                // A binary operator with nothing on its left.
                return Err(EvalError::Malformed);
            }
            let lhs = eval_range(tokens, l, op - 1, cpu)?;
            let rhs = eval_range(tokens, op + 1, r, cpu)?;
            match kind {
                TokenKind::Plus => Ok(lhs.wrapping_add(rhs)),
                TokenKind::Minus => Ok(lhs.wrapping_sub(rhs)),
                TokenKind::Star => Ok(lhs.wrapping_mul(rhs)),
                TokenKind::Slash => {
                    if rhs == 0 {
                        Err(EvalError::DivideByZero)
                    } else {
                        Ok(lhs / rhs)
                    }
                }
                TokenKind::Eq => Ok(u32::from(lhs == rhs)),
                TokenKind::Ne => Ok(u32::from(lhs != rhs)),
                TokenKind::And => Ok(u32::from(lhs != 0 && rhs != 0)),
                TokenKind::Or => Ok(u32::from(lhs != 0 || rhs != 0)),
                _ => Err(EvalError::Malformed),
            }
        }
    }
}

/// True when one parenthesis pair wraps the whole range.
fn spanned_by_parens(tokens: &[Token], l: usize, r: usize) -> bool {
    if tokens[l].kind != TokenKind::LParen || tokens[r].kind != TokenKind::RParen {
        return false;
    }
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate().take(r + 1).skip(l) {
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            // The opener closed; spanning only if that happens at the end.
            return i == r;
        }
    }
    false
}

/// The operator to split at: lowest precedence at depth 0, rightmost on a
/// tie.
fn dominant_operator(tokens: &[Token], l: usize, r: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut best: Option<(u8, usize)> = None;
    for (i, t) in tokens.iter().enumerate().take(r + 1).skip(l) {
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ => {}
        }
        if depth != 0 {
            continue;
        }
        if let Some(pri) = precedence(t.kind) {
            if best.is_none_or(|(bp, _)| pri <= bp) {
                best = Some((pri, i));
            }
        }
    }
    best.map(|(_, i)| i)
}

fn parse_number(text: &str) -> Result<u32, EvalError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| EvalError::BadNumber(text.to_string()))
}

/// Register lookup by name, without the `$`, across the three width
/// tables plus `eip`.
fn register_value(name: &str, cpu: &Cpu386) -> Result<u32, EvalError> {
    if name == "eip" {
        return Ok(cpu.regs.eip);
    }
    for (i, n) in REGS32.iter().enumerate() {
        if *n == name {
            return Ok(cpu.regs.reg32(i as u8));
        }
    }
    for (i, n) in REGS16.iter().enumerate() {
        if *n == name {
            return Ok(u32::from(cpu.regs.reg16(i as u8)));
        }
    }
    for (i, n) in REGS8.iter().enumerate() {
        if *n == name {
            return Ok(u32::from(cpu.regs.reg8(i as u8)));
        }
    }
    Err(EvalError::UnknownRegister(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intel_386::registers::{EAX, EBX};

    fn cpu() -> Cpu386 {
        Cpu386::new()
    }

    #[test]
    fn binary_operators_are_left_associative() {
        assert_eq!(eval("1-2-3", &cpu()), Ok(0xFFFF_FFFC));
        assert_eq!(eval("16/4/2", &cpu()), Ok(2));
    }

    #[test]
    fn precedence_orders_the_operators() {
        assert_eq!(eval("1+2*3", &cpu()), Ok(7));
        assert_eq!(eval("1||0 && 0", &cpu()), Ok(1), "|| binds loosest");
        assert_eq!(eval("1+2 == 3", &cpu()), Ok(1));
        assert_eq!(eval("2*(3+4)", &cpu()), Ok(14));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-1", &cpu()), Ok(0xFFFF_FFFF));
        assert_eq!(eval("!0", &cpu()), Ok(1));
        assert_eq!(eval("!5", &cpu()), Ok(0));
        assert_eq!(eval("2--3", &cpu()), Ok(5), "second minus is unary");
        assert_eq!(eval("-(1+2)", &cpu()), Ok(0xFFFF_FFFD));
    }

    #[test]
    fn hex_and_decimal_literals() {
        assert_eq!(eval("0x10 + 0x20", &cpu()), Ok(48));
        assert_eq!(eval("0Xff", &cpu()), Ok(255));
        assert_eq!(eval("4294967295", &cpu()), Ok(0xFFFF_FFFF));
        assert!(matches!(
            eval("99999999999", &cpu()),
            Err(EvalError::BadNumber(_))
        ));
    }

    #[test]
    fn register_views() {
        let mut cpu = cpu();
        cpu.regs.set_reg32(EAX, 5);
        cpu.regs.set_reg32(EBX, 0xAABB_CCDD);
        cpu.regs.eip = 0x100;
        assert_eq!(eval("$eax + 3", &cpu), Ok(8));
        assert_eq!(eval("$bx", &cpu), Ok(0xCCDD));
        assert_eq!(eval("$bh", &cpu), Ok(0xCC));
        assert_eq!(eval("$bl", &cpu), Ok(0xDD));
        assert_eq!(eval("$eip", &cpu), Ok(0x100));
        assert!(matches!(
            eval("$foo", &cpu),
            Err(EvalError::UnknownRegister(_))
        ));
    }

    #[test]
    fn comparison_and_logic_produce_zero_or_one() {
        assert_eq!(eval("3 == 3", &cpu()), Ok(1));
        assert_eq!(eval("3 != 3", &cpu()), Ok(0));
        assert_eq!(eval("7 && 9", &cpu()), Ok(1));
        assert_eq!(eval("0 || 0", &cpu()), Ok(0));
    }

    #[test]
    fn failure_modes() {
        assert_eq!(eval("", &cpu()), Err(EvalError::Empty));
        assert_eq!(eval("   ", &cpu()), Err(EvalError::Empty));
        assert_eq!(eval("(1+2", &cpu()), Err(EvalError::Parens));
        assert_eq!(eval("1+2)", &cpu()), Err(EvalError::Parens));
        assert_eq!(eval("1/0", &cpu()), Err(EvalError::DivideByZero));
        assert_eq!(eval("1 @ 2", &cpu()), Err(EvalError::Lex(2)));
        assert_eq!(eval("1 2", &cpu()), Err(EvalError::Malformed));
        assert_eq!(eval("+", &cpu()), Err(EvalError::Malformed));
        assert_eq!(eval("+1", &cpu()), Err(EvalError::Malformed));
        assert_eq!(eval("1-", &cpu()), Err(EvalError::Malformed));
    }

    #[test]
    fn token_limit_is_enforced() {
        let expr = "1".to_string() + &"+1".repeat(20); // 41 tokens
        assert_eq!(eval(&expr, &cpu()), Err(EvalError::TooManyTokens));
        let expr = "1".to_string() + &"+1".repeat(15); // 31 tokens
        assert_eq!(eval(&expr, &cpu()), Ok(16));
    }
}
