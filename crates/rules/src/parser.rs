//! Rule expression parser and evaluator.
//!
//! Supports a small DSL for gating modules on the decision snapshot:
//!
//! ```text
//! intensity >= 7
//! level >= 2 && !practical_request
//! (intensity <= 2 || intensity >= 8) && level >= 2
//! vulnerable AND NOT greeting
//! ```
//!
//! Grammar (informal):
//! ```text
//! expr     = and_expr (("||" | "OR") and_expr)*
//! and_expr = unary (("&&" | "AND") unary)*
//! unary    = ("!" | "NOT") unary | primary
//! primary  = "(" expr ")" | atom
//! atom     = var [OP literal]
//! var      = "level" | "intensity" | "has_tech_block" | "save_memory"
//!          | "vulnerable" | FLAG_NAME
//! OP       = "==" | "!=" | ">" | "<" | ">=" | "<="
//! literal  = NUMBER | "true" | "false"
//! ```
//!
//! Expressions are parsed once when configuration loads; evaluation is a
//! plain tree walk over a typed [`RuleContext`] and cannot fail.

use promptweave_core::{DecSnapshot, RuleError};
use std::collections::BTreeMap;

/// A parsed rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A single comparison or truthiness test.
    Atom(Atom),
    /// Logical AND of two sub-conditions.
    And(Box<Condition>, Box<Condition>),
    /// Logical OR of two sub-conditions.
    Or(Box<Condition>, Box<Condition>),
    /// Negation.
    Not(Box<Condition>),
    /// Always true (empty rule).
    Always,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub var: Variable,
    /// `None` tests the variable for truthiness.
    pub cmp: Option<(Op, f64)>,
}

/// A variable the rule can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    /// Openness level (1–3).
    Level,
    /// Intensity (0–10).
    Intensity,
    HasTechBlock,
    SaveMemory,
    Vulnerable,
    /// Any other identifier is a snapshot flag (missing = false).
    Flag(String),
}

impl Variable {
    fn from_ident(name: &str) -> Self {
        match name {
            "level" | "openness" => Variable::Level,
            "intensity" => Variable::Intensity,
            "has_tech_block" => Variable::HasTechBlock,
            "save_memory" => Variable::SaveMemory,
            "vulnerable" | "is_vulnerable" => Variable::Vulnerable,
            other => Variable::Flag(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Variable::Level => "level",
            Variable::Intensity => "intensity",
            Variable::HasTechBlock => "has_tech_block",
            Variable::SaveMemory => "save_memory",
            Variable::Vulnerable => "vulnerable",
            Variable::Flag(name) => name,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Variable::Level | Variable::Intensity)
    }

    fn value(&self, ctx: &RuleContext<'_>) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Variable::Level => f64::from(ctx.level),
            Variable::Intensity => f64::from(ctx.intensity),
            Variable::HasTechBlock => truth(ctx.has_tech_block),
            Variable::SaveMemory => truth(ctx.save_memory),
            Variable::Vulnerable => truth(ctx.vulnerable),
            Variable::Flag(name) => truth(ctx.flags.get(name.as_str()).copied().unwrap_or(false)),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Op {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Op::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Op::NotEq => (lhs - rhs).abs() >= f64::EPSILON,
            Op::Gt => lhs > rhs,
            Op::Lt => lhs < rhs,
            Op::Gte => lhs >= rhs,
            Op::Lte => lhs <= rhs,
        }
    }
}

/// Typed view of the snapshot that rules evaluate against.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub level: u8,
    pub intensity: u8,
    pub has_tech_block: bool,
    pub save_memory: bool,
    pub vulnerable: bool,
    pub flags: &'a BTreeMap<String, bool>,
}

impl<'a> RuleContext<'a> {
    pub fn from_snapshot(dec: &'a DecSnapshot) -> Self {
        Self {
            level: dec.openness.level(),
            intensity: dec.intensity,
            has_tech_block: dec.has_tech_block,
            save_memory: dec.save_memory,
            vulnerable: dec.is_vulnerable,
            flags: &dec.flags,
        }
    }
}

impl Condition {
    /// Evaluate this condition against a context.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Atom(atom) => atom.evaluate(ctx),
            Condition::And(a, b) => a.evaluate(ctx) && b.evaluate(ctx),
            Condition::Or(a, b) => a.evaluate(ctx) || b.evaluate(ctx),
            Condition::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Variables referenced anywhere in the tree, in first-seen order.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'s>(&'s self, out: &mut Vec<&'s Variable>) {
        match self {
            Condition::Always => {}
            Condition::Atom(atom) => {
                if !out.contains(&&atom.var) {
                    out.push(&atom.var);
                }
            }
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Condition::Not(inner) => inner.collect_variables(out),
        }
    }

    /// Names of referenced boolean variables that are set in `ctx`.
    ///
    /// Used in debug traces to show which signals a rule saw.
    pub fn active_signals(&self, ctx: &RuleContext<'_>) -> Vec<String> {
        self.variables()
            .into_iter()
            .filter(|v| !v.is_numeric() && v.value(ctx) > 0.0)
            .map(|v| v.name().to_string())
            .collect()
    }
}

impl Atom {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> bool {
        let value = self.var.value(ctx);
        match self.cmp {
            Some((op, rhs)) => op.apply(value, rhs),
            None => value > 0.0,
        }
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

/// Parse a rule expression into a [`Condition`] tree.
///
/// Returns `Ok(Condition::Always)` for empty input.
pub fn parse_rule(input: &str) -> Result<Condition, RuleError> {
    let expr = input.trim();
    if expr.is_empty() {
        return Ok(Condition::Always);
    }
    let fail = |reason: String| RuleError::Parse {
        expr: expr.to_string(),
        reason,
    };
    let tokens = tokenize(expr).map_err(fail)?;
    let (cond, rest) = parse_or(&tokens).map_err(fail)?;
    if !rest.is_empty() {
        return Err(fail(format!("unexpected tokens after expression: {rest:?}")));
    }
    Ok(cond)
}

/// Token types for the rule DSL.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(f64),
    Bool(bool),
    And,
    Or,
    Not,
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' => {
                chars.next();
                if chars.next() != Some('&') {
                    return Err("expected `&&`".into());
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next() != Some('|') {
                    return Err("expected `||`".into());
                }
                tokens.push(Token::Or);
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Gte);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Lte);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '=' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err("expected `==`".into());
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let mut num_str = String::new();
                num_str.push(c);
                chars.next();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_digit() || nc == '.' {
                        num_str.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match num_str.parse::<f64>() {
                    Ok(n) => tokens.push(Token::Num(n)),
                    Err(_) => return Err(format!("invalid number: {num_str}")),
                }
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&wc) = chars.peek() {
                    if wc.is_ascii_alphanumeric() || wc == '_' || wc == ':' {
                        word.push(wc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match word.as_str() {
                    "AND" | "and" => Token::And,
                    "OR" | "or" => Token::Or,
                    "NOT" | "not" => Token::Not,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_lowercase()),
                };
                tokens.push(token);
            }
            _ => return Err(format!("unexpected character: {c}")),
        }
    }

    Ok(tokens)
}

fn parse_or(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (mut left, mut rest) = parse_and(tokens)?;
    while rest.first() == Some(&Token::Or) {
        let (right, remaining) = parse_and(&rest[1..])?;
        left = Condition::Or(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_and(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (mut left, mut rest) = parse_unary(tokens)?;
    while rest.first() == Some(&Token::And) {
        let (right, remaining) = parse_unary(&rest[1..])?;
        left = Condition::And(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_unary(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    if tokens.first() == Some(&Token::Not) {
        let (inner, rest) = parse_unary(&tokens[1..])?;
        return Ok((Condition::Not(Box::new(inner)), rest));
    }
    parse_primary(tokens)
}

fn parse_primary(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    if tokens.first() == Some(&Token::LParen) {
        let (inner, rest) = parse_or(&tokens[1..])?;
        if rest.first() != Some(&Token::RParen) {
            return Err("expected closing parenthesis".into());
        }
        return Ok((inner, &rest[1..]));
    }
    parse_atom(tokens)
}

fn parse_atom(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let var = match tokens.first() {
        Some(Token::Ident(name)) => Variable::from_ident(name),
        other => return Err(format!("expected variable name, got {other:?}")),
    };
    let rest = &tokens[1..];

    let op = match rest.first() {
        Some(Token::Eq) => Op::Eq,
        Some(Token::NotEq) => Op::NotEq,
        Some(Token::Gt) => Op::Gt,
        Some(Token::Lt) => Op::Lt,
        Some(Token::Gte) => Op::Gte,
        Some(Token::Lte) => Op::Lte,
        _ => {
            if var.is_numeric() {
                return Err(format!("`{}` needs a comparison", var.name()));
            }
            return Ok((Condition::Atom(Atom { var, cmp: None }), rest));
        }
    };

    let rhs = match (rest.get(1), var.is_numeric()) {
        (Some(Token::Num(n)), true) => *n,
        (Some(Token::Bool(b)), false) => {
            if !matches!(op, Op::Eq | Op::NotEq) {
                return Err(format!("cannot order boolean `{}`", var.name()));
            }
            if *b { 1.0 } else { 0.0 }
        }
        (Some(Token::Num(_)), false) => {
            return Err(format!("boolean `{}` compared to a number", var.name()));
        }
        (other, _) => return Err(format!("expected literal, got {other:?}")),
    };

    Ok((
        Condition::Atom(Atom {
            var,
            cmp: Some((op, rhs)),
        }),
        &rest[2..],
    ))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(level: u8, intensity: u8, flags: &'a BTreeMap<String, bool>) -> RuleContext<'a> {
        RuleContext {
            level,
            intensity,
            has_tech_block: intensity >= 7,
            save_memory: intensity >= 7,
            vulnerable: false,
            flags,
        }
    }

    fn flags(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn parse_simple_comparison() {
        let cond = parse_rule("intensity >= 7").unwrap();
        let f = flags(&[]);
        assert!(cond.evaluate(&ctx(1, 8, &f)));
        assert!(!cond.evaluate(&ctx(1, 6, &f)));
    }

    #[test]
    fn parse_and_with_negated_flag() {
        let cond = parse_rule("intensity>=7 && level>=2 && !practical_request").unwrap();
        let none = flags(&[]);
        let practical = flags(&[("practical_request", true)]);
        assert!(cond.evaluate(&ctx(2, 8, &none)));
        assert!(!cond.evaluate(&ctx(2, 8, &practical)));
        assert!(!cond.evaluate(&ctx(1, 8, &none)));
    }

    #[test]
    fn parse_grouped_or() {
        let cond = parse_rule("(intensity<=2 || intensity>=8) && level>=2").unwrap();
        let f = flags(&[]);
        assert!(cond.evaluate(&ctx(2, 1, &f)));
        assert!(cond.evaluate(&ctx(3, 9, &f)));
        assert!(!cond.evaluate(&ctx(2, 5, &f)));
        assert!(!cond.evaluate(&ctx(1, 9, &f)));
    }

    #[test]
    fn keyword_operators_are_accepted() {
        let cond = parse_rule("save_memory AND NOT greeting").unwrap();
        let greeting = flags(&[("greeting", true)]);
        let none = flags(&[]);
        assert!(cond.evaluate(&ctx(1, 8, &none)));
        assert!(!cond.evaluate(&ctx(1, 8, &greeting)));
    }

    #[test]
    fn boolean_equality() {
        let cond = parse_rule("crisis == false").unwrap();
        let crisis = flags(&[("crisis", true)]);
        let none = flags(&[]);
        assert!(cond.evaluate(&ctx(1, 3, &none)));
        assert!(!cond.evaluate(&ctx(1, 3, &crisis)));
    }

    #[test]
    fn empty_rule_is_always() {
        let f = flags(&[]);
        assert_eq!(parse_rule("  ").unwrap(), Condition::Always);
        assert!(parse_rule("").unwrap().evaluate(&ctx(1, 0, &f)));
    }

    #[test]
    fn malformed_rules_are_rejected() {
        assert!(parse_rule("intensity >=").is_err());
        assert!(parse_rule("intensity").is_err());
        assert!(parse_rule("level >= 2 &&").is_err());
        assert!(parse_rule("(level >= 2").is_err());
        assert!(parse_rule("greeting > 1").is_err());
        assert!(parse_rule("level = 2").is_err());
        assert!(parse_rule("intensity >= 7; drop").is_err());
    }

    #[test]
    fn parse_error_carries_expression() {
        let err = parse_rule("level >> 2").unwrap_err();
        assert!(err.to_string().contains("level >> 2"));
    }

    #[test]
    fn active_signals_lists_set_booleans() {
        let cond = parse_rule("intensity >= 7 && (vulnerable || shame) && !greeting").unwrap();
        let f = flags(&[("shame", true), ("greeting", false)]);
        let signals = cond.active_signals(&ctx(3, 8, &f));
        assert_eq!(signals, vec!["shame".to_string()]);
    }

    #[test]
    fn bias_style_identifiers_are_flags() {
        let cond = parse_rule("bias:anchoring").unwrap();
        let f = flags(&[("bias:anchoring", true)]);
        assert!(cond.evaluate(&ctx(1, 0, &f)));
    }
}
