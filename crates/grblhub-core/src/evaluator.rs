//! Arithmetic expression evaluation for inline bracket groups.
//!
//! G-code lines may carry `[...]` groups whose contents are evaluated
//! against a variable context before transmission (`G0 X[posx - 8]`).
//! This is a small Pratt parser supporting `+ - * / ^`, unary sign,
//! parentheses, numeric literals, and identifier lookup.

use std::collections::HashMap;
use thiserror::Error;

/// Expression evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// An unexpected character was found while tokenizing
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),
    /// A token appeared where an operand or operator was expected
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    /// The expression ended prematurely
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A parenthesis was left unclosed
    #[error("unclosed '(' in expression")]
    UnclosedParen,
    /// An identifier was not present in the context
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
}

/// A parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    UnaryOp { op: char, rhs: Box<Expr> },
    BinaryOp { lhs: Box<Expr>, op: char, rhs: Box<Expr> },
}

impl Expr {
    fn eval(&self, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Variable(name) => vars
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
            Expr::UnaryOp { op, rhs } => {
                let v = rhs.eval(vars)?;
                Ok(match op {
                    '-' => -v,
                    _ => v,
                })
            }
            Expr::BinaryOp { lhs, op, rhs } => {
                let l = lhs.eval(vars)?;
                let r = rhs.eval(vars)?;
                Ok(match op {
                    '+' => l + r,
                    '-' => l - r,
                    '*' => l * r,
                    '/' => l / r,
                    '^' => l.powf(r),
                    _ => l,
                })
            }
        }
    }
}

/// Evaluate an arithmetic expression against a variable context.
pub fn evaluate(input: &str, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    let tokens = tokenize(input)?;
    let (expr, rest) = parse_bp(&tokens, 0)?;
    if let Some(tok) = rest.first() {
        return Err(EvalError::UnexpectedToken(tok.clone()));
    }
    expr.eval(vars)
}

fn tokenize(input: &str) -> Result<Vec<String>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(num);
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(ident);
        } else if "+-*/^()".contains(c) {
            tokens.push(c.to_string());
            chars.next();
        } else {
            return Err(EvalError::UnexpectedChar(c));
        }
    }
    Ok(tokens)
}

// Pratt parser with binding power
fn parse_bp(tokens: &[String], min_bp: u8) -> Result<(Expr, &[String]), EvalError> {
    let (mut lhs, mut rest) = match tokens.split_first() {
        Some((tok, rest)) => {
            if let Ok(n) = tok.parse::<f64>() {
                (Expr::Number(n), rest)
            } else if tok == "-" || tok == "+" {
                let op = tok.chars().next().unwrap_or('+');
                let (rhs, rest) = parse_bp(rest, 100)?;
                (Expr::UnaryOp { op, rhs: Box::new(rhs) }, rest)
            } else if tok == "(" {
                let (expr, rest) = parse_bp(rest, 0)?;
                match rest.split_first() {
                    Some((close, rest)) if close == ")" => (expr, rest),
                    _ => return Err(EvalError::UnclosedParen),
                }
            } else if tok
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            {
                (Expr::Variable(tok.clone()), rest)
            } else {
                return Err(EvalError::UnexpectedToken(tok.clone()));
            }
        }
        None => return Err(EvalError::UnexpectedEnd),
    };

    loop {
        let op = match rest.first() {
            Some(op) if ["+", "-", "*", "/", "^"].contains(&op.as_str()) => op,
            _ => break,
        };
        let (l_bp, r_bp) = match op.as_str() {
            "+" | "-" => (1, 2),
            "*" | "/" => (3, 4),
            "^" => (5, 4), // right-associative
            _ => break,
        };
        if l_bp < min_bp {
            break;
        }
        let op_char = op.chars().next().unwrap_or('+');
        rest = &rest[1..];
        let (rhs, new_rest) = parse_bp(rest, r_bp)?;
        lhs = Expr::BinaryOp {
            lhs: Box::new(lhs),
            op: op_char,
            rhs: Box::new(rhs),
        };
        rest = new_rest;
    }
    Ok((lhs, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_plain_arithmetic() {
        let empty = HashMap::new();
        assert_eq!(evaluate("1 + 2 * 3", &empty), Ok(7.0));
        assert_eq!(evaluate("(1 + 2) * 3", &empty), Ok(9.0));
        assert_eq!(evaluate("2 ^ 3 ^ 2", &empty), Ok(512.0));
        assert_eq!(evaluate("-4 + 1", &empty), Ok(-3.0));
    }

    #[test]
    fn test_variable_lookup() {
        let ctx = vars(&[("posx", 10.0), ("xmax", 50.0)]);
        assert_eq!(evaluate("posx - 8", &ctx), Ok(2.0));
        assert_eq!(evaluate("xmax / 2", &ctx), Ok(25.0));
    }

    #[test]
    fn test_undefined_variable() {
        let empty = HashMap::new();
        assert_eq!(
            evaluate("posz + 1", &empty),
            Err(EvalError::UndefinedVariable("posz".to_string()))
        );
    }

    #[test]
    fn test_malformed() {
        let empty = HashMap::new();
        assert!(evaluate("1 +", &empty).is_err());
        assert!(evaluate("(1 + 2", &empty).is_err());
        assert!(evaluate("1 @ 2", &empty).is_err());
    }
}
