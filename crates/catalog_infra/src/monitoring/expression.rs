//! Arithmetic over metric ids, as used by metric math expressions such as
//! `m1/m2*100`.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

/// Metric ids referenced by `expression`.
pub fn referenced_ids(expression: &str) -> Result<BTreeSet<String>, String> {
    Ok(tokenize(expression)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Ident(ident) => Some(ident),
            _ => None,
        })
        .collect())
}

/// Evaluate `expression` with every metric id replaced by its sample value.
pub fn evaluate(expression: &str, samples: &BTreeMap<String, f64>) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("expression is empty".to_string());
    }
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
        samples,
    };
    let value = parser.sum()?;
    if parser.position != tokens.len() {
        return Err("unexpected trailing input".to_string());
    }
    Ok(value)
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    samples: &'a BTreeMap<String, f64>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut value = self.product()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.position += 1;
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut value = self.operand()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.position += 1;
            let rhs = self.operand()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn operand(&mut self) -> Result<f64, String> {
        match self.next().cloned() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Ident(ident)) => self
                .samples
                .get(&ident)
                .copied()
                .ok_or_else(|| format!("no sample for metric id '{ident}'")),
            Some(Token::Op('-')) => Ok(-self.operand()?),
            Some(Token::Open) => {
                let value = self.sum()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values
            .iter()
            .map(|(id, value)| (id.to_string(), *value))
            .collect()
    }

    #[test]
    fn sum_of_two_metrics_matches_arithmetic_sum() {
        for (m1, m2) in [(0.0, 0.0), (3.0, 4.0), (12.5, 0.25), (1e6, 7.0)] {
            let value = evaluate("m1 + m2", &samples(&[("m1", m1), ("m2", m2)]))
                .expect("expression should evaluate");
            assert_eq!(value, m1 + m2);
        }
    }

    #[test]
    fn percentage_respects_left_to_right_precedence() {
        let value = evaluate("m1/m2*100", &samples(&[("m1", 5.0), ("m2", 200.0)]))
            .expect("expression should evaluate");
        assert!((value - 2.5).abs() < 1e-9);
    }

    #[test]
    fn parentheses_and_unary_minus() {
        let value = evaluate("-(m1 - 2) * 3", &samples(&[("m1", 5.0)])).expect("evaluate");
        assert_eq!(value, -9.0);
    }

    #[test]
    fn missing_sample_is_an_error() {
        let error = evaluate("m1 + m3", &samples(&[("m1", 1.0)])).expect_err("should fail");
        assert!(error.contains("m3"));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(evaluate("m1 +", &samples(&[("m1", 1.0)])).is_err());
        assert!(evaluate("(m1", &samples(&[("m1", 1.0)])).is_err());
        assert!(evaluate("m1 $ 2", &samples(&[("m1", 1.0)])).is_err());
        assert!(evaluate("", &BTreeMap::new()).is_err());
    }

    #[test]
    fn lists_referenced_ids() {
        let ids = referenced_ids("m1/m2*100").expect("tokenize");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["m1", "m2"]);
    }
}
