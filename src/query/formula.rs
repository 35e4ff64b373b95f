//! Weighting formula: combines the results of the weighting functions of a
//! query into the final rank weight.
//!
//! A formula is an arithmetic expression over number literals, function
//! results `_0`, `_1`, ... (in order of registration of the weighting
//! functions) and named variables. It is compiled once into a program for a
//! small stack machine that runs per ranked document.
//!
//! ```text
//! (_0 / _1) + ((1000 - _2) / 1000000)
//! _0 * boost + 0.5
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{QuarryError, Result};

/// Stack machine instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    Push(f64),
    /// Result of the weighting function with this index.
    Arg(usize),
    /// Variable with this index in the variable table.
    Var(usize),
    Add,
    Sub,
    Mul,
    Div,
    Neg,
}

/// A compiled weighting formula.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightingFormula {
    source: String,
    program: Vec<OpCode>,
    variables: Vec<String>,
    defaults: Vec<f64>,
}

impl WeightingFormula {
    /// Compile `source`. Every variable used must have a default value in
    /// `defaults`.
    pub fn compile(source: &str, defaults: &BTreeMap<String, f64>) -> Result<Self> {
        let variables: Vec<String> = defaults.keys().cloned().collect();
        let mut parser = FormulaParser {
            chars: source.chars().peekable(),
            variables: &variables,
            program: Vec::new(),
        };
        parser.skip_whitespace();
        if parser.chars.peek().is_none() {
            return Err(QuarryError::config("empty weighting formula"));
        }
        parser.parse_sum()?;
        parser.skip_whitespace();
        if let Some(c) = parser.chars.peek() {
            return Err(QuarryError::config(format!(
                "unexpected '{c}' in weighting formula '{source}'"
            )));
        }
        let program = parser.program;
        Ok(WeightingFormula {
            source: source.to_string(),
            program,
            defaults: variables.iter().map(|v| defaults[v]).collect(),
            variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn program(&self) -> &[OpCode] {
        &self.program
    }

    /// One past the highest argument index referenced, 0 if none.
    pub fn arity(&self) -> usize {
        self.program
            .iter()
            .filter_map(|op| match op {
                OpCode::Arg(idx) => Some(idx + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Variable values with the given overrides applied. Overriding a
    /// variable the formula does not know is a configuration error.
    pub fn bind(&self, overrides: &BTreeMap<String, f64>) -> Result<Vec<f64>> {
        let mut values = self.defaults.clone();
        for (name, value) in overrides {
            let idx = self
                .variables
                .iter()
                .position(|v| v == name)
                .ok_or_else(|| QuarryError::config(format!("unknown weighting formula variable '{name}'")))?;
            values[idx] = *value;
        }
        Ok(values)
    }

    /// Run the program.
    pub fn evaluate(&self, args: &[f64], variables: &[f64]) -> Result<f64> {
        let mut stack: Vec<f64> = Vec::with_capacity(8);
        for op in &self.program {
            let value = match *op {
                OpCode::Push(v) => v,
                OpCode::Arg(idx) => *args.get(idx).ok_or_else(|| {
                    QuarryError::evaluation(format!("weighting formula argument _{idx} is not defined"))
                })?,
                OpCode::Var(idx) => *variables.get(idx).ok_or_else(|| {
                    QuarryError::evaluation(format!("weighting formula variable {idx} is not bound"))
                })?,
                OpCode::Neg => -pop(&mut stack)?,
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    match *op {
                        OpCode::Add => left + right,
                        OpCode::Sub => left - right,
                        OpCode::Mul => left * right,
                        _ => {
                            if right == 0.0 {
                                return Err(QuarryError::evaluation(format!(
                                    "division by zero in weighting formula '{}'",
                                    self.source
                                )));
                            }
                            left / right
                        }
                    }
                }
            };
            stack.push(value);
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            _ => Err(QuarryError::evaluation("corrupt weighting formula program")),
        }
    }
}

fn pop(stack: &mut Vec<f64>) -> Result<f64> {
    stack
        .pop()
        .ok_or_else(|| QuarryError::evaluation("weighting formula stack underflow"))
}

impl fmt::Display for WeightingFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Recursive descent compiler emitting postfix code.
struct FormulaParser<'a> {
    chars: Peekable<Chars<'a>>,
    variables: &'a [String],
    program: Vec<OpCode>,
}

impl FormulaParser<'_> {
    fn parse_sum(&mut self) -> Result<()> {
        self.parse_product()?;
        loop {
            self.skip_whitespace();
            let op = match self.chars.peek() {
                Some('+') => OpCode::Add,
                Some('-') => OpCode::Sub,
                _ => return Ok(()),
            };
            self.chars.next();
            self.parse_product()?;
            self.program.push(op);
        }
    }

    fn parse_product(&mut self) -> Result<()> {
        self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.chars.peek() {
                Some('*') => OpCode::Mul,
                Some('/') => OpCode::Div,
                _ => return Ok(()),
            };
            self.chars.next();
            self.parse_unary()?;
            self.program.push(op);
        }
    }

    fn parse_unary(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.chars.peek() == Some(&'-') {
            self.chars.next();
            self.parse_unary()?;
            self.program.push(OpCode::Neg);
            return Ok(());
        }
        self.parse_operand()
    }

    fn parse_operand(&mut self) -> Result<()> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            Some('(') => {
                self.chars.next();
                self.parse_sum()?;
                self.skip_whitespace();
                match self.chars.next() {
                    Some(')') => Ok(()),
                    _ => Err(QuarryError::config("missing ')' in weighting formula")),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let literal = self.take_number();
                let value: f64 = literal
                    .parse()
                    .map_err(|_| QuarryError::config(format!("bad number '{literal}' in weighting formula")))?;
                self.program.push(OpCode::Push(value));
                Ok(())
            }
            Some('_') => {
                self.chars.next();
                let digits = self.take_while(|c| c.is_ascii_digit());
                let idx: usize = digits.parse().map_err(|_| {
                    QuarryError::config(format!("bad argument reference '_{digits}' in weighting formula"))
                })?;
                self.program.push(OpCode::Arg(idx));
                Ok(())
            }
            Some(c) if c.is_alphabetic() => {
                let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
                let idx = self
                    .variables
                    .iter()
                    .position(|v| *v == name)
                    .ok_or_else(|| QuarryError::config(format!("unknown variable '{name}' in weighting formula")))?;
                self.program.push(OpCode::Var(idx));
                Ok(())
            }
            Some(c) => Err(QuarryError::config(format!("unexpected '{c}' in weighting formula"))),
            None => Err(QuarryError::config("unexpected end of weighting formula")),
        }
    }

    /// Digits and dots, optionally followed by an exponent with a sign.
    fn take_number(&mut self) -> String {
        let mut literal = self.take_while(|c| c.is_ascii_digit() || c == '.');
        if let Some(&marker @ ('e' | 'E')) = self.chars.peek() {
            literal.push(marker);
            self.chars.next();
            if let Some(&sign @ ('+' | '-')) = self.chars.peek() {
                literal.push(sign);
                self.chars.next();
            }
            literal.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }
        literal
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, accept: F) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if !accept(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars() -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    #[test]
    fn test_precedence_and_program() {
        let formula = WeightingFormula::compile("(_0 / _1) + ((1000 - _2) / 1000000)", &no_vars()).unwrap();
        assert_eq!(formula.arity(), 3);
        let value = formula.evaluate(&[6.0, 3.0, 500.0], &[]).unwrap();
        assert!((value - 2.0005).abs() < 1e-12);

        let formula = WeightingFormula::compile("1 + 2 * 3 - -4", &no_vars()).unwrap();
        assert_eq!(formula.evaluate(&[], &[]).unwrap(), 11.0);
        assert_eq!(
            WeightingFormula::compile("_0 * 2", &no_vars()).unwrap().program(),
            &[OpCode::Arg(0), OpCode::Push(2.0), OpCode::Mul]
        );
    }

    #[test]
    fn test_division_by_zero() {
        let formula = WeightingFormula::compile("_0 / _1", &no_vars()).unwrap();
        let err = formula.evaluate(&[1.0, 0.0], &[]).unwrap_err();
        assert!(matches!(err, QuarryError::Evaluation(_)));
    }

    #[test]
    fn test_variables() {
        let mut defaults = BTreeMap::new();
        defaults.insert("boost".to_string(), 2.0);
        let formula = WeightingFormula::compile("_0 * boost", &defaults).unwrap();
        let values = formula.bind(&BTreeMap::new()).unwrap();
        assert_eq!(formula.evaluate(&[3.0], &values).unwrap(), 6.0);

        let mut overrides = BTreeMap::new();
        overrides.insert("boost".to_string(), 10.0);
        let values = formula.bind(&overrides).unwrap();
        assert_eq!(formula.evaluate(&[3.0], &values).unwrap(), 30.0);

        overrides.insert("other".to_string(), 1.0);
        assert!(formula.bind(&overrides).is_err());
        assert!(WeightingFormula::compile("_0 * nope", &defaults).is_err());
    }

    #[test]
    fn test_exponent_literals() {
        for (source, expected) in [("1e-5 * _0", 2e-5), ("2.5E+2 + _0", 252.0), ("1e3-_0", 998.0)] {
            let formula = WeightingFormula::compile(source, &no_vars()).unwrap();
            assert_eq!(formula.evaluate(&[2.0], &[]).unwrap(), expected, "{source}");
        }
        assert!(WeightingFormula::compile("1e", &no_vars()).is_err());
        assert!(WeightingFormula::compile("1e+", &no_vars()).is_err());
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["", "(_0", "_0 +", "_x", "1 $ 2", "_0 _1"] {
            assert!(WeightingFormula::compile(source, &no_vars()).is_err(), "{source}");
        }
    }
}
