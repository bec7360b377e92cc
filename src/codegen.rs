//! Textual code emission.
//!
//! Nodes describe their computation as flat assignment statements over
//! indexed registers; [`CodeGenerator`] collects those statements and wraps
//! them into a routine. The output is C-compatible and contains no calls.

use std::fmt::Write as _;

/// A contiguous run of scalars inside a named work array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    base: String,
    offset: usize,
}

impl Register {
    pub fn new(base: impl Into<String>, offset: usize) -> Self {
        Register {
            base: base.into(),
            offset,
        }
    }

    /// Expression for the `k`-th scalar of the register.
    pub fn at(&self, k: usize) -> String {
        format!("{}[{}]", self.base, self.offset + k)
    }
}

/// Accumulates primitive statements.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    lines: Vec<String>,
    statements: usize,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dst = expr;`
    pub fn assign(&mut self, dst: String, expr: impl AsRef<str>) {
        self.lines.push(format!("  {} = {};", dst, expr.as_ref()));
        self.statements += 1;
    }

    /// `dst += expr;`
    pub fn accumulate(&mut self, dst: String, expr: impl AsRef<str>) {
        self.lines.push(format!("  {} += {};", dst, expr.as_ref()));
        self.statements += 1;
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("  /* {} */", text.as_ref()));
    }

    /// Raw line, emitted verbatim with the body indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("  {}", text.as_ref()));
        self.statements += 1;
    }

    /// Number of statements emitted so far (comments excluded).
    pub fn statement_count(&self) -> usize {
        self.statements
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Literal for a double constant.
    pub fn constant(value: f64) -> String {
        if value.is_nan() {
            "(0.0/0.0)".to_string()
        } else if value.is_infinite() {
            if value > 0.0 {
                "(1.0/0.0)".to_string()
            } else {
                "(-1.0/0.0)".to_string()
            }
        } else {
            format!("{:?}", value)
        }
    }

    /// Wrap the accumulated statements into a routine with the given signature.
    pub fn finish(self, signature: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {{", signature);
        for line in &self.lines {
            let _ = writeln!(out, "{}", line);
        }
        let _ = writeln!(out, "}}");
        out
    }
}

/// `a + b + ...`, or `0` for an empty list.
pub(crate) fn sum_of(terms: &[String]) -> String {
    if terms.is_empty() {
        "0".to_string()
    } else {
        terms.join(" + ")
    }
}
