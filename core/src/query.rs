//! Parameterised query templates.
//!
//! Templates name their parameters `:start_time` / `:end_time`. They are compiled
//! to the backend's positional placeholders; values are always bound, never spliced.

use crate::error::{IngestError, IngestResult};
use std::path::Path;

pub const READ_DATA_TEMPLATE: &str = "read_data";
pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Template file name for this dialect, e.g. `read_data.sql` / `read_data.sqlite.sql`.
    pub fn template_file(self, stem: &str) -> String {
        match self {
            Dialect::Postgres => format!("{stem}.sql"),
            Dialect::Sqlite => format!("{stem}.sqlite.sql"),
        }
    }

    fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${position}"),
            Dialect::Sqlite => format!("?{position}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    /// SQL with positional placeholders.
    pub sql: String,
    /// Parameter names by position (index 0 is placeholder 1).
    pub params: Vec<String>,
}

impl QueryTemplate {
    /// Load `<dir>/<stem>[.sqlite].sql` and compile it for `dialect`.
    pub fn load(dir: impl AsRef<Path>, stem: &str, dialect: Dialect) -> IngestResult<Self> {
        let path = dir.as_ref().join(dialect.template_file(stem));
        let text = std::fs::read_to_string(&path)
            .map_err(|e| IngestError::Query(format!("cannot read template {}: {e}", path.display())))?;
        Self::compile(&text, dialect)
    }

    /// Compile template text. Quoted literals, quoted identifiers, comments and
    /// `::type` casts are copied through untouched.
    pub fn compile(text: &str, dialect: Dialect) -> IngestResult<Self> {
        let chars: Vec<char> = text.chars().collect();
        let mut sql = String::with_capacity(text.len());
        let mut params: Vec<String> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = scan_quoted(&chars, i, c);
                    sql.extend(&chars[i..end]);
                    i = end;
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    let end = chars[i..].iter().position(|&ch| ch == '\n').map_or(chars.len(), |p| i + p);
                    sql.extend(&chars[i..end]);
                    i = end;
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    let end = find_block_end(&chars, i + 2);
                    sql.extend(&chars[i..end]);
                    i = end;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    sql.push_str("::");
                    i += 2;
                }
                ':' if chars.get(i + 1).is_some_and(|ch| ch.is_ascii_alphabetic() || *ch == '_') => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let position = match params.iter().position(|p| *p == name) {
                        Some(p) => p + 1,
                        None => {
                            params.push(name);
                            params.len()
                        }
                    };
                    sql.push_str(&dialect.placeholder(position));
                    i = end;
                }
                _ => {
                    sql.push(c);
                    i += 1;
                }
            }
        }

        Ok(Self { sql, params })
    }

    /// Fail unless the template names exactly `expected`, in any order.
    pub fn expect_params(&self, expected: &[&str]) -> IngestResult<()> {
        for name in expected {
            if !self.params.iter().any(|p| p.as_str() == *name) {
                return Err(IngestError::Query(format!("template does not bind :{name}")));
            }
        }
        if let Some(unknown) = self.params.iter().find(|p| !expected.contains(&p.as_str())) {
            return Err(IngestError::Query(format!("template names unknown parameter :{unknown}")));
        }
        Ok(())
    }

    /// Arrange named values into positional order.
    pub fn bind<'v, T>(&self, values: &[(&str, &'v T)]) -> IngestResult<Vec<&'v T>> {
        self.params
            .iter()
            .map(|name| {
                values
                    .iter()
                    .find(|(n, _)| *n == name.as_str())
                    .map(|(_, v)| *v)
                    .ok_or_else(|| IngestError::Query(format!("no value for :{name}")))
            })
            .collect()
    }
}

fn scan_quoted(chars: &[char], open: usize, quote: char) -> usize {
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == quote {
            // A doubled quote is an escaped quote.
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_block_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
