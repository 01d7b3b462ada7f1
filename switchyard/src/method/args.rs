//! Delimited argument strings
//!
//! Arguments are separated by `,`. Inside an argument, `\,` is a literal
//! comma and `\\` a literal backslash. Any other escape, or a trailing
//! lone backslash, is a parse failure.

use crate::error::{Error, Result};
use crate::tree::Value;

pub const DELIMITER: char = ',';
const ESCAPE: char = '\\';

/// Native type of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Bool,
    Int,
    Double,
    Str,
}

impl ArgType {
    pub fn type_name(self) -> &'static str {
        match self {
            ArgType::Bool => "bool",
            ArgType::Int => "int",
            ArgType::Double => "double",
            ArgType::Str => "string",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ArgType::Bool, Value::Bool(_))
                | (ArgType::Int, Value::Int(_))
                | (ArgType::Double, Value::Double(_))
                | (ArgType::Str, Value::Str(_))
        )
    }

    pub fn parse(self, arg: &str, text: &str) -> Result<Value> {
        let what = || format!("{} argument {}", self.type_name(), arg);
        match self {
            ArgType::Bool => match text.trim() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                other => Err(Error::parse(what(), format!("'{}' is not a bool", other))),
            },
            ArgType::Int => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| Error::parse(what(), e.to_string())),
            ArgType::Double => text
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| Error::parse(what(), e.to_string())),
            ArgType::Str => Ok(Value::Str(text.to_string())),
        }
    }
}

/// Escape one argument for inclusion in a delimited string
pub fn escape(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        if c == ESCAPE || c == DELIMITER {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Escape and join arguments
pub fn join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| escape(a.as_ref()))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

/// Split on unescaped delimiters, resolving escapes
pub fn split(text: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next @ (ESCAPE | DELIMITER)) => current.push(next),
                Some(other) => {
                    return Err(Error::parse(
                        "method arguments",
                        format!("unknown escape '\\{}'", other),
                    ))
                }
                None => {
                    return Err(Error::parse(
                        "method arguments",
                        "trailing escape character",
                    ))
                }
            },
            DELIMITER => args.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    args.push(current);
    Ok(args)
}
