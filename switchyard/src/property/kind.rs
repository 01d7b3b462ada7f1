//! Property kinds and their string codec

use crate::error::{Error, Result};
use crate::tree::{Tree, Value};

/// Semantic type of a property
///
/// Choice kinds (`Selection`, `Enumeration`) store the index of the
/// current option; their string form is the option label.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Bool,
    Int { min: i64, max: i64 },
    Double { min: f64, max: f64 },
    Str,
    /// Pick one label from a list
    Selection { options: Vec<String> },
    /// Pick one label, the component receives the value attached to it
    Enumeration { options: Vec<(String, i64)> },
    /// Presentational nesting, holds no value
    Group,
}

impl PropertyKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Int { .. } => "int",
            PropertyKind::Double { .. } => "double",
            PropertyKind::Str => "string",
            PropertyKind::Selection { .. } => "selection",
            PropertyKind::Enumeration { .. } => "enumeration",
            PropertyKind::Group => "group",
        }
    }

    fn labels(&self) -> Vec<&str> {
        match self {
            PropertyKind::Selection { options } => options.iter().map(String::as_str).collect(),
            PropertyKind::Enumeration { options } => {
                options.iter().map(|(label, _)| label.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Read `text` as a value of this kind, without the bounds check
    pub fn parse(&self, name: &str, text: &str) -> Result<Value> {
        let trimmed = text.trim();
        match self {
            PropertyKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(Error::parse(
                    format!("bool for {}", name),
                    format!("'{}' is neither true nor false", text),
                )),
            },
            PropertyKind::Int { .. } => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| Error::parse(format!("int for {}", name), e.to_string())),
            PropertyKind::Double { .. } => trimmed
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| Error::parse(format!("double for {}", name), e.to_string())),
            PropertyKind::Str => Ok(Value::Str(text.to_string())),
            PropertyKind::Selection { .. } | PropertyKind::Enumeration { .. } => {
                let labels = self.labels();
                if let Some(index) = labels.iter().position(|l| *l == trimmed) {
                    return Ok(Value::Int(index as i64));
                }
                match trimmed.parse::<usize>() {
                    Ok(index) if index < labels.len() => Ok(Value::Int(index as i64)),
                    _ => Err(Error::parse(
                        format!("option for {}", name),
                        format!("'{}' is not one of [{}]", text, labels.join(", ")),
                    )),
                }
            }
            PropertyKind::Group => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: "a value-carrying property".to_string(),
                found: "group".to_string(),
            }),
        }
    }

    /// Check a parsed value against the declared bounds
    pub fn check(&self, name: &str, value: &Value) -> Result<()> {
        let out_of_range = |min: String, max: String| Error::OutOfRange {
            name: name.to_string(),
            value: value.to_string(),
            min,
            max,
        };
        match (self, value) {
            (PropertyKind::Int { min, max }, Value::Int(v)) => {
                if (*min..=*max).contains(v) {
                    Ok(())
                } else {
                    Err(out_of_range(min.to_string(), max.to_string()))
                }
            }
            (PropertyKind::Double { min, max }, Value::Double(v)) => {
                if (*min..=*max).contains(v) {
                    Ok(())
                } else {
                    Err(out_of_range(min.to_string(), max.to_string()))
                }
            }
            (PropertyKind::Bool, Value::Bool(_)) | (PropertyKind::Str, Value::Str(_)) => Ok(()),
            (
                PropertyKind::Selection { .. } | PropertyKind::Enumeration { .. },
                Value::Int(index),
            ) => {
                let count = self.labels().len() as i64;
                if (0..count).contains(index) {
                    Ok(())
                } else {
                    Err(out_of_range("0".to_string(), (count - 1).to_string()))
                }
            }
            _ => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: self.type_name().to_string(),
                found: value.type_name().to_string(),
            }),
        }
    }

    /// String form of a stored value
    pub fn format(&self, value: &Value) -> String {
        match (self, value) {
            (PropertyKind::Selection { .. } | PropertyKind::Enumeration { .. }, Value::Int(i)) => {
                self.labels()
                    .get(*i as usize)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| i.to_string())
            }
            _ => value.to_string(),
        }
    }

    /// Value as it appears in the information tree
    pub(crate) fn tree_value(&self, value: &Value) -> Value {
        match self {
            PropertyKind::Selection { .. } | PropertyKind::Enumeration { .. } => {
                Value::Str(self.format(value))
            }
            _ => value.clone(),
        }
    }

    /// Attached value of an enumeration option
    pub(crate) fn attached(&self, index: i64) -> Option<i64> {
        match self {
            PropertyKind::Enumeration { options } => {
                usize::try_from(index).ok().and_then(|i| options.get(i)).map(|(_, v)| *v)
            }
            _ => None,
        }
    }

    /// Option index carrying an attached enumeration value
    pub(crate) fn index_of_attached(&self, attached: i64) -> Option<i64> {
        match self {
            PropertyKind::Enumeration { options } => options
                .iter()
                .position(|(_, v)| *v == attached)
                .map(|i| i as i64),
            _ => None,
        }
    }

    /// Bounds and options, grafted next to the value
    pub(crate) fn describe(&self, tree: &mut Tree) {
        match self {
            PropertyKind::Int { min, max } => {
                tree.vgraft("min", *min);
                tree.vgraft("max", *max);
            }
            PropertyKind::Double { min, max } => {
                tree.vgraft("min", *min);
                tree.vgraft("max", *max);
            }
            PropertyKind::Selection { .. } | PropertyKind::Enumeration { .. } => {
                let mut options = Tree::new();
                for (index, label) in self.labels().into_iter().enumerate() {
                    options.vgraft(&index.to_string(), label);
                }
                tree.graft("options", options);
                tree.tag_as_array("options", true);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_numbers() {
        let int = PropertyKind::Int { min: 0, max: 10 };
        assert_eq!(int.parse("n", " 7 ").unwrap(), Value::Int(7));
        assert_eq!(int.parse("n", "7.5").unwrap_err().kind(), ErrorKind::ParseFailure);

        let double = PropertyKind::Double { min: 0.0, max: 1.0 };
        assert_eq!(double.parse("d", "0.25").unwrap(), Value::Double(0.25));
        assert!(double.parse("d", "0,25").is_err());
    }

    #[test]
    fn test_bounds() {
        let int = PropertyKind::Int { min: 0, max: 10 };
        assert!(int.check("n", &Value::Int(10)).is_ok());
        let err = int.check("n", &Value::Int(11)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let double = PropertyKind::Double { min: -1.0, max: 1.0 };
        assert!(double.check("d", &Value::Double(f64::NAN)).is_err());
    }

    #[test]
    fn test_selection_by_label_or_index() {
        let kind = PropertyKind::Selection {
            options: vec!["low".into(), "high".into()],
        };
        assert_eq!(kind.parse("q", "high").unwrap(), Value::Int(1));
        assert_eq!(kind.parse("q", "0").unwrap(), Value::Int(0));
        assert!(kind.parse("q", "2").is_err());
        assert!(kind.parse("q", "medium").is_err());
        assert_eq!(kind.format(&Value::Int(1)), "high");
    }

    #[test]
    fn test_enumeration_attached_values() {
        let kind = PropertyKind::Enumeration {
            options: vec![("slow".into(), 10), ("fast".into(), 100)],
        };
        assert_eq!(kind.attached(1), Some(100));
        assert_eq!(kind.attached(2), None);
        assert_eq!(kind.index_of_attached(10), Some(0));
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(PropertyKind::Bool.parse("b", "TRUE").unwrap(), Value::Bool(true));
        assert_eq!(PropertyKind::Bool.parse("b", "0").unwrap(), Value::Bool(false));
        assert!(PropertyKind::Bool.parse("b", "yes").is_err());
    }
}
