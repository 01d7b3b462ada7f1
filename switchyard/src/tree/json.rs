//! JSON form of a tree
//!
//! - a node without children is its scalar, or `null` when it has none
//! - a node with children is an object in child order; a value carried
//!   next to children sits under the reserved key `""`
//! - an array-tagged node without a value is an array of its children
//!
//! Objects read back with children in document order. Keys holding the
//! separator are escaped with `escape_segment` on read and restored on
//! write. Array elements become
//! children named by index. Doubles that JSON cannot carry (NaN, infinity)
//! come out as `null`.

use super::{escape_segment, unescape_segment, Tree, TreeError, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number};

/// Key holding a branch's own value
const VALUE_KEY: &str = "";

fn scalar_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Double(d) => Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
    }
}

/// Scalar JSON to a value; `None` for null, objects and arrays
pub(crate) fn json_to_scalar(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Double),
        },
        serde_json::Value::String(s) => Some(Value::Str(s.clone())),
        _ => None,
    }
}

impl From<&Tree> for serde_json::Value {
    fn from(tree: &Tree) -> Self {
        if tree.children.is_empty() && !tree.array {
            return tree
                .value
                .as_ref()
                .map(scalar_to_json)
                .unwrap_or(serde_json::Value::Null);
        }
        if tree.array && tree.value.is_none() {
            return serde_json::Value::Array(
                tree.children
                    .iter()
                    .map(|(_, child)| serde_json::Value::from(child))
                    .collect(),
            );
        }
        let mut map = Map::new();
        if let Some(value) = &tree.value {
            map.insert(VALUE_KEY.to_string(), scalar_to_json(value));
        }
        for (name, child) in &tree.children {
            map.insert(unescape_segment(name), serde_json::Value::from(child));
        }
        serde_json::Value::Object(map)
    }
}

impl From<Tree> for serde_json::Value {
    fn from(tree: Tree) -> Self {
        serde_json::Value::from(&tree)
    }
}

impl TryFrom<serde_json::Value> for Tree {
    type Error = TreeError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Tree::new()),
            serde_json::Value::Array(items) => {
                let mut tree = Tree::new();
                tree.array = true;
                for (index, item) in items.into_iter().enumerate() {
                    tree.children.push((index.to_string(), Tree::try_from(item)?));
                }
                Ok(tree)
            }
            serde_json::Value::Object(map) => {
                let mut tree = Tree::new();
                for (key, item) in map {
                    if key == VALUE_KEY {
                        tree.value = Some(json_to_scalar(&item).ok_or_else(|| {
                            TreeError::Parse("the empty key must hold a scalar".to_string())
                        })?);
                        continue;
                    }
                    let child = Tree::try_from(item)?;
                    tree.put_child(&escape_segment(&key), child);
                }
                Ok(tree)
            }
            scalar => Ok(json_to_scalar(&scalar).map(Tree::leaf).unwrap_or_default()),
        }
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Tree::try_from(json).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shapes() {
        let mut tree = Tree::new();
        tree.vgraft(".leaf", 1);
        tree.graft(".empty", Tree::new());
        tree.vgraft(".both", "self");
        tree.vgraft(".both.kid", 2.5);

        assert_eq!(
            serde_json::Value::from(&tree),
            json!({"leaf": 1, "empty": null, "both": {"": "self", "kid": 2.5}})
        );
    }

    #[test]
    fn test_round_trip_preserves_order_and_types() {
        let mut tree = Tree::new();
        tree.vgraft(".z", true);
        tree.vgraft(".a", 7);
        tree.vgraft(".m", 7.0);
        tree.vgraft(".b", "7");
        tree.vgraft(".nested.v", "x");
        tree.get_mut(".nested").unwrap().set_value(1);

        let back = Tree::from_json(&tree.to_json()).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.children(""), vec!["z", "a", "m", "b", "nested"]);
    }

    #[test]
    fn test_arrays() {
        let tree = Tree::from_json(r#"{"list": ["a", {"k": 1}]}"#).unwrap();
        assert!(tree.get(".list").unwrap().is_array());
        assert_eq!(tree.read::<String>(".list.0").unwrap(), "a");
        assert_eq!(tree.read::<i64>(".list.1.k").unwrap(), 1);
        assert_eq!(Tree::from_json(&tree.to_json()).unwrap(), tree);

        let empty = Tree::from_json("[]").unwrap();
        assert!(empty.is_array());
        assert_eq!(empty.to_json(), "[]");
    }

    #[test]
    fn test_dotted_keys_are_escaped() {
        let tree = Tree::from_json(r#"{"a.b": 1}"#).unwrap();
        assert_eq!(tree.children(""), vec!["a__DOT__b"]);
        assert_eq!(serde_json::Value::from(&tree), json!({"a.b": 1}));
    }

    #[test]
    fn test_non_scalar_value_key_is_rejected() {
        assert!(matches!(
            Tree::from_json(r#"{"": [1]}"#),
            Err(TreeError::Parse(_))
        ));
    }

    #[test]
    fn test_nan_becomes_null() {
        let tree = Tree::leaf(f64::NAN);
        assert_eq!(tree.to_json(), "null");
    }

    #[test]
    fn test_serde_through_yaml() {
        let tree: Tree = serde_yaml::from_str("rate: 48000\nname: main\n").unwrap();
        assert_eq!(tree.read::<i64>(".rate").unwrap(), 48000);
        assert_eq!(tree.read::<String>(".name").unwrap(), "main");
    }
}
