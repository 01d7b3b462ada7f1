//! Key-path text form
//!
//! ```text
//! .audio.rate 48000
//! .audio.name "main"
//! .audio.muted false
//! .placeholder
//! ```
//!
//! One line per node carrying a value, in pre-order, followed by the
//! node's value as a JSON scalar. Nodes with neither value nor children
//! are written as a bare path so they survive a round trip. A value that
//! does not parse as a JSON scalar is read back as a plain string.
//!
//! Whitespace and backslashes inside a key are escaped (`\s`, `\t`, `\n`,
//! `\r`, `\\`), so the first bare space always ends the key.

use super::json::json_to_scalar;
use super::{Tree, TreeError, Value};

pub(crate) fn serialize(tree: &Tree) -> String {
    let mut out = String::new();
    if let Some(value) = tree.value() {
        out.push_str(". ");
        out.push_str(&encode(value));
        out.push('\n');
    }
    tree.walk(
        |path, node| {
            let key = escape_key(&format!(".{}", path.join(".")));
            match node.value() {
                Some(value) => {
                    out.push_str(&key);
                    out.push(' ');
                    out.push_str(&encode(value));
                    out.push('\n');
                }
                None if node.is_leaf() => {
                    out.push_str(&key);
                    out.push('\n');
                }
                None => {}
            }
            true
        },
        |_, _| true,
    );
    out
}

fn encode(value: &Value) -> String {
    match value {
        Value::Str(s) => serde_json::to_string(s).unwrap_or_else(|_| s.clone()),
        Value::Double(d) if d.is_finite() => serde_json::to_string(d).unwrap_or_else(|_| d.to_string()),
        other => other.to_string(),
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Split a line into its unescaped key and the text after it
fn split_key(line: &str) -> Result<(String, &str), String> {
    let mut key = String::new();
    let mut chars = line.char_indices();
    while let Some((at, c)) = chars.next() {
        match c {
            ' ' => return Ok((key, line[at + 1..].trim())),
            '\\' => match chars.next() {
                Some((_, 's')) => key.push(' '),
                Some((_, 't')) => key.push('\t'),
                Some((_, 'n')) => key.push('\n'),
                Some((_, 'r')) => key.push('\r'),
                Some((_, '\\')) => key.push('\\'),
                Some((_, other)) => return Err(format!("unknown escape '\\{}' in key", other)),
                None => return Err("dangling '\\' at end of key".to_string()),
            },
            c => key.push(c),
        }
    }
    Ok((key, ""))
}

fn decode(text: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|json| json_to_scalar(&json))
        .unwrap_or_else(|| Value::Str(text.to_string()))
}

pub(crate) fn deserialize(text: &str) -> Result<Tree, TreeError> {
    let mut tree = Tree::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('.') {
            return Err(TreeError::Parse(format!(
                "line {}: key must start with '.'",
                lineno + 1
            )));
        }
        let (key, rest) = split_key(line)
            .map_err(|e| TreeError::Parse(format!("line {}: {}", lineno + 1, e)))?;
        let node = tree.node_or_insert(&key);
        if !rest.is_empty() {
            node.set_value(decode(rest));
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let mut tree = Tree::new();
        tree.vgraft(".audio.rate", 48000);
        tree.vgraft(".audio.name", "main");
        tree.vgraft(".audio.gain", 0.5);
        tree.graft(".placeholder", Tree::new());

        assert_eq!(
            tree.to_keyval(),
            ".audio.rate 48000\n.audio.name \"main\"\n.audio.gain 0.5\n.placeholder\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let mut tree = Tree::new();
        tree.vgraft(".s", "with space, and \"quotes\"\nnewline");
        tree.vgraft(".i", -4);
        tree.vgraft(".d", 2.0);
        tree.vgraft(".b", true);
        tree.vgraft(".branch.leaf", "x");
        tree.get_mut(".branch").unwrap().set_value("own");
        tree.graft(".empty", Tree::new());

        let back = Tree::from_keyval(&tree.to_keyval()).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_unquoted_text_reads_as_string() {
        let tree = Tree::from_keyval(".name hello world\n\n.n 3\n").unwrap();
        assert_eq!(tree.read::<String>(".name").unwrap(), "hello world");
        assert_eq!(tree.read::<i64>(".n").unwrap(), 3);
    }

    #[test]
    fn test_root_value() {
        let tree = Tree::leaf("top");
        let back = Tree::from_keyval(&tree.to_keyval()).unwrap();
        assert_eq!(back.read::<String>("").unwrap(), "top");
    }

    #[test]
    fn test_keys_with_whitespace() {
        let mut tree = Tree::new();
        tree.vgraft(".front desk.level", 3);
        tree.vgraft(".tab\there.back\\slash", "x");

        let text = tree.to_keyval();
        assert_eq!(
            text,
            ".front\\sdesk.level 3\n.tab\\there.back\\\\slash \"x\"\n"
        );
        assert_eq!(Tree::from_keyval(&text).unwrap(), tree);
        assert!(matches!(
            Tree::from_keyval(".bad\\q 1"),
            Err(TreeError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_bad_key() {
        assert!(matches!(
            Tree::from_keyval("nodot 1"),
            Err(TreeError::Parse(_))
        ));
    }
}
