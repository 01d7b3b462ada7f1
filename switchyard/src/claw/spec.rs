//! Connection specifications and capability matching
//!
//! A kind declares its ports as JSON:
//!
//! ```json
//! {
//!   "writer":   [{"label": "out", "description": "Text out", "can_do": ["text"]}],
//!   "follower": [{"label": "in%", "description": "Any input", "can_do": ["*"]}]
//! }
//! ```
//!
//! A label ending with [`META_SUFFIX`] declares a meta port.

use crate::error::{Error, Result};
use crate::tree::{Tree, SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Marker ending a meta port label
pub const META_SUFFIX: char = '%';

/// Matches any capability
pub const ANY_CAPABILITY: &str = "*";

/// One declared port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub can_do: Vec<String>,
}

impl PortSpec {
    pub fn new(label: &str, description: &str, can_do: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            description: description.to_string(),
            can_do: can_do.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_meta(&self) -> bool {
        is_meta_label(&self.label)
    }

    fn to_tree(&self) -> Tree {
        let mut tree = Tree::new();
        tree.vgraft("label", self.label.as_str());
        tree.vgraft("description", self.description.as_str());
        let mut can_do = Tree::new();
        for (index, capability) in self.can_do.iter().enumerate() {
            can_do.vgraft(&index.to_string(), capability.as_str());
        }
        can_do.tag_as_array("", true);
        tree.graft("can_do", can_do);
        tree
    }
}

/// Writer and follower ports of a kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    #[serde(default)]
    pub writer: Vec<PortSpec>,
    #[serde(default)]
    pub follower: Vec<PortSpec>,
}

impl ConnectionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(mut self, label: &str, description: &str, can_do: &[&str]) -> Self {
        self.writer.push(PortSpec::new(label, description, can_do));
        self
    }

    pub fn with_follower(mut self, label: &str, description: &str, can_do: &[&str]) -> Self {
        self.follower.push(PortSpec::new(label, description, can_do));
        self
    }

    /// Parse and validate
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: ConnectionSpec =
            serde_json::from_str(text).map_err(|e| Error::InvalidSpec(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_tree(tree: &Tree) -> Result<Self> {
        let spec: ConnectionSpec = serde_json::from_value(serde_json::Value::from(tree))
            .map_err(|e| Error::InvalidSpec(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Labels must be non-empty, separator-free and unique per side; the
    /// meta marker may only end a label; non-meta ports need capabilities.
    pub fn validate(&self) -> Result<()> {
        for (side, ports) in [("writer", &self.writer), ("follower", &self.follower)] {
            let mut seen = HashSet::new();
            for port in ports {
                let label = port.label.as_str();
                if label.is_empty() || label == META_SUFFIX.to_string() {
                    return Err(Error::InvalidSpec(format!("{} with an empty label", side)));
                }
                if label.contains(SEPARATOR) {
                    return Err(Error::InvalidSpec(format!(
                        "{} label '{}' contains '{}'",
                        side, label, SEPARATOR
                    )));
                }
                if label.trim_end_matches(META_SUFFIX).contains(META_SUFFIX)
                    || label.ends_with(&format!("{}{}", META_SUFFIX, META_SUFFIX))
                {
                    return Err(Error::InvalidSpec(format!(
                        "{} label '{}': '{}' may only end a label",
                        side, label, META_SUFFIX
                    )));
                }
                if !port.is_meta() && port.can_do.is_empty() {
                    return Err(Error::InvalidSpec(format!(
                        "{} '{}' declares no capability",
                        side, label
                    )));
                }
                if !seen.insert(label) {
                    return Err(Error::InvalidSpec(format!(
                        "duplicate {} label '{}'",
                        side, label
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_tree(&self) -> Tree {
        let mut tree = Tree::new();
        for (side, ports) in [("writer", &self.writer), ("follower", &self.follower)] {
            let mut list = Tree::new();
            for (index, port) in ports.iter().enumerate() {
                list.graft(&index.to_string(), port.to_tree());
            }
            list.tag_as_array("", true);
            tree.graft(side, list);
        }
        tree
    }
}

pub fn is_meta_label(label: &str) -> bool {
    label.ends_with(META_SUFFIX)
}

/// Concrete label for instance `index` of a meta template
pub fn derive_label(template: &str, index: usize) -> String {
    format!("{}{}", template.trim_end_matches(META_SUFFIX), index)
}

/// Index of `label` as an instance of meta `template`, if it is one
pub fn instance_index(template: &str, label: &str) -> Option<usize> {
    let digits = label.strip_prefix(template.trim_end_matches(META_SUFFIX))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    (derive_label(template, index) == label).then_some(index)
}

fn media_type(capability: &str) -> &str {
    capability.split(',').next().unwrap_or_default().trim()
}

fn wildcard_matches(pattern: &str, media: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(family) => media.split('/').next() == Some(family),
        None => false,
    }
}

/// Whether one writer capability satisfies one follower capability
pub fn capability_matches(writer: &str, follower: &str) -> bool {
    let (writer, follower) = (writer.trim(), follower.trim());
    if writer == follower || writer == ANY_CAPABILITY || follower == ANY_CAPABILITY {
        return true;
    }
    let (w, f) = (media_type(writer), media_type(follower));
    w == f || wildcard_matches(w, f) || wildcard_matches(f, w)
}

/// First writer capability accepted by the follower, if any
pub fn negotiate<'a>(writer: &'a [String], follower: &[String]) -> Option<&'a str> {
    writer
        .iter()
        .find(|w| follower.iter().any(|f| capability_matches(w, f)))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let spec = ConnectionSpec::from_json(
            r#"{"writer": [{"label": "out", "description": "Out", "can_do": ["text"]}],
                "follower": [{"label": "in%", "can_do": ["*"]}]}"#,
        )
        .unwrap();
        assert_eq!(spec.writer[0].label, "out");
        assert!(spec.follower[0].is_meta());
        assert_eq!(spec.follower[0].description, "");
    }

    #[test]
    fn test_tree_round_trip() {
        let spec = ConnectionSpec::new()
            .with_writer("out", "Out", &["text", "text/plain"])
            .with_follower("in", "In", &["text"]);
        assert_eq!(ConnectionSpec::from_tree(&spec.to_tree()).unwrap(), spec);
    }

    #[test]
    fn test_validation() {
        let bad = [
            r#"{"writer": [{"label": "", "can_do": ["x"]}]}"#,
            r#"{"writer": [{"label": "a.b", "can_do": ["x"]}]}"#,
            r#"{"follower": [{"label": "a%b", "can_do": ["x"]}]}"#,
            r#"{"follower": [{"label": "a", "can_do": []}]}"#,
            r#"{"follower": [{"label": "a", "can_do": ["x"]}, {"label": "a", "can_do": ["y"]}]}"#,
            r#"{"writer": "nope"}"#,
        ];
        for text in bad {
            assert!(ConnectionSpec::from_json(text).is_err(), "{}", text);
        }
        assert!(ConnectionSpec::from_json("{}").is_ok());
    }

    #[test]
    fn test_capability_rules() {
        assert!(capability_matches("text", "text"));
        assert!(!capability_matches("text", "audio"));
        assert!(capability_matches("audio/x-raw", "*"));
        assert!(capability_matches("*", "video/x-raw"));
        assert!(capability_matches("audio/x-raw", "audio/*"));
        assert!(capability_matches("audio/*", "audio/x-raw"));
        assert!(!capability_matches("video/x-raw", "audio/*"));
        assert!(capability_matches(
            "audio/x-raw, channels=2",
            "audio/x-raw, channels=1"
        ));
    }

    #[test]
    fn test_negotiate_picks_first_writer_capability() {
        let writer = vec!["video/x-raw".to_string(), "text".to_string()];
        let follower = vec!["text".to_string()];
        assert_eq!(negotiate(&writer, &follower), Some("text"));
        assert_eq!(negotiate(&writer, &["audio/*".to_string()]), None);
    }

    #[test]
    fn test_derive_label() {
        assert_eq!(derive_label("in%", 0), "in0");
        assert_eq!(derive_label("video%", 12), "video12");
        assert_eq!(instance_index("in%", "in3"), Some(3));
        assert_eq!(instance_index("in%", "in"), None);
        assert_eq!(instance_index("in%", "in03"), None);
        assert_eq!(instance_index("in%", "out0"), None);
    }
}
