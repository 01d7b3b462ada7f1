//! Convert tree files between JSON and key-path text.

use crate::TreeFormat;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use switchyard::Tree;

fn read_tree(input: &Path) -> Result<Tree> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let tree = match input.extension().and_then(|e| e.to_str()) {
        Some("kv") => Tree::from_keyval(&text),
        _ => Tree::from_json(&text),
    };
    tree.with_context(|| format!("Failed to parse {}", input.display()))
}

pub fn convert_tree(input: &Path, to: TreeFormat, output: Option<&Path>) -> Result<()> {
    let tree = read_tree(input)?;
    let mut text = match to {
        TreeFormat::Json => tree.to_json_pretty(),
        TreeFormat::Keyval => tree.to_keyval(),
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }

    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}
