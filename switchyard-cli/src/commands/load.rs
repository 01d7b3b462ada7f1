//! Restore a saved session.

use super::open_registry;
use anyhow::{bail, Context, Result};
use serde_json::json;
use std::fs;
use std::path::Path;
use switchyard::Tree;

pub fn load_session(config: Option<&Path>, session: &Path, json: bool, strict: bool) -> Result<()> {
    let registry = open_registry(config)?;
    let text = fs::read_to_string(session)
        .with_context(|| format!("Failed to read session {}", session.display()))?;
    let state = Tree::from_json(&text).context("Failed to parse session")?;

    let report = registry.load(&state);

    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(name, e)| json!({"component": name, "error": e.to_string()}))
            .collect();
        let property_failures: Vec<_> = report
            .property_failures
            .iter()
            .map(|(property, e)| json!({"property": property, "error": e.to_string()}))
            .collect();
        let payload = json!({
            "created": report.created,
            "failed": failed,
            "connected": report.connected,
            "skipped_connections": report.skipped_connections,
            "property_failures": property_failures,
            "components": serde_json::Value::from(&registry.description()),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "Loaded {} components, {} connections",
            report.created.len(),
            report.connected
        );
        for (name, e) in &report.failed {
            println!("- component {}: {}", name, e);
        }
        for (property, e) in &report.property_failures {
            println!("- property {}: {}", property, e);
        }
        for skipped in &report.skipped_connections {
            println!("- connection {}", skipped);
        }
    }

    if strict && !report.is_complete() {
        bail!("session {} was not fully restored", session.display());
    }
    Ok(())
}
