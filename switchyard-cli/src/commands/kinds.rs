//! List the kinds a registry can create.

use super::open_registry;
use anyhow::Result;
use std::path::Path;

pub fn list_kinds(config: Option<&Path>, json: bool) -> Result<()> {
    let registry = open_registry(config)?;

    if json {
        println!("{}", registry.kinds_doc().to_json_pretty());
        return Ok(());
    }

    for kind in registry.kinds() {
        let Some(doc) = registry.kind_doc(&kind) else {
            continue;
        };
        println!("{:<12} {:<8} {}", doc.kind, doc.category, doc.description);
        if let Some(spec) = registry.kind_spec(&kind) {
            for port in &spec.writer {
                println!("    writer   {:<8} {}", port.label, port.can_do.join(", "));
            }
            for port in &spec.follower {
                println!("    follower {:<8} {}", port.label, port.can_do.join(", "));
            }
        }
    }
    Ok(())
}
