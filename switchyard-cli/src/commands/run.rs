//! Execute a script of registry operations.
//!
//! ```text
//! # comment
//! create echo a
//! create echo b
//! set a message hello, world
//! connect a.out b.in
//! invoke b say hi
//! nickname b Second echo
//! disconnect b.in
//! remove a
//! ```

use super::open_registry;
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::Path;
use switchyard::Registry;

#[derive(Debug, PartialEq)]
enum Step<'a> {
    Create { kind: &'a str, name: &'a str },
    Remove { name: &'a str },
    Set { component: &'a str, property: &'a str, value: &'a str },
    Invoke { component: &'a str, method: &'a str, args: &'a str },
    Connect { writer: Endpoint<'a>, follower: Endpoint<'a> },
    Disconnect { follower: Endpoint<'a> },
    Nickname { component: &'a str, nickname: &'a str },
}

#[derive(Debug, PartialEq, Clone, Copy)]
struct Endpoint<'a> {
    component: &'a str,
    label: &'a str,
}

fn endpoint(text: &str) -> Result<Endpoint<'_>> {
    let (component, label) = text
        .split_once('.')
        .ok_or_else(|| anyhow!("expected <component>.<label>, got '{}'", text))?;
    Ok(Endpoint { component, label })
}

/// Split off the first whitespace-delimited word
fn word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (text, ""),
    }
}

fn required<'a>(text: &'a str, what: &str) -> Result<(&'a str, &'a str)> {
    let (head, rest) = word(text);
    if head.is_empty() {
        bail!("missing {}", what);
    }
    Ok((head, rest))
}

fn parse_step(line: &str) -> Result<Option<Step<'_>>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (op, rest) = word(line);
    let step = match op {
        "create" => {
            let (kind, rest) = required(rest, "kind")?;
            let (name, _) = word(rest);
            Step::Create { kind, name }
        }
        "remove" => Step::Remove {
            name: required(rest, "component")?.0,
        },
        "set" => {
            let (component, rest) = required(rest, "component")?;
            let (property, value) = required(rest, "property")?;
            Step::Set {
                component,
                property,
                value,
            }
        }
        "invoke" => {
            let (component, rest) = required(rest, "component")?;
            let (method, args) = required(rest, "method")?;
            Step::Invoke {
                component,
                method,
                args,
            }
        }
        "connect" => {
            let (writer, rest) = required(rest, "writer")?;
            let (follower, _) = required(rest, "follower")?;
            Step::Connect {
                writer: endpoint(writer)?,
                follower: endpoint(follower)?,
            }
        }
        "disconnect" => Step::Disconnect {
            follower: endpoint(required(rest, "follower")?.0)?,
        },
        "nickname" => {
            let (component, nickname) = required(rest, "component")?;
            Step::Nickname {
                component,
                nickname,
            }
        }
        other => bail!("unknown operation '{}'", other),
    };
    Ok(Some(step))
}

fn execute(registry: &Registry, step: Step<'_>) -> Result<()> {
    match step {
        Step::Create { kind, name } => {
            let qrox = registry.create(kind, name, None)?;
            println!("created {} ({})", qrox.name(), qrox.id());
        }
        Step::Remove { name } => registry.remove(name)?,
        Step::Set {
            component,
            property,
            value,
        } => registry.set_str_str(component, property, value)?,
        Step::Invoke {
            component,
            method,
            args,
        } => {
            let result = registry.invoke_str(component, method, args)?;
            println!("{}.{} -> {}", component, method, result);
        }
        Step::Connect { writer, follower } => {
            let id = registry.connect(
                writer.component,
                writer.label,
                follower.component,
                follower.label,
            )?;
            println!(
                "connected {}.{} -> {}.{} ({})",
                writer.component, writer.label, follower.component, follower.label, id
            );
        }
        Step::Disconnect { follower } => {
            let qrox = registry
                .find(follower.component)
                .ok_or_else(|| anyhow!("no component named '{}'", follower.component))?;
            let connection = qrox
                .claw()
                .connections()
                .into_iter()
                .find(|c| c.follower_label == follower.label)
                .ok_or_else(|| {
                    anyhow!("{}.{} is not connected", follower.component, follower.label)
                })?;
            registry.disconnect(follower.component, connection.follower_id)?;
        }
        Step::Nickname {
            component,
            nickname,
        } => {
            registry
                .find(component)
                .ok_or_else(|| anyhow!("no component named '{}'", component))?
                .set_nickname(nickname);
        }
    }
    Ok(())
}

pub fn run_script(
    config: Option<&Path>,
    script: &Path,
    save: Option<&Path>,
    dump: bool,
) -> Result<()> {
    let registry = open_registry(config)?;
    let text = fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))?;

    for (index, line) in text.lines().enumerate() {
        let lineno = index + 1;
        let step = parse_step(line).with_context(|| format!("line {}: cannot parse", lineno))?;
        if let Some(step) = step {
            execute(&registry, step).with_context(|| format!("line {}: {}", lineno, line.trim()))?;
        }
    }
    tracing::info!(components = registry.len(), "script finished");

    if let Some(path) = save {
        fs::write(path, registry.save().to_json_pretty())
            .with_context(|| format!("Failed to write session to {}", path.display()))?;
        println!("saved session to {}", path.display());
    }
    if dump {
        println!("{}", registry.tree().to_json_pretty());
    }
    Ok(())
}
