//! Kinds every registry can offer
//!
//! - `empty`: no ports, holds user data
//! - `echo`: text in, text out, repeats what it is told through `on-said`
//! - `dummy-sink`: one meta follower accepting anything, counts its
//!   connections

use crate::claw::{ConnectionInfo, ConnectionSpec};
use crate::component::{Behavior, Component};
use crate::error::Result;
use crate::method::{ArgSpec, ArgType};
use crate::property::{Access, PropertyBag};
use crate::registry::{KindDoc, Registry};
use crate::tree::{Tree, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub const EMPTY: &str = "empty";
pub const ECHO: &str = "echo";
pub const DUMMY_SINK: &str = "dummy-sink";

/// Emitted by `echo` on every `say`
pub const ON_SAID: &str = "on-said";

/// Register `empty`, `echo` and `dummy-sink`
pub fn register_all(registry: &Registry) -> Result<()> {
    registry.register_kind(
        KindDoc::new(EMPTY, "Empty", "utils", "Component without ports, for user data")
            .with_tags(&["utils"]),
        ConnectionSpec::new(),
        |_| Ok(Arc::new(Empty) as Arc<dyn Behavior>),
    )?;
    registry.register_kind(
        KindDoc::new(ECHO, "Echo", "test", "Repeats the message it is given")
            .with_tags(&["test", "text"]),
        ConnectionSpec::new()
            .with_writer("out", "Echoed text", &["text"])
            .with_follower("in", "Text to echo", &["text"]),
        echo,
    )?;
    registry.register_kind(
        KindDoc::new(DUMMY_SINK, "Dummy sink", "test", "Accepts any number of connections")
            .with_tags(&["test", "sink"]),
        ConnectionSpec::new().with_follower("in%", "Any input", &["*"]),
        dummy_sink,
    )?;
    Ok(())
}

struct Empty;

impl Behavior for Empty {}

struct Echo {
    name: String,
}

impl Behavior for Echo {
    fn on_connect(&self, connection: &ConnectionInfo) -> bool {
        tracing::debug!(
            echo = %self.name,
            writer = %format!("{}.{}", connection.writer_component_name, connection.writer_label),
            "echo input connected"
        );
        true
    }
}

fn echo(component: &Arc<Component>) -> Result<Arc<dyn Behavior>> {
    let greeting = component
        .config()
        .read::<String>(".greeting")
        .unwrap_or_default();
    component
        .properties()
        .make_str("message", Access::stored(), "Last message said", &greeting)?;
    component.signals().make(ON_SAID, "A message was said")?;

    let properties = component.properties().clone();
    let signals = component.signals().clone();
    component.methods().make(
        "say",
        "Say a message",
        vec![ArgSpec::new("message", "Text to say", ArgType::Str)],
        move |args| {
            let message = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| "say expects a message".to_string())?
                .to_string();
            properties
                .set_value("message", message.as_str())
                .map_err(|e| e.to_string())?;
            signals
                .emit(ON_SAID, &Tree::leaf(message.as_str()))
                .map_err(|e| e.to_string())?;
            Ok(Value::Str(message))
        },
    )?;

    Ok(Arc::new(Echo {
        name: component.name().to_string(),
    }))
}

struct DummySink {
    connected: Arc<AtomicI64>,
    properties: PropertyBag,
}

impl DummySink {
    fn publish(&self) {
        if let Err(e) = self.properties.notify("connected", None) {
            tracing::warn!(error = %e, "connection count not published");
        }
    }
}

impl Behavior for DummySink {
    fn on_connect(&self, _connection: &ConnectionInfo) -> bool {
        self.connected.fetch_add(1, Ordering::SeqCst);
        self.publish();
        true
    }

    fn on_disconnect(&self, _connection: &ConnectionInfo) -> bool {
        self.connected.fetch_sub(1, Ordering::SeqCst);
        self.publish();
        true
    }
}

fn dummy_sink(component: &Arc<Component>) -> Result<Arc<dyn Behavior>> {
    let connected = Arc::new(AtomicI64::new(0));
    let count = connected.clone();
    component.properties().make_int(
        "connected",
        Access::read_only().with_getter(move || count.load(Ordering::SeqCst)),
        "Number of live connections",
        0,
        0,
        i64::MAX,
    )?;
    Ok(Arc::new(DummySink {
        connected,
        properties: component.properties().clone(),
    }))
}
