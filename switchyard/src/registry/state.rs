//! Session save and restore
//!
//! A session is one tree:
//!
//! ```text
//! .components.<name>.kind
//! .components.<name>.nickname
//! .components.<name>.properties.<property>
//! .components.<name>.custom
//! .components.<name>.user_data
//! .connections.<n>.{writer_component, writer_label,
//!                   follower_component, follower_label, follower_template}
//! ```
//!
//! Components are restored in stored order, then their custom state is
//! handed to `on_loading`, then properties and user data are applied and
//! only then connections are resolved.

use super::Registry;
use crate::error::Error;
use crate::tree::Tree;

const COMPONENTS: &str = ".components";
const CONNECTIONS: &str = ".connections";

/// What [`Registry::load`] managed to restore
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of recreated components, in creation order
    pub created: Vec<String>,
    /// Components that could not be recreated
    pub failed: Vec<(String, Error)>,
    pub connected: usize,
    /// Connection entries left out, with the reason
    pub skipped_connections: Vec<String>,
    /// `component.property` values that were refused
    pub property_failures: Vec<(String, Error)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
            && self.skipped_connections.is_empty()
            && self.property_failures.is_empty()
    }
}

struct SavedConnection {
    writer_component: String,
    writer_label: String,
    follower_component: String,
    follower_label: String,
    follower_template: Option<String>,
}

impl SavedConnection {
    fn from_tree(entry: &Tree) -> Option<Self> {
        Some(Self {
            writer_component: entry.read(".writer_component").ok()?,
            writer_label: entry.read(".writer_label").ok()?,
            follower_component: entry.read(".follower_component").ok()?,
            follower_label: entry.read(".follower_label").ok()?,
            follower_template: entry.read(".follower_template").ok(),
        })
    }

    fn describe(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.writer_component, self.writer_label, self.follower_component, self.follower_label
        )
    }
}

impl Registry {
    /// Snapshot every live component and connection
    ///
    /// Calls `on_saving` on each component for its custom state, then
    /// `on_saved` once the whole session is captured.
    pub fn save(&self) -> Tree {
        let components = self.shared.all();
        let mut state = Tree::new();
        let mut connections = Tree::new();

        for component in &components {
            let base = format!("{}.{}", COMPONENTS, component.name());
            state.vgraft(&format!("{}.kind", base), component.kind());
            state.vgraft(&format!("{}.nickname", base), component.nickname());

            let mut properties = Tree::new();
            for (name, value) in component.properties().saved_values() {
                properties.vgraft(&name, value);
            }
            state.graft(&format!("{}.properties", base), properties);

            match component.with_behavior(|b| b.on_saving()) {
                Ok(Some(custom)) if !custom.is_empty() => {
                    state.graft(&format!("{}.custom", base), custom);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(component = %component.name(), error = %e, "not saving custom state"),
            }

            let user_data = component.user_data();
            if !user_data.is_empty() {
                state.graft(&format!("{}.user_data", base), user_data);
            }

            for connection in component.claw().connections() {
                let mut entry = Tree::new();
                entry.vgraft("writer_component", connection.writer_component_name.as_str());
                entry.vgraft("writer_label", connection.writer_label.as_str());
                entry.vgraft("follower_component", component.name());
                entry.vgraft("follower_label", connection.follower_label.as_str());
                if let Some(template) = &connection.template {
                    entry.vgraft("follower_template", template.as_str());
                }
                connections.graft(&connections.len().to_string(), entry);
            }
        }

        connections.tag_as_array("", true);
        state.graft(CONNECTIONS, connections);

        for component in &components {
            let _ = component.with_behavior(|b| b.on_saved());
        }
        tracing::debug!(components = components.len(), "session saved");
        state
    }

    /// Restore a session produced by [`Registry::save`]
    ///
    /// Live components are kept; a stored name that is already taken fails
    /// that component only. Call [`Registry::reset`] first for a clean
    /// restore. Failures never abort the load, they are collected in the
    /// report.
    pub fn load(&self, state: &Tree) -> LoadReport {
        let mut report = LoadReport::default();
        let mut restored = Vec::new();

        let Some(entries) = state.get(COMPONENTS) else {
            return report;
        };

        for (name, entry) in entries.iter() {
            let kind = match entry.read::<String>(".kind") {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(component = name, "stored component has no kind");
                    report.failed.push((name.to_string(), e.into()));
                    continue;
                }
            };
            match self.create(&kind, name, None) {
                Ok(qrox) => {
                    report.created.push(name.to_string());
                    restored.push((qrox.component().clone(), entry));
                }
                Err(e) => {
                    tracing::warn!(component = name, kind = %kind, error = %e, "component not restored");
                    report.failed.push((name.to_string(), e));
                }
            }
        }

        for (component, entry) in &restored {
            if let Ok(nickname) = entry.read::<String>(".nickname") {
                component.set_nickname(&nickname);
            }
        }

        let empty = Tree::new();
        for (component, entry) in &restored {
            let custom = entry.get(".custom").unwrap_or(&empty);
            if let Ok(Some(false)) = component.with_behavior(|b| b.on_loading(custom)) {
                tracing::warn!(component = %component.name(), "custom state refused");
            }
        }

        for (component, entry) in &restored {
            if let Some(properties) = entry.get(".properties") {
                for (property, node) in properties.iter() {
                    let Some(value) = node.value() else { continue };
                    if let Err(e) = component
                        .properties()
                        .set_str_str(property, &value.to_string())
                    {
                        tracing::warn!(
                            component = %component.name(),
                            property,
                            error = %e,
                            "property not restored"
                        );
                        report
                            .property_failures
                            .push((format!("{}.{}", component.name(), property), e));
                    }
                }
            }
            if let Some(user_data) = entry.get(".user_data") {
                for (path, subtree) in user_data.iter() {
                    component.user_data_graft(path, subtree.clone());
                }
            }
        }

        if let Some(connections) = state.get(CONNECTIONS) {
            for (_, entry) in connections.iter() {
                let Some(saved) = SavedConnection::from_tree(entry) else {
                    tracing::warn!("malformed connection entry skipped");
                    report.skipped_connections.push("malformed entry".to_string());
                    continue;
                };
                match self.restore_connection(&saved) {
                    Ok(()) => report.connected += 1,
                    Err(e) => {
                        tracing::warn!(connection = %saved.describe(), error = %e, "connection skipped");
                        report
                            .skipped_connections
                            .push(format!("{}: {}", saved.describe(), e));
                    }
                }
            }
        }

        for (component, _) in &restored {
            let _ = component.with_behavior(|b| b.on_loaded());
        }
        tracing::debug!(
            created = report.created.len(),
            connected = report.connected,
            "session loaded"
        );
        report
    }

    fn restore_connection(&self, saved: &SavedConnection) -> crate::Result<()> {
        let writer = self
            .shared
            .get(self.require_id(&saved.writer_component)?)
            .ok_or_else(|| Error::ComponentNotFound(saved.writer_component.clone()))?;
        let follower = self
            .shared
            .get(self.require_id(&saved.follower_component)?)
            .ok_or_else(|| Error::ComponentNotFound(saved.follower_component.clone()))?;

        let writer_id = writer.claw().get_swid(&saved.writer_label).ok_or_else(|| {
            Error::PortNotFound(format!("{}.{}", saved.writer_component, saved.writer_label))
        })?;
        let claw = follower.claw();
        match &saved.follower_template {
            Some(template) => {
                claw.connect_instance(template, &saved.follower_label, writer.id(), writer_id)
            }
            None => claw.connect_label(&saved.follower_label, writer.id(), writer_id),
        }
        .map(|_| ())
    }

    fn require_id(&self, name: &str) -> crate::Result<crate::types::ComponentId> {
        self.get_id(name)
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::claw::ConnectionSpec;
    use crate::component::Behavior;
    use crate::property::Access;
    use crate::registry::{KindDoc, Registry};
    use crate::tree::Tree;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Notes {
        text: Arc<Mutex<String>>,
        loaded: Arc<Mutex<bool>>,
    }

    impl Behavior for Notes {
        fn on_saving(&self) -> Tree {
            let mut tree = Tree::new();
            tree.vgraft("text", self.text.lock().as_str());
            tree
        }

        fn on_loading(&self, custom: &Tree) -> bool {
            match custom.read::<String>(".text") {
                Ok(text) => {
                    *self.text.lock() = text;
                    true
                }
                Err(_) => false,
            }
        }

        fn on_loaded(&self) {
            *self.loaded.lock() = true;
        }
    }

    fn registry() -> Registry {
        let registry = Registry::default();
        registry
            .register_kind(
                KindDoc::new("notes", "Notes", "test", ""),
                ConnectionSpec::new()
                    .with_writer("out", "", &["text"])
                    .with_follower("in%", "", &["text"]),
                |component| {
                    component
                        .properties()
                        .make_int("size", Access::stored(), "", 12, 6, 72)?;
                    component
                        .properties()
                        .make_selection("mode", Access::stored(), "", &["plain", "rich"], 0)?;
                    Ok(Arc::new(Notes {
                        text: Arc::new(Mutex::new(String::new())),
                        loaded: Arc::new(Mutex::new(false)),
                    }) as Arc<dyn Behavior>)
                },
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_save_layout() {
        let registry = registry();
        registry.create("notes", "a", None).unwrap();
        registry.create("notes", "b", None).unwrap();
        registry.set_str_str("a", "size", "20").unwrap();
        registry.set_str_str("a", "mode", "rich").unwrap();
        registry.connect("a", "out", "b", "in%").unwrap();

        let state = registry.save();
        assert_eq!(state.read::<String>(".components.a.kind").unwrap(), "notes");
        assert_eq!(state.read::<i64>(".components.a.properties.size").unwrap(), 20);
        assert_eq!(
            state.read::<String>(".components.a.properties.mode").unwrap(),
            "rich"
        );
        assert_eq!(
            state.read::<String>(".components.a.custom.text").unwrap(),
            ""
        );
        assert!(state.get(".connections").unwrap().is_array());
        assert_eq!(
            state.read::<String>(".connections.0.follower_label").unwrap(),
            "in0"
        );
        assert_eq!(
            state.read::<String>(".connections.0.follower_template").unwrap(),
            "in%"
        );
    }

    #[test]
    fn test_round_trip() {
        let registry = registry();
        let a = registry.create("notes", "a", None).unwrap();
        registry.create("notes", "b", None).unwrap();
        registry.set_str_str("b", "size", "33").unwrap();
        a.set_nickname("Alpha");
        a.user_data_graft(".pos.x", Tree::leaf(4));
        registry.connect("a", "out", "b", "in%").unwrap();
        registry.connect("b", "out", "a", "in%").unwrap();

        let state = registry.save();
        registry.reset();
        assert!(registry.is_empty());

        let report = registry.load(&state);
        assert!(report.is_complete(), "{:?}", report);
        assert_eq!(report.created, vec!["a", "b"]);
        assert_eq!(report.connected, 2);
        assert_eq!(registry.get_str_str("b", "size").unwrap(), "33");

        let a = registry.find("a").unwrap();
        assert_eq!(a.nickname(), "Alpha");
        assert_eq!(a.user_data().read::<i64>(".pos.x").unwrap(), 4);
        assert_eq!(a.claw().connections().len(), 1);
    }

    #[test]
    fn test_missing_endpoint_is_skipped() {
        let registry = registry();
        registry.create("notes", "a", None).unwrap();
        registry.create("notes", "b", None).unwrap();
        registry.connect("a", "out", "b", "in%").unwrap();
        let mut state = registry.save();
        registry.reset();

        state.vgraft(".components.a.kind", "gone");
        let report = registry.load(&state);
        assert_eq!(report.created, vec!["b"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.connected, 0);
        assert_eq!(report.skipped_connections.len(), 1);
    }

    #[test]
    fn test_bad_property_is_reported() {
        let registry = registry();
        registry.create("notes", "a", None).unwrap();
        let mut state = registry.save();
        registry.reset();

        state.vgraft(".components.a.properties.size", 500);
        let report = registry.load(&state);
        assert_eq!(report.created, vec!["a"]);
        assert_eq!(report.property_failures.len(), 1);
        assert_eq!(registry.get_str_str("a", "size").unwrap(), "12");
    }

    #[test]
    fn test_load_empty_tree() {
        let registry = registry();
        let report = registry.load(&Tree::new());
        assert!(report.created.is_empty());
        assert!(report.is_complete());
    }
}
