//! The component registry
//!
//! The registry owns every live component. It maps kinds to factories,
//! issues ids, keeps names unique among live components and orchestrates
//! creation, removal and whole-session save/restore.
//!
//! Creation and removal are serialized as a whole, so two threads racing
//! to create the same name see exactly one success. The lock is
//! reentrant: a factory or hook may create or remove other components.
//! Lookups only take a read lock on the index.

mod config;
mod state;

pub use config::{ConfigError, RegistryConfig};
pub use state::LoadReport;

use crate::claw::{ConnectionSpec, PortDirectory, WriterInfo};
use crate::component::{Behavior, Component, Config};
use crate::error::{Error, Result};
use crate::tree::{Tree, Value, SEPARATOR};
use crate::types::{ComponentId, FollowerId, IdCounter, SubscriptionId, WriterId};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Builds the behavior of a new component
///
/// The factory receives the framework side of the component and registers
/// its properties, methods and signals there. An `Err` aborts creation;
/// use [`Error::ResourceUnavailable`] for missing external dependencies.
pub type Factory = Arc<dyn Fn(&Arc<Component>) -> Result<Arc<dyn Behavior>> + Send + Sync>;

type CreatedObserver = Arc<dyn Fn(&Qrox) + Send + Sync>;
type RemovedObserver = Arc<dyn Fn(ComponentId, &str) + Send + Sync>;

/// Documentation of a kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindDoc {
    pub kind: String,
    pub long_name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub description: String,
    pub license: String,
    pub author: String,
}

impl KindDoc {
    pub fn new(kind: &str, long_name: &str, category: &str, description: &str) -> Self {
        Self {
            kind: kind.to_string(),
            long_name: long_name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            license: "MIT".to_string(),
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    fn to_tree(&self) -> Tree {
        serde_json::to_value(self)
            .ok()
            .and_then(|json| Tree::try_from(json).ok())
            .unwrap_or_default()
    }
}

struct KindEntry {
    doc: KindDoc,
    spec: ConnectionSpec,
    factory: Factory,
}

/// Handle on a live component
///
/// Dereferences to the [`Component`]. Holding a handle does not keep the
/// component registered: once removed, its calls fail with
/// `ShuttingDown`.
#[derive(Clone, Debug)]
pub struct Qrox {
    component: Arc<Component>,
}

impl Qrox {
    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }
}

impl Deref for Qrox {
    type Target = Component;

    fn deref(&self) -> &Component {
        &self.component
    }
}

#[derive(Default)]
struct Index {
    by_id: BTreeMap<ComponentId, Arc<Component>>,
    by_name: HashMap<String, ComponentId>,
}

pub(crate) struct Shared {
    config: RegistryConfig,
    kinds: RwLock<BTreeMap<String, Arc<KindEntry>>>,
    lifecycle: ReentrantMutex<()>,
    index: RwLock<Index>,
    ids: IdCounter,
    name_counters: Mutex<HashMap<String, u64>>,
    created: Mutex<Vec<(SubscriptionId, CreatedObserver)>>,
    removed: Mutex<Vec<(SubscriptionId, RemovedObserver)>>,
}

impl Shared {
    fn get(&self, id: ComponentId) -> Option<Arc<Component>> {
        self.index.read().by_id.get(&id).cloned()
    }

    fn all(&self) -> Vec<Arc<Component>> {
        self.index.read().by_id.values().cloned().collect()
    }

    /// Force-disconnect every connection fed by `writer` (any writer of
    /// `component` when `None`)
    fn disconnect_writer(&self, component: ComponentId, writer: Option<WriterId>) {
        for follower in self.all() {
            for connection in follower.claw().connections() {
                let feeds = connection.writer_component == component
                    && writer.map_or(true, |w| w == connection.writer_id);
                if feeds {
                    if let Err(e) = follower.claw().force_disconnect(connection.follower_id) {
                        tracing::warn!(
                            follower = %follower.name(),
                            error = %e,
                            "forced disconnect failed"
                        );
                    }
                }
            }
        }
    }
}

impl PortDirectory for Shared {
    fn writer(&self, component: ComponentId, writer: WriterId) -> Result<WriterInfo> {
        self.get(component)
            .ok_or_else(|| Error::ComponentNotFound(component.to_string()))?
            .claw()
            .writer_info(writer)
    }

    fn writer_removed(&self, component: ComponentId, writer: WriterId) {
        self.disconnect_writer(component, Some(writer));
    }
}

/// Catalog of kinds and live components
///
/// Cheap to clone; clones share the same components.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                kinds: RwLock::new(BTreeMap::new()),
                lifecycle: ReentrantMutex::new(()),
                index: RwLock::new(Index::default()),
                ids: IdCounter::default(),
                name_counters: Mutex::new(HashMap::new()),
                created: Mutex::new(Vec::new()),
                removed: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registry with the built-in kinds registered
    pub fn with_builtins(config: RegistryConfig) -> Result<Self> {
        let registry = Self::new(config);
        crate::builtin::register_all(&registry)?;
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Register a kind
    pub fn register_kind<F>(&self, doc: KindDoc, spec: ConnectionSpec, factory: F) -> Result<()>
    where
        F: Fn(&Arc<Component>) -> Result<Arc<dyn Behavior>> + Send + Sync + 'static,
    {
        if doc.kind.is_empty() || doc.kind.contains(SEPARATOR) {
            return Err(Error::parse("kind", format!("'{}' is not a valid kind", doc.kind)));
        }
        spec.validate()?;
        let mut kinds = self.shared.kinds.write();
        if kinds.contains_key(&doc.kind) {
            return Err(Error::AlreadyRegistered(format!("kind {}", doc.kind)));
        }
        tracing::debug!(kind = %doc.kind, "kind registered");
        kinds.insert(
            doc.kind.clone(),
            Arc::new(KindEntry {
                doc,
                spec,
                factory: Arc::new(factory),
            }),
        );
        Ok(())
    }

    pub fn kinds(&self) -> Vec<String> {
        self.shared.kinds.read().keys().cloned().collect()
    }

    pub fn kind_doc(&self, kind: &str) -> Option<KindDoc> {
        self.shared.kinds.read().get(kind).map(|k| k.doc.clone())
    }

    pub fn kind_spec(&self, kind: &str) -> Option<ConnectionSpec> {
        self.shared.kinds.read().get(kind).map(|k| k.spec.clone())
    }

    /// Documentation of every kind, keyed by kind
    pub fn kinds_doc(&self) -> Tree {
        let mut tree = Tree::new();
        for (kind, entry) in self.shared.kinds.read().iter() {
            let mut doc = entry.doc.to_tree();
            doc.graft("connection_spec", entry.spec.to_tree());
            tree.graft(kind, doc);
        }
        tree
    }

    /// Create a component
    ///
    /// An empty `name` asks for a generated one (`<kind><counter>`).
    /// `config` is merged over the kind's configuration from
    /// [`RegistryConfig::kinds`].
    pub fn create(&self, kind: &str, name: &str, config: Option<&Tree>) -> Result<Qrox> {
        let _serial = self.shared.lifecycle.lock();

        let entry = self
            .shared
            .kinds
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;

        let name = if name.is_empty() {
            self.generate_name(kind)
        } else {
            if name.contains(SEPARATOR) {
                return Err(Error::parse(
                    "component name",
                    format!("'{}' contains '{}'", name, SEPARATOR),
                ));
            }
            if self.shared.index.read().by_name.contains_key(name) {
                return Err(Error::NameInUse(name.to_string()));
            }
            name.to_string()
        };

        let mut tree = self.shared.config.kind_config(kind);
        if let Some(config) = config {
            tree.merge("", config);
        }

        let directory: Weak<Shared> = Arc::downgrade(&self.shared);
        let component = Component::new(Config {
            id: ComponentId(self.shared.ids.next()),
            kind: kind.to_string(),
            name: name.clone(),
            tree,
            spec: entry.spec.clone(),
            directory,
            meta_duplicates: self.shared.config.meta_duplicates,
        });

        match (entry.factory)(&component) {
            Ok(behavior) => component.set_behavior(behavior),
            Err(e) => {
                tracing::warn!(kind, name = %name, error = %e, "component construction failed");
                component.teardown();
                return Err(e);
            }
        }

        {
            let mut index = self.shared.index.write();
            index.by_name.insert(name.clone(), component.id());
            index.by_id.insert(component.id(), component.clone());
        }
        tracing::debug!(kind, name = %name, id = %component.id(), "component created");

        let qrox = Qrox { component };
        let observers: Vec<CreatedObserver> = self
            .shared
            .created
            .lock()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            observer(&qrox);
        }
        Ok(qrox)
    }

    fn generate_name(&self, kind: &str) -> String {
        let mut counters = self.shared.name_counters.lock();
        let counter = counters
            .entry(kind.to_string())
            .or_insert(self.shared.config.name_counter_start);
        let index = self.shared.index.read();
        loop {
            let candidate = format!("{}{}", kind, counter);
            *counter += 1;
            if !index.by_name.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Resolve a name, then an id (`q:N` or `N`)
    fn resolve(&self, name_or_id: &str) -> Option<Arc<Component>> {
        let index = self.shared.index.read();
        let id = index.by_name.get(name_or_id).copied().or_else(|| {
            name_or_id
                .strip_prefix("q:")
                .unwrap_or(name_or_id)
                .parse::<u64>()
                .ok()
                .map(ComponentId)
        })?;
        index.by_id.get(&id).cloned()
    }

    /// Remove a component
    ///
    /// Every connection it takes part in, as follower or as writer, is
    /// force-disconnected first. Returns once in-flight callbacks into the
    /// component have finished. The wait happens after the component has
    /// left the registry, so those callbacks may still create or remove
    /// other components.
    pub fn remove(&self, name_or_id: &str) -> Result<()> {
        let component = {
            let _serial = self.shared.lifecycle.lock();
            let component = self
                .resolve(name_or_id)
                .ok_or_else(|| Error::ComponentNotFound(name_or_id.to_string()))?;
            self.unregister(&component);
            component
        };
        self.retire(&component);
        Ok(())
    }

    pub fn remove_id(&self, id: ComponentId) -> Result<()> {
        self.remove(&id.to_string())
    }

    /// Cut every connection of `component` and drop it from the index
    fn unregister(&self, component: &Arc<Component>) {
        for connection in component.claw().connections() {
            if let Err(e) = component.claw().force_disconnect(connection.follower_id) {
                tracing::warn!(component = %component.name(), error = %e, "forced disconnect failed");
            }
        }
        self.shared.disconnect_writer(component.id(), None);

        let mut index = self.shared.index.write();
        index.by_id.remove(&component.id());
        index.by_name.remove(component.name());
    }

    /// Wait out in-flight callbacks, release the bags and notify observers
    ///
    /// Must run without the registry lock held.
    fn retire(&self, component: &Arc<Component>) {
        component.teardown();
        tracing::debug!(name = %component.name(), id = %component.id(), "component removed");

        let observers: Vec<RemovedObserver> = self
            .shared
            .removed
            .lock()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            observer(component.id(), component.name());
        }
    }

    /// Remove every live component, newest first
    pub fn reset(&self) {
        let removed: Vec<Arc<Component>> = {
            let _serial = self.shared.lifecycle.lock();
            let all: Vec<_> = self.shared.all().into_iter().rev().collect();
            for component in &all {
                self.unregister(component);
            }
            all
        };
        for component in &removed {
            self.retire(component);
        }
    }

    /// Live ids in creation order
    pub fn get_ids(&self) -> Vec<ComponentId> {
        self.shared.index.read().by_id.keys().copied().collect()
    }

    pub fn get_id(&self, name: &str) -> Option<ComponentId> {
        self.shared.index.read().by_name.get(name).copied()
    }

    pub fn get_name(&self, id: ComponentId) -> Option<String> {
        self.shared.get(id).map(|c| c.name().to_string())
    }

    pub fn get_qrox(&self, id: ComponentId) -> Option<Qrox> {
        self.shared.get(id).map(|component| Qrox { component })
    }

    /// Look up by name or id text
    pub fn find(&self, name_or_id: &str) -> Option<Qrox> {
        self.resolve(name_or_id).map(|component| Qrox { component })
    }

    /// Live names in creation order
    pub fn names(&self) -> Vec<String> {
        self.shared
            .index
            .read()
            .by_id
            .values()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.index.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptions of every live component, keyed by name
    pub fn description(&self) -> Tree {
        let mut tree = Tree::new();
        for component in self.shared.all() {
            tree.graft(component.name(), component.description());
        }
        tree
    }

    /// Information trees of every live component, keyed by name
    pub fn tree(&self) -> Tree {
        let mut tree = Tree::new();
        for component in self.shared.all() {
            tree.graft(component.name(), component.tree());
        }
        tree
    }

    fn require(&self, name_or_id: &str) -> Result<Arc<Component>> {
        self.resolve(name_or_id)
            .ok_or_else(|| Error::ComponentNotFound(name_or_id.to_string()))
    }

    pub fn set_str_str(&self, component: &str, property: &str, value: &str) -> Result<()> {
        self.require(component)?.properties().set_str_str(property, value)
    }

    pub fn get_str_str(&self, component: &str, property: &str) -> Result<String> {
        self.require(component)?.properties().get_str_str(property)
    }

    pub fn invoke_str(&self, component: &str, method: &str, args: &str) -> Result<Value> {
        self.require(component)?.methods().invoke_str(method, args)
    }

    /// Connect by labels: `writer_component.writer` feeds
    /// `follower_component.follower`
    pub fn connect(
        &self,
        writer_component: &str,
        writer: &str,
        follower_component: &str,
        follower: &str,
    ) -> Result<FollowerId> {
        let source = self.require(writer_component)?;
        let sink = self.require(follower_component)?;
        let writer_id = source
            .claw()
            .get_swid(writer)
            .ok_or_else(|| Error::PortNotFound(format!("{}.{}", source.name(), writer)))?;
        sink.claw().connect_label(follower, source.id(), writer_id)
    }

    pub fn disconnect(&self, follower_component: &str, follower: FollowerId) -> Result<()> {
        self.require(follower_component)?.claw().disconnect(follower)
    }

    pub fn on_created<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Qrox) + Send + Sync + 'static,
    {
        let token = SubscriptionId::new();
        self.shared.created.lock().push((token, Arc::new(observer)));
        token
    }

    pub fn on_removed<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(ComponentId, &str) + Send + Sync + 'static,
    {
        let token = SubscriptionId::new();
        self.shared.removed.lock().push((token, Arc::new(observer)));
        token
    }

    pub fn unsubscribe_created(&self, token: SubscriptionId) -> bool {
        let mut observers = self.shared.created.lock();
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        observers.len() != before
    }

    pub fn unsubscribe_removed(&self, token: SubscriptionId) -> bool {
        let mut observers = self.shared.removed.lock();
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        observers.len() != before
    }
}
