//! Components: the units the registry hosts
//!
//! The framework side of a component is the [`Component`] struct: identity,
//! the information and user-data trees, and the four bags (properties,
//! methods, signals, claw). The kind-specific side is a [`Behavior`]
//! produced by the kind's factory. Factories register properties and
//! methods on the component they are handed, capturing their own state by
//! shared handle.

mod info;
mod lifecycle;

pub use info::InfoTree;
pub use lifecycle::{Entered, Lifecycle};

use crate::claw::{Claw, ConnectionInfo, ConnectionSpec, MetaDuplicatePolicy, Owner, PortDirectory};
use crate::error::{Error, Result};
use crate::method::MethodBag;
use crate::property::PropertyBag;
use crate::signal::{SignalBag, ON_NICKNAMED, ON_USER_DATA_GRAFTED, ON_USER_DATA_PRUNED};
use crate::tree::Tree;
use crate::types::ComponentId;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Kind-specific hooks
///
/// Every hook runs on the calling thread while the component is held
/// alive. Defaults accept everything and save nothing.
pub trait Behavior: Send + Sync {
    /// A follower of this component is about to be connected; false
    /// refuses the connection
    fn on_connect(&self, _connection: &ConnectionInfo) -> bool {
        true
    }

    /// A follower of this component is about to be disconnected; false
    /// refuses, except when the registry forces the disconnect
    fn on_disconnect(&self, _connection: &ConnectionInfo) -> bool {
        true
    }

    /// Custom state to persist with the session
    fn on_saving(&self) -> Tree {
        Tree::new()
    }

    fn on_saved(&self) {}

    /// Custom state restored from a session, before properties are applied
    fn on_loading(&self, _custom: &Tree) -> bool {
        true
    }

    /// Every component and connection of the session has been restored
    fn on_loaded(&self) {}
}

pub(crate) type BehaviorSlot = Arc<RwLock<Option<Arc<dyn Behavior>>>>;

/// A live component
pub struct Component {
    id: ComponentId,
    kind: String,
    name: String,
    nickname: RwLock<String>,
    info: InfoTree,
    user_data: RwLock<Tree>,
    config: Tree,
    lifecycle: Lifecycle,
    properties: PropertyBag,
    methods: MethodBag,
    claw: Claw,
    behavior: BehaviorSlot,
}

/// Everything the registry resolved before construction
pub(crate) struct Config {
    pub id: ComponentId,
    pub kind: String,
    pub name: String,
    pub tree: Tree,
    pub spec: ConnectionSpec,
    pub directory: Weak<dyn PortDirectory>,
    pub meta_duplicates: MetaDuplicatePolicy,
}

impl Component {
    pub(crate) fn new(config: Config) -> Arc<Self> {
        let info = InfoTree::new();
        let lifecycle = Lifecycle::new();
        let behavior: BehaviorSlot = Arc::new(RwLock::new(None));
        let claw = Claw::new(
            Owner {
                id: config.id,
                name: config.name.clone(),
                info: info.clone(),
                lifecycle: lifecycle.clone(),
                behavior: behavior.clone(),
            },
            &config.spec,
            config.directory,
            config.meta_duplicates,
        );
        Arc::new(Self {
            id: config.id,
            kind: config.kind,
            nickname: RwLock::new(config.name.clone()),
            properties: PropertyBag::new(&config.name, info.clone(), lifecycle.clone()),
            methods: MethodBag::new(&config.name, info.clone(), lifecycle.clone()),
            name: config.name,
            info,
            user_data: RwLock::new(Tree::new()),
            config: config.tree,
            lifecycle,
            claw,
            behavior,
        })
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name; defaults to the name
    pub fn nickname(&self) -> String {
        self.nickname.read().clone()
    }

    pub fn set_nickname(&self, nickname: &str) {
        *self.nickname.write() = nickname.to_string();
        let _ = self.signals().emit(ON_NICKNAMED, &Tree::leaf(nickname));
    }

    /// Configuration given at creation: per-kind defaults merged with the
    /// per-call tree
    pub fn config(&self) -> &Tree {
        &self.config
    }

    /// Introspection tree
    pub fn info(&self) -> &InfoTree {
        &self.info
    }

    pub fn tree(&self) -> Tree {
        self.info.snapshot()
    }

    /// Graft into the information tree, announcing `on-tree-grafted`
    pub fn graft_tree(&self, path: &str, subtree: Tree) {
        self.info.graft(path, subtree);
    }

    pub fn prune_tree(&self, path: &str) -> bool {
        self.info.prune(path).is_some()
    }

    pub fn user_data(&self) -> Tree {
        self.user_data.read().clone()
    }

    /// Operator-owned data, persisted with the session
    pub fn user_data_graft(&self, path: &str, subtree: Tree) {
        self.user_data.write().graft(path, subtree);
        let _ = self.signals().emit(ON_USER_DATA_GRAFTED, &Tree::leaf(path));
    }

    pub fn user_data_prune(&self, path: &str) -> bool {
        let pruned = self.user_data.write().prune(path).is_some();
        if pruned {
            let _ = self.signals().emit(ON_USER_DATA_PRUNED, &Tree::leaf(path));
        }
        pruned
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn methods(&self) -> &MethodBag {
        &self.methods
    }

    pub fn signals(&self) -> &SignalBag {
        self.info.signals()
    }

    pub fn claw(&self) -> &Claw {
        &self.claw
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    /// Summary tree: id, kind, name, nickname
    pub fn description(&self) -> Tree {
        let mut tree = Tree::new();
        tree.vgraft("id", self.id.0 as i64);
        tree.vgraft("kind", self.kind.as_str());
        tree.vgraft("name", self.name.as_str());
        tree.vgraft("nickname", self.nickname());
        tree
    }

    pub(crate) fn behavior(&self) -> Option<Arc<dyn Behavior>> {
        self.behavior.read().clone()
    }

    pub(crate) fn set_behavior(&self, behavior: Arc<dyn Behavior>) {
        *self.behavior.write() = Some(behavior);
    }

    /// Run a behavior hook inside the liveness gate
    pub(crate) fn with_behavior<R>(&self, f: impl FnOnce(&dyn Behavior) -> R) -> Result<Option<R>> {
        let behavior = self.behavior();
        let _entered = self
            .lifecycle
            .enter()
            .ok_or_else(|| Error::ShuttingDown(self.name.clone()))?;
        Ok(behavior.map(|b| f(b.as_ref())))
    }

    /// Wait for in-flight callbacks, refuse new ones, then drop every
    /// callback so captured state is released
    pub(crate) fn teardown(&self) {
        self.lifecycle.shut_down();
        self.properties.clear();
        self.methods.clear();
        self.signals().clear_subscribers();
        *self.behavior.write() = None;
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Access;
    use parking_lot::Mutex;

    struct NoDirectory;

    impl PortDirectory for NoDirectory {
        fn writer(
            &self,
            component: ComponentId,
            _writer: crate::types::WriterId,
        ) -> Result<crate::claw::WriterInfo> {
            Err(Error::ComponentNotFound(component.to_string()))
        }

        fn writer_removed(&self, _component: ComponentId, _writer: crate::types::WriterId) {}
    }

    fn component() -> Arc<Component> {
        let directory: Arc<dyn PortDirectory> = Arc::new(NoDirectory);
        Component::new(Config {
            id: ComponentId(1),
            kind: "test".into(),
            name: "c".into(),
            tree: Tree::new(),
            spec: ConnectionSpec::new(),
            directory: Arc::downgrade(&directory),
            meta_duplicates: MetaDuplicatePolicy::Allow,
        })
    }

    #[test]
    fn test_nickname_signal() {
        let c = component();
        assert_eq!(c.nickname(), "c");
        let seen = Arc::new(Mutex::new(String::new()));
        let s = seen.clone();
        c.signals()
            .subscribe_by_name(ON_NICKNAMED, move |t| *s.lock() = t.read::<String>("").unwrap())
            .unwrap();
        c.set_nickname("Front desk");
        assert_eq!(c.nickname(), "Front desk");
        assert_eq!(*seen.lock(), "Front desk");
        assert_eq!(c.description().read::<String>(".nickname").unwrap(), "Front desk");
    }

    #[test]
    fn test_user_data() {
        let c = component();
        let count = Arc::new(Mutex::new(0));
        for signal in [ON_USER_DATA_GRAFTED, ON_USER_DATA_PRUNED] {
            let count = count.clone();
            c.signals()
                .subscribe_by_name(signal, move |_| *count.lock() += 1)
                .unwrap();
        }
        c.user_data_graft(".layout.x", Tree::leaf(10));
        assert_eq!(c.user_data().read::<i64>(".layout.x").unwrap(), 10);
        assert!(c.user_data_prune(".layout"));
        assert!(!c.user_data_prune(".layout"));
        assert_eq!(*count.lock(), 2);
        assert!(!c.tree().exists(".layout"));
    }

    #[test]
    fn test_teardown_releases_callbacks() {
        let c = component();
        let state = Arc::new(());
        let captured = state.clone();
        c.properties()
            .make_bool(
                "flag",
                Access::write(move |_| {
                    let _ = &captured;
                    true
                }),
                "",
                false,
            )
            .unwrap();
        assert_eq!(Arc::strong_count(&state), 2);

        c.teardown();
        assert_eq!(Arc::strong_count(&state), 1);
        assert!(!c.is_alive());
        assert!(matches!(
            c.with_behavior(|b| b.on_saving()),
            Err(Error::ShuttingDown(_))
        ));
    }

    #[test]
    fn test_info_tree_has_connection_spec() {
        let c = component();
        assert!(c.tree().exists(".connection_spec.writer"));
        assert!(c.tree().exists(".signal.on-tree-grafted"));
    }
}
