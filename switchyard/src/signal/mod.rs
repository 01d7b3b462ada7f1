//! Per-component signals
//!
//! A signal is a named event channel. Emitting hands a `Tree` payload to
//! every current subscriber, synchronously and in subscription order, on
//! the emitting thread. There is no queue and no event loop: when `emit`
//! returns, every subscriber has run.
//!
//! The subscriber list is snapshotted before delivery, so a subscriber may
//! subscribe or unsubscribe (itself included) without deadlocking; such
//! changes take effect from the next emit.

use crate::error::{Error, Result};
use crate::tree::Tree;
use crate::types::{SignalId, SubscriptionId};
use parking_lot::RwLock;
use std::sync::Arc;

pub const ON_TREE_GRAFTED: &str = "on-tree-grafted";
pub const ON_TREE_PRUNED: &str = "on-tree-pruned";
pub const ON_CONNECTION_ADDED: &str = "on-connection-added";
pub const ON_CONNECTION_REMOVED: &str = "on-connection-removed";
pub const ON_NICKNAMED: &str = "on-nicknamed";
pub const ON_USER_DATA_GRAFTED: &str = "on-user-data-grafted";
pub const ON_USER_DATA_PRUNED: &str = "on-user-data-pruned";

/// Signals every component carries
const BUILTIN: [(&str, &str); 7] = [
    (ON_TREE_GRAFTED, "A branch was grafted into the information tree"),
    (ON_TREE_PRUNED, "A branch was pruned from the information tree"),
    (ON_CONNECTION_ADDED, "A follower was connected"),
    (ON_CONNECTION_REMOVED, "A follower was disconnected"),
    (ON_NICKNAMED, "The nickname changed"),
    (ON_USER_DATA_GRAFTED, "A branch was grafted into the user data tree"),
    (ON_USER_DATA_PRUNED, "A branch was pruned from the user data tree"),
];

/// Subscriber callback
pub type SignalCallback = Arc<dyn Fn(&Tree) + Send + Sync>;

struct Signal {
    id: SignalId,
    name: String,
    subscribers: Vec<(SubscriptionId, SignalCallback)>,
}

/// Signals of one component
///
/// Cheap to clone; clones share the same channels.
#[derive(Clone)]
pub struct SignalBag {
    inner: Arc<Inner>,
}

struct Inner {
    tree: Arc<RwLock<Tree>>,
    signals: RwLock<Vec<Signal>>,
}

impl SignalBag {
    /// Bag with the built-in signals declared, describing itself under
    /// `.signal` of `tree`
    pub fn new(tree: Arc<RwLock<Tree>>) -> Self {
        let bag = Self {
            inner: Arc::new(Inner {
                tree,
                signals: RwLock::new(Vec::new()),
            }),
        };
        for (name, description) in BUILTIN {
            let _ = bag.make(name, description);
        }
        bag
    }

    /// Declare a signal
    pub fn make(&self, name: &str, description: &str) -> Result<SignalId> {
        let mut signals = self.inner.signals.write();
        if signals.iter().any(|s| s.name == name) {
            return Err(Error::AlreadyRegistered(format!("signal {}", name)));
        }
        let id = SignalId::next();
        signals.push(Signal {
            id,
            name: name.to_string(),
            subscribers: Vec::new(),
        });
        drop(signals);

        let mut desc = Tree::new();
        desc.vgraft("id", id.0 as i64);
        desc.vgraft("description", description);
        self.inner
            .tree
            .write()
            .graft(&format!(".signal.{}", name), desc);
        Ok(id)
    }

    pub fn get_id(&self, name: &str) -> Option<SignalId> {
        self.inner
            .signals
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
    }

    /// Declared signal names, in declaration order
    pub fn names(&self) -> Vec<String> {
        self.inner
            .signals
            .read()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Subscribe to a signal by name; `None` if the name is unknown
    pub fn subscribe_by_name<F>(&self, name: &str, callback: F) -> Option<SubscriptionId>
    where
        F: Fn(&Tree) + Send + Sync + 'static,
    {
        let mut signals = self.inner.signals.write();
        let signal = signals.iter_mut().find(|s| s.name == name)?;
        let token = SubscriptionId::new();
        signal.subscribers.push((token, Arc::new(callback)));
        Some(token)
    }

    pub fn subscribe<F>(&self, id: SignalId, callback: F) -> Option<SubscriptionId>
    where
        F: Fn(&Tree) + Send + Sync + 'static,
    {
        let mut signals = self.inner.signals.write();
        let signal = signals.iter_mut().find(|s| s.id == id)?;
        let token = SubscriptionId::new();
        signal.subscribers.push((token, Arc::new(callback)));
        Some(token)
    }

    /// Remove a subscription; false when the token is unknown or already
    /// removed
    pub fn unsubscribe(&self, token: SubscriptionId) -> bool {
        let mut signals = self.inner.signals.write();
        for signal in signals.iter_mut() {
            if let Some(pos) = signal.subscribers.iter().position(|(t, _)| *t == token) {
                signal.subscribers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `payload` to every current subscriber
    pub fn emit(&self, name: &str, payload: &Tree) -> Result<()> {
        let subscribers: Vec<SignalCallback> = {
            let signals = self.inner.signals.read();
            let signal = signals
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| Error::SignalNotFound(name.to_string()))?;
            signal.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in subscribers {
            callback(payload);
        }
        Ok(())
    }

    /// Undeclare a signal, dropping its subscribers
    pub fn remove(&self, name: &str) -> bool {
        let mut signals = self.inner.signals.write();
        let Some(pos) = signals.iter().position(|s| s.name == name) else {
            return false;
        };
        signals.remove(pos);
        drop(signals);
        self.inner.tree.write().prune(&format!(".signal.{}", name));
        true
    }

    /// Drop every subscriber of every signal
    pub(crate) fn clear_subscribers(&self) {
        for signal in self.inner.signals.write().iter_mut() {
            signal.subscribers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn bag() -> SignalBag {
        SignalBag::new(Arc::new(RwLock::new(Tree::new())))
    }

    #[test]
    fn test_builtin_signals_declared() {
        let bag = bag();
        let names = bag.names();
        assert!(names.contains(&ON_CONNECTION_ADDED.to_string()));
        assert!(names.contains(&ON_NICKNAMED.to_string()));
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bag = bag();
        bag.make("on-tick", "Tick").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bag.subscribe_by_name("on-tick", move |payload| {
                seen.lock()
                    .push(format!("{}:{}", tag, payload.read::<i64>("").unwrap()));
            })
            .unwrap();
        }

        bag.emit("on-tick", &Tree::leaf(3)).unwrap();
        assert_eq!(*seen.lock(), vec!["first:3", "second:3", "third:3"]);
    }

    #[test]
    fn test_unknown_signal() {
        let bag = bag();
        assert!(bag.subscribe_by_name("nope", |_| {}).is_none());
        assert!(matches!(
            bag.emit("nope", &Tree::new()),
            Err(Error::SignalNotFound(_))
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bag = bag();
        assert!(bag.emit(ON_TREE_GRAFTED, &Tree::new()).is_ok());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bag = bag();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let token = bag
            .subscribe_by_name(ON_TREE_PRUNED, move |_| *h.lock() += 1)
            .unwrap();
        assert_ne!(token.0, 0);

        bag.emit(ON_TREE_PRUNED, &Tree::new()).unwrap();
        assert!(bag.unsubscribe(token));
        assert!(!bag.unsubscribe(token));
        bag.emit(ON_TREE_PRUNED, &Tree::new()).unwrap();
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself() {
        let bag = bag();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let inner_bag = bag.clone();
        let inner_slot = slot.clone();
        let token = bag
            .subscribe_by_name(ON_NICKNAMED, move |_| {
                if let Some(token) = *inner_slot.lock() {
                    inner_bag.unsubscribe(token);
                }
            })
            .unwrap();
        *slot.lock() = Some(token);

        bag.emit(ON_NICKNAMED, &Tree::new()).unwrap();
        assert!(!bag.unsubscribe(token));
    }

    #[test]
    fn test_duplicate_make_fails() {
        let bag = bag();
        bag.make("on-x", "").unwrap();
        assert!(matches!(
            bag.make("on-x", ""),
            Err(Error::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_declarations_land_in_tree() {
        let tree = Arc::new(RwLock::new(Tree::new()));
        let bag = SignalBag::new(tree.clone());
        bag.make("on-said", "Said something").unwrap();
        assert_eq!(
            tree.read().read::<String>(".signal.on-said.description").unwrap(),
            "Said something"
        );
    }
}
