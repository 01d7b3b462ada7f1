//! Per-component typed, observable properties
//!
//! Each property has a native type ([`PropertyKind`]) but is always
//! reachable through strings: [`PropertyBag::set_str_str`] parses with the
//! kind's codec, [`PropertyBag::get_str_str`] formats. This is what
//! scripting front-ends and session persistence use.
//!
//! Mutations are serialized per property, never bag-wide: two threads
//! setting different properties do not contend. A successful set runs, in
//! order and while holding that property's lock:
//!
//! 1. the component setter (skipped for disabled properties, which fail)
//! 2. the bag's shadow copy update
//! 3. subscriber notification, synchronous on the calling thread
//! 4. the graft of the new value under `.property.<name>.value`
//!
//! A subscriber must not set the property it is notified for.

mod kind;

pub use kind::PropertyKind;

use crate::component::{InfoTree, Lifecycle};
use crate::error::{Error, Result};
use crate::tree::{Tree, Value};
use crate::types::{PropertyId, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Component-supplied setter; returning false rejects the value
pub type Setter<T> = Box<dyn Fn(T) -> bool + Send + Sync>;

/// Component-supplied getter
pub type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Subscriber callback, given the new value
pub type PropertyCallback = Arc<dyn Fn(&Value) + Send + Sync>;

type ErasedSetter = Box<dyn Fn(&Value) -> bool + Send + Sync>;
type ErasedGetter = Box<dyn Fn() -> Option<Value> + Send + Sync>;

/// How a property is read and written
///
/// Without a setter the property is read-only. Without a getter reads
/// come from the bag's shadow copy of the last accepted value.
pub struct Access<T> {
    setter: Option<Setter<T>>,
    getter: Option<Getter<T>>,
}

impl<T: 'static> Access<T> {
    pub fn read_only() -> Self {
        Self {
            setter: None,
            getter: None,
        }
    }

    /// Writable property whose setter may refuse values
    pub fn write<F>(setter: F) -> Self
    where
        F: Fn(T) -> bool + Send + Sync + 'static,
    {
        Self {
            setter: Some(Box::new(setter)),
            getter: None,
        }
    }

    /// Writable property held entirely by the bag
    pub fn stored() -> Self {
        Self::write(|_| true)
    }

    pub fn with_getter<G>(mut self, getter: G) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
    {
        self.getter = Some(Box::new(getter));
        self
    }

    fn erase<D, E>(self, decode: D, encode: E) -> (Option<ErasedSetter>, Option<ErasedGetter>)
    where
        D: Fn(&Value) -> Option<T> + Send + Sync + 'static,
        E: Fn(T) -> Option<Value> + Send + Sync + 'static,
    {
        let setter = self.setter.map(|set| {
            Box::new(move |value: &Value| decode(value).map_or(false, |v| set(v))) as ErasedSetter
        });
        let getter = self
            .getter
            .map(|get| Box::new(move || encode(get())) as ErasedGetter);
        (setter, getter)
    }
}

struct Entry {
    id: PropertyId,
    name: String,
    description: String,
    kind: PropertyKind,
    setter: Option<ErasedSetter>,
    getter: Option<ErasedGetter>,
    parent: RwLock<Option<String>>,
    enabled: AtomicBool,
    saved: AtomicBool,
    shadow: Mutex<Option<Value>>,
    mutation: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, PropertyCallback)>>,
}

impl Entry {
    fn tree_path(&self) -> String {
        format!(".property.{}", self.name)
    }

    fn describe(&self, value: Option<&Value>) -> Tree {
        let mut tree = Tree::new();
        tree.vgraft("id", self.id.0 as i64);
        tree.vgraft("description", self.description.as_str());
        tree.vgraft("type", self.kind.type_name());
        tree.vgraft("writable", self.setter.is_some());
        tree.vgraft("enabled", self.enabled.load(Ordering::SeqCst));
        if let Some(parent) = self.parent.read().as_deref() {
            tree.vgraft("parent", parent);
        }
        self.kind.describe(&mut tree);
        if let Some(value) = value {
            tree.vgraft("value", self.kind.tree_value(value));
        }
        tree
    }
}

#[derive(Default)]
struct Index {
    by_id: BTreeMap<PropertyId, Arc<Entry>>,
    by_name: HashMap<String, PropertyId>,
}

/// Properties of one component
///
/// Cheap to clone; clones share the same properties.
#[derive(Clone)]
pub struct PropertyBag {
    inner: Arc<Inner>,
}

struct Inner {
    owner: String,
    info: InfoTree,
    lifecycle: Lifecycle,
    index: RwLock<Index>,
}

impl PropertyBag {
    pub fn new(owner: &str, info: InfoTree, lifecycle: Lifecycle) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner: owner.to_string(),
                info,
                lifecycle,
                index: RwLock::new(Index::default()),
            }),
        }
    }

    fn register(
        &self,
        name: &str,
        description: &str,
        kind: PropertyKind,
        (setter, getter): (Option<ErasedSetter>, Option<ErasedGetter>),
        default: Option<Value>,
        parent: Option<&str>,
    ) -> Result<PropertyId> {
        if name.is_empty() || name.contains(crate::tree::SEPARATOR) {
            return Err(Error::parse("property name", format!("'{}' is not a valid name", name)));
        }
        if let Some(value) = &default {
            kind.check(name, value)?;
        }

        let mut index = self.inner.index.write();
        if index.by_name.contains_key(name) {
            return Err(Error::AlreadyRegistered(format!("property {}", name)));
        }
        if let Some(parent) = parent {
            let is_group = index
                .by_name
                .get(parent)
                .and_then(|id| index.by_id.get(id))
                .map_or(false, |e| e.kind == PropertyKind::Group);
            if !is_group {
                return Err(Error::PropertyNotFound(format!("group {}", parent)));
            }
        }

        let entry = Arc::new(Entry {
            id: PropertyId::next(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            setter,
            getter,
            parent: RwLock::new(parent.map(str::to_string)),
            enabled: AtomicBool::new(true),
            saved: AtomicBool::new(true),
            shadow: Mutex::new(default),
            mutation: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        });
        index.by_name.insert(name.to_string(), entry.id);
        index.by_id.insert(entry.id, entry.clone());
        drop(index);

        let value = self.current(&entry);
        self.inner
            .info
            .graft(&entry.tree_path(), entry.describe(value.as_ref()));
        tracing::trace!(owner = %self.inner.owner, property = %entry.name, "property registered");
        Ok(entry.id)
    }

    pub fn make_bool(
        &self,
        name: &str,
        access: Access<bool>,
        description: &str,
        default: bool,
    ) -> Result<PropertyId> {
        let erased = access.erase(Value::as_bool, |v| Some(Value::Bool(v)));
        self.register(name, description, PropertyKind::Bool, erased, Some(default.into()), None)
    }

    pub fn make_int(
        &self,
        name: &str,
        access: Access<i64>,
        description: &str,
        default: i64,
        min: i64,
        max: i64,
    ) -> Result<PropertyId> {
        let erased = access.erase(Value::as_int, |v| Some(Value::Int(v)));
        self.register(
            name,
            description,
            PropertyKind::Int { min, max },
            erased,
            Some(default.into()),
            None,
        )
    }

    pub fn make_double(
        &self,
        name: &str,
        access: Access<f64>,
        description: &str,
        default: f64,
        min: f64,
        max: f64,
    ) -> Result<PropertyId> {
        let erased = access.erase(Value::as_double, |v| Some(Value::Double(v)));
        self.register(
            name,
            description,
            PropertyKind::Double { min, max },
            erased,
            Some(default.into()),
            None,
        )
    }

    pub fn make_str(
        &self,
        name: &str,
        access: Access<String>,
        description: &str,
        default: &str,
    ) -> Result<PropertyId> {
        let erased = access.erase(
            |v| v.as_str().map(str::to_string),
            |v| Some(Value::Str(v)),
        );
        self.register(name, description, PropertyKind::Str, erased, Some(default.into()), None)
    }

    /// Selection among labels; the setter and getter deal in option index
    pub fn make_selection(
        &self,
        name: &str,
        access: Access<usize>,
        description: &str,
        options: &[&str],
        default: usize,
    ) -> Result<PropertyId> {
        let count = options.len();
        let erased = access.erase(
            |v| v.as_int().and_then(|i| usize::try_from(i).ok()),
            move |i| (i < count).then(|| Value::Int(i as i64)),
        );
        let kind = PropertyKind::Selection {
            options: options.iter().map(|s| s.to_string()).collect(),
        };
        self.register(name, description, kind, erased, Some(Value::Int(default as i64)), None)
    }

    /// Enumeration of labels with attached values; the setter and getter
    /// deal in the attached value
    pub fn make_enumeration(
        &self,
        name: &str,
        access: Access<i64>,
        description: &str,
        options: &[(&str, i64)],
        default: usize,
    ) -> Result<PropertyId> {
        let kind = PropertyKind::Enumeration {
            options: options.iter().map(|(l, v)| (l.to_string(), *v)).collect(),
        };
        let to_attached = kind.clone();
        let from_attached = kind.clone();
        let erased = access.erase(
            move |v| v.as_int().and_then(|i| to_attached.attached(i)),
            move |attached| from_attached.index_of_attached(attached).map(Value::Int),
        );
        self.register(name, description, kind, erased, Some(Value::Int(default as i64)), None)
    }

    /// Presentational group other properties can be nested under
    pub fn make_group(&self, name: &str, description: &str) -> Result<PropertyId> {
        self.register(
            name,
            description,
            PropertyKind::Group,
            (None, None),
            None,
            None,
        )
    }

    pub fn make_parented_group(
        &self,
        name: &str,
        parent: &str,
        description: &str,
    ) -> Result<PropertyId> {
        self.register(
            name,
            description,
            PropertyKind::Group,
            (None, None),
            None,
            Some(parent),
        )
    }

    /// Move a property under a group
    pub fn set_parent(&self, name: &str, group: &str) -> Result<()> {
        let entry = self.resolve(name)?;
        let group_entry = self.resolve(group)?;
        if group_entry.kind != PropertyKind::Group {
            return Err(Error::PropertyNotFound(format!("group {}", group)));
        }
        *entry.parent.write() = Some(group_entry.name.clone());
        self.inner
            .info
            .graft(&format!("{}.parent", entry.tree_path()), Tree::leaf(group));
        Ok(())
    }

    /// Look a property up by name, then by id (`prop:N` or `N`)
    fn resolve(&self, key: &str) -> Result<Arc<Entry>> {
        let index = self.inner.index.read();
        let id = index.by_name.get(key).copied().or_else(|| {
            key.strip_prefix("prop:")
                .unwrap_or(key)
                .parse::<u64>()
                .ok()
                .map(PropertyId)
        });
        id.and_then(|id| index.by_id.get(&id).cloned())
            .ok_or_else(|| Error::PropertyNotFound(key.to_string()))
    }

    fn entry(&self, id: PropertyId) -> Result<Arc<Entry>> {
        self.inner
            .index
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::PropertyNotFound(id.to_string()))
    }

    fn current(&self, entry: &Entry) -> Option<Value> {
        if let Some(getter) = &entry.getter {
            if let Some(_entered) = self.inner.lifecycle.enter() {
                if let Some(value) = getter() {
                    return Some(value);
                }
            }
        }
        entry.shadow.lock().clone()
    }

    pub fn get_id(&self, name: &str) -> Option<PropertyId> {
        self.inner.index.read().by_name.get(name).copied()
    }

    pub fn get_name(&self, id: PropertyId) -> Option<String> {
        self.entry(id).ok().map(|e| e.name.clone())
    }

    /// Property names in registration order
    pub fn names(&self) -> Vec<String> {
        self.inner
            .index
            .read()
            .by_id
            .values()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn kind(&self, name_or_id: &str) -> Result<PropertyKind> {
        Ok(self.resolve(name_or_id)?.kind.clone())
    }

    /// Set from a string, parsed per the property's native type
    pub fn set_str_str(&self, name_or_id: &str, value: &str) -> Result<()> {
        let entry = self.resolve(name_or_id)?;
        let parsed = entry.kind.parse(&entry.name, value)?;
        self.apply(&entry, parsed)
    }

    pub fn set_str(&self, id: PropertyId, value: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let parsed = entry.kind.parse(&entry.name, value)?;
        self.apply(&entry, parsed)
    }

    /// Set from a native value
    ///
    /// Choice kinds take the option index.
    pub fn set_value(&self, name_or_id: &str, value: impl Into<Value>) -> Result<()> {
        let entry = self.resolve(name_or_id)?;
        self.apply(&entry, value.into())
    }

    fn apply(&self, entry: &Entry, value: Value) -> Result<()> {
        let _serial = entry.mutation.lock();
        if entry.kind == PropertyKind::Group {
            return Err(Error::ReadOnly(entry.name.clone()));
        }
        if !entry.enabled.load(Ordering::SeqCst) {
            return Err(Error::Disabled(format!("property {}", entry.name)));
        }
        let setter = entry
            .setter
            .as_ref()
            .ok_or_else(|| Error::ReadOnly(entry.name.clone()))?;
        entry.kind.check(&entry.name, &value)?;

        let accepted = {
            let _entered = self
                .inner
                .lifecycle
                .enter()
                .ok_or_else(|| Error::ShuttingDown(self.inner.owner.clone()))?;
            setter(&value)
        };
        if !accepted {
            return Err(Error::Rejected(format!(
                "{} refused {} = {}",
                self.inner.owner,
                entry.name,
                entry.kind.format(&value)
            )));
        }

        *entry.shadow.lock() = Some(value.clone());
        self.publish(entry, &value);
        Ok(())
    }

    fn publish(&self, entry: &Entry, value: &Value) {
        let subscribers: Vec<PropertyCallback> = entry
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in subscribers {
            callback(value);
        }
        self.inner.info.graft(
            &format!("{}.value", entry.tree_path()),
            Tree::leaf(entry.kind.tree_value(value)),
        );
    }

    /// Announce a value the component changed on its own
    ///
    /// Re-reads the getter (or takes `value` for getter-less properties),
    /// then notifies subscribers and the tree as a set would. Works for
    /// read-only properties.
    pub fn notify(&self, name_or_id: &str, value: Option<Value>) -> Result<()> {
        let entry = self.resolve(name_or_id)?;
        let _serial = entry.mutation.lock();
        let value = match value {
            Some(v) => {
                entry.kind.check(&entry.name, &v)?;
                v
            }
            None => self
                .current(&entry)
                .ok_or_else(|| Error::ReadOnly(entry.name.clone()))?,
        };
        *entry.shadow.lock() = Some(value.clone());
        self.publish(&entry, &value);
        Ok(())
    }

    /// String form of the current value; works whether enabled or not
    pub fn get_str_str(&self, name_or_id: &str) -> Result<String> {
        let entry = self.resolve(name_or_id)?;
        let value = self
            .current(&entry)
            .ok_or_else(|| Error::TypeMismatch {
                name: entry.name.clone(),
                expected: "a value-carrying property".to_string(),
                found: "group".to_string(),
            })?;
        Ok(entry.kind.format(&value))
    }

    pub fn get_value(&self, name_or_id: &str) -> Result<Value> {
        let entry = self.resolve(name_or_id)?;
        self.current(&entry)
            .ok_or_else(|| Error::ReadOnly(entry.name.clone()))
    }

    pub fn subscribe<F>(&self, name_or_id: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let entry = self.resolve(name_or_id)?;
        let token = SubscriptionId::new();
        entry.subscribers.lock().push((token, Arc::new(callback)));
        Ok(token)
    }

    /// False when the token is unknown in this bag
    pub fn unsubscribe(&self, token: SubscriptionId) -> bool {
        let index = self.inner.index.read();
        for entry in index.by_id.values() {
            let mut subscribers = entry.subscribers.lock();
            if let Some(pos) = subscribers.iter().position(|(t, _)| *t == token) {
                subscribers.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn enable(&self, name_or_id: &str) -> Result<()> {
        self.set_enabled(name_or_id, true)
    }

    /// Refuse sets until enabled again; reads keep working
    pub fn disable(&self, name_or_id: &str) -> Result<()> {
        self.set_enabled(name_or_id, false)
    }

    fn set_enabled(&self, name_or_id: &str, enabled: bool) -> Result<()> {
        let entry = self.resolve(name_or_id)?;
        entry.enabled.store(enabled, Ordering::SeqCst);
        self.inner.info.graft(
            &format!("{}.enabled", entry.tree_path()),
            Tree::leaf(enabled),
        );
        Ok(())
    }

    pub fn is_enabled(&self, name_or_id: &str) -> Result<bool> {
        Ok(self.resolve(name_or_id)?.enabled.load(Ordering::SeqCst))
    }

    pub fn is_writable(&self, name_or_id: &str) -> Result<bool> {
        Ok(self.resolve(name_or_id)?.setter.is_some())
    }

    /// Include or exclude the property from saved sessions
    pub fn set_saved(&self, name_or_id: &str, saved: bool) -> Result<()> {
        let entry = self.resolve(name_or_id)?;
        entry.saved.store(saved, Ordering::SeqCst);
        Ok(())
    }

    /// `(name, value)` of every writable, save-enabled property
    ///
    /// Choice kinds report their label, so every value reads back through
    /// `set_str_str` from its `Display` form.
    pub fn saved_values(&self) -> Vec<(String, Value)> {
        let entries: Vec<Arc<Entry>> = self.inner.index.read().by_id.values().cloned().collect();
        entries
            .into_iter()
            .filter(|e| e.setter.is_some() && e.saved.load(Ordering::SeqCst))
            .filter_map(|e| {
                let value = self.current(&e)?;
                Some((e.name.clone(), e.kind.tree_value(&value)))
            })
            .collect()
    }

    /// Remove a property; removing a group removes its members too
    ///
    /// False for unknown ids.
    pub fn remove(&self, id: PropertyId) -> bool {
        let removed = {
            let mut index = self.inner.index.write();
            let Some(entry) = index.by_id.get(&id).cloned() else {
                return false;
            };
            let mut removed = Vec::new();
            let mut pending = vec![entry];
            while let Some(entry) = pending.pop() {
                if entry.kind == PropertyKind::Group {
                    pending.extend(
                        index
                            .by_id
                            .values()
                            .filter(|e| e.parent.read().as_deref() == Some(entry.name.as_str()))
                            .cloned(),
                    );
                }
                index.by_id.remove(&entry.id);
                index.by_name.remove(&entry.name);
                removed.push(entry);
            }
            removed
        };
        for entry in removed {
            self.inner.info.prune(&entry.tree_path());
        }
        true
    }

    /// Drop every property and its subscribers
    pub(crate) fn clear(&self) {
        let mut index = self.inner.index.write();
        index.by_name.clear();
        index.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicI64;
    use std::thread;

    fn bag() -> (PropertyBag, InfoTree) {
        let info = InfoTree::new();
        (PropertyBag::new("test", info.clone(), Lifecycle::new()), info)
    }

    #[test]
    fn test_string_round_trip_for_each_kind() {
        let (bag, _) = bag();
        bag.make_bool("b", Access::stored(), "", false).unwrap();
        bag.make_int("i", Access::stored(), "", 0, -5, 5).unwrap();
        bag.make_double("d", Access::stored(), "", 0.0, 0.0, 1.0).unwrap();
        bag.make_str("s", Access::stored(), "", "").unwrap();
        bag.make_selection("sel", Access::stored(), "", &["a", "b"], 0)
            .unwrap();
        bag.make_enumeration("en", Access::stored(), "", &[("x", 10), ("y", 20)], 0)
            .unwrap();

        for (name, text) in [
            ("b", "true"),
            ("i", "-3"),
            ("d", "0.75"),
            ("s", "hi, there"),
            ("sel", "b"),
            ("en", "y"),
        ] {
            bag.set_str_str(name, text).unwrap();
            assert_eq!(bag.get_str_str(name).unwrap(), text, "property {}", name);
        }
    }

    #[test]
    fn test_setter_sees_native_value() {
        let (bag, _) = bag();
        let seen = Arc::new(AtomicI64::new(0));
        let s = seen.clone();
        bag.make_enumeration(
            "mode",
            Access::write(move |v| {
                s.store(v, Ordering::SeqCst);
                true
            }),
            "",
            &[("slow", 10), ("fast", 100)],
            0,
        )
        .unwrap();

        bag.set_str_str("mode", "fast").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_getter_is_authoritative() {
        let (bag, _) = bag();
        let level = Arc::new(AtomicI64::new(42));
        let l = level.clone();
        bag.make_int(
            "level",
            Access::read_only().with_getter(move || l.load(Ordering::SeqCst)),
            "",
            0,
            0,
            100,
        )
        .unwrap();
        assert_eq!(bag.get_str_str("level").unwrap(), "42");
        level.store(7, Ordering::SeqCst);
        assert_eq!(bag.get_str_str("level").unwrap(), "7");
        assert!(!bag.is_writable("level").unwrap());
        assert_eq!(
            bag.set_str_str("level", "1").unwrap_err(),
            Error::ReadOnly("level".into())
        );
    }

    #[test]
    fn test_out_of_bounds_leaves_value_unchanged() {
        let (bag, info) = bag();
        bag.make_int("gain", Access::stored(), "", 3, 0, 10).unwrap();

        let err = bag.set_str_str("gain", "11").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(bag.get_str_str("gain").unwrap(), "3");
        assert_eq!(info.read::<i64>(".property.gain.value").unwrap(), 3);
    }

    #[test]
    fn test_parse_failure() {
        let (bag, _) = bag();
        bag.make_int("n", Access::stored(), "", 0, 0, 10).unwrap();
        let err = bag.set_str_str("n", "ten").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
    }

    #[test]
    fn test_disabled_never_calls_setter() {
        let (bag, _) = bag();
        let calls = Arc::new(AtomicI64::new(0));
        let c = calls.clone();
        bag.make_bool(
            "mute",
            Access::write(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                true
            }),
            "",
            false,
        )
        .unwrap();

        bag.disable("mute").unwrap();
        let err = bag.set_str_str("mute", "true").unwrap_err();
        assert_eq!(err, Error::Disabled("property mute".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bag.get_str_str("mute").unwrap(), "false");

        bag.enable("mute").unwrap();
        bag.set_str_str("mute", "true").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejecting_setter() {
        let (bag, _) = bag();
        bag.make_str("name", Access::write(|v: String| !v.is_empty()), "", "x")
            .unwrap();
        assert!(matches!(
            bag.set_str_str("name", ""),
            Err(Error::Rejected(_))
        ));
        assert_eq!(bag.get_str_str("name").unwrap(), "x");
    }

    #[test]
    fn test_subscribers_and_tree() {
        let (bag, info) = bag();
        let id = bag.make_double("rate", Access::stored(), "", 1.0, 0.0, 10.0).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let token = bag
            .subscribe("rate", move |v| s.lock().push(v.clone()))
            .unwrap();

        bag.set_str(id, "2.5").unwrap();
        assert_eq!(*seen.lock(), vec![Value::Double(2.5)]);
        assert_eq!(info.read::<f64>(".property.rate.value").unwrap(), 2.5);

        assert!(bag.unsubscribe(token));
        assert!(!bag.unsubscribe(token));
        bag.set_str(id, "3").unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_lookup_by_id_text() {
        let (bag, _) = bag();
        let id = bag.make_int("n", Access::stored(), "", 0, 0, 9).unwrap();
        bag.set_str_str(&id.to_string(), "4").unwrap();
        bag.set_str_str(&id.0.to_string(), "5").unwrap();
        assert_eq!(bag.get_str_str("n").unwrap(), "5");
        assert_eq!(bag.get_id("n"), Some(id));
        assert_eq!(bag.get_name(id).as_deref(), Some("n"));
    }

    #[test]
    fn test_duplicate_name_fails() {
        let (bag, _) = bag();
        bag.make_bool("x", Access::stored(), "", true).unwrap();
        let err = bag.make_bool("x", Access::stored(), "", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_groups() {
        let (bag, info) = bag();
        let group = bag.make_group("audio", "Audio settings").unwrap();
        bag.make_parented_group("advanced", "audio", "").unwrap();
        bag.make_int("rate", Access::stored(), "", 1, 1, 9).unwrap();
        bag.make_bool("dither", Access::stored(), "", true).unwrap();
        bag.set_parent("rate", "audio").unwrap();
        bag.set_parent("dither", "advanced").unwrap();
        assert_eq!(info.read::<String>(".property.rate.parent").unwrap(), "audio");
        assert!(bag.make_parented_group("x", "rate", "").is_err());

        assert!(bag.remove(group));
        assert!(bag.names().is_empty());
        assert!(!info.exists(".property.rate"));
        assert!(!bag.remove(group));
    }

    #[test]
    fn test_remove_member_individually() {
        let (bag, _) = bag();
        bag.make_group("g", "").unwrap();
        let member = bag.make_int("m", Access::stored(), "", 0, 0, 1).unwrap();
        bag.set_parent("m", "g").unwrap();
        assert!(bag.remove(member));
        assert_eq!(bag.names(), vec!["g"]);
    }

    #[test]
    fn test_saved_values_skip_read_only_and_unsaved() {
        let (bag, _) = bag();
        bag.make_int("kept", Access::stored(), "", 1, 0, 9).unwrap();
        bag.make_int("status", Access::read_only(), "", 2, 0, 9).unwrap();
        bag.make_int("volatile", Access::stored(), "", 3, 0, 9).unwrap();
        bag.set_saved("volatile", false).unwrap();
        assert_eq!(bag.saved_values(), vec![("kept".to_string(), Value::Int(1))]);
    }

    #[test]
    fn test_notify_read_only() {
        let (bag, info) = bag();
        bag.make_str("status", Access::read_only(), "", "idle").unwrap();
        bag.notify("status", Some(Value::from("busy"))).unwrap();
        assert_eq!(bag.get_str_str("status").unwrap(), "busy");
        assert_eq!(info.read::<String>(".property.status.value").unwrap(), "busy");
    }

    #[test]
    fn test_concurrent_sets_on_distinct_properties() {
        let (bag, _) = bag();
        for i in 0..4 {
            bag.make_int(&format!("p{}", i), Access::stored(), "", 0, 0, 1000)
                .unwrap();
        }
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bag = bag.clone();
                thread::spawn(move || {
                    for v in 0..100 {
                        bag.set_str_str(&format!("p{}", i), &v.to_string()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0..4 {
            assert_eq!(bag.get_str_str(&format!("p{}", i)).unwrap(), "99");
        }
    }

    #[test]
    fn test_set_after_shutdown() {
        let info = InfoTree::new();
        let lifecycle = Lifecycle::new();
        let bag = PropertyBag::new("gone", info, lifecycle.clone());
        bag.make_bool("b", Access::stored(), "", false).unwrap();
        lifecycle.shut_down();
        assert_eq!(
            bag.set_str_str("b", "true").unwrap_err(),
            Error::ShuttingDown("gone".into())
        );
    }
}
