//! Per-component invokable methods
//!
//! A method has a fixed signature and a body taking natively typed
//! arguments. [`MethodBag::invoke_str`] accepts the whole argument list as
//! one delimited string (see [`args`]); it parses and type-checks every
//! argument first and only then calls the body, so a malformed string
//! never causes a partial invocation.

pub mod args;

pub use args::ArgType;

use crate::component::{InfoTree, Lifecycle};
use crate::error::{Error, Result};
use crate::tree::{Tree, Value};
use crate::types::MethodId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Method body; an `Err` carries the failure message
pub type MethodBody = Arc<dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync>;

/// One declared argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub description: String,
    pub ty: ArgType,
}

impl ArgSpec {
    pub fn new(name: &str, description: &str, ty: ArgType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ty,
        }
    }
}

struct Method {
    id: MethodId,
    name: String,
    args: Vec<ArgSpec>,
    body: MethodBody,
    enabled: AtomicBool,
}

/// Methods of one component
#[derive(Clone)]
pub struct MethodBag {
    inner: Arc<Inner>,
}

struct Inner {
    owner: String,
    info: InfoTree,
    lifecycle: Lifecycle,
    methods: RwLock<BTreeMap<MethodId, Arc<Method>>>,
}

impl MethodBag {
    pub fn new(owner: &str, info: InfoTree, lifecycle: Lifecycle) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner: owner.to_string(),
                info,
                lifecycle,
                methods: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Register a method
    pub fn make<F>(
        &self,
        name: &str,
        description: &str,
        args: Vec<ArgSpec>,
        body: F,
    ) -> Result<MethodId>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        if name.is_empty() || name.contains(crate::tree::SEPARATOR) {
            return Err(Error::parse("method name", format!("'{}' is not a valid name", name)));
        }
        let mut methods = self.inner.methods.write();
        if methods.values().any(|m| m.name == name) {
            return Err(Error::AlreadyRegistered(format!("method {}", name)));
        }
        let method = Arc::new(Method {
            id: MethodId::next(),
            name: name.to_string(),
            args,
            body: Arc::new(body),
            enabled: AtomicBool::new(true),
        });
        methods.insert(method.id, method.clone());
        drop(methods);

        let mut desc = Tree::new();
        desc.vgraft("id", method.id.0 as i64);
        desc.vgraft("description", description);
        desc.vgraft("enabled", true);
        let mut arguments = Tree::new();
        for (index, arg) in method.args.iter().enumerate() {
            let mut entry = Tree::new();
            entry.vgraft("name", arg.name.as_str());
            entry.vgraft("description", arg.description.as_str());
            entry.vgraft("type", arg.ty.type_name());
            arguments.graft(&index.to_string(), entry);
        }
        desc.graft("arguments", arguments);
        desc.tag_as_array("arguments", true);
        self.inner.info.graft(&format!(".method.{}", name), desc);
        Ok(method.id)
    }

    fn resolve(&self, key: &str) -> Result<Arc<Method>> {
        let methods = self.inner.methods.read();
        methods
            .values()
            .find(|m| m.name == key)
            .or_else(|| {
                key.strip_prefix("meth:")
                    .unwrap_or(key)
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| methods.get(&MethodId(id)))
            })
            .cloned()
            .ok_or_else(|| Error::MethodNotFound(key.to_string()))
    }

    pub fn get_id(&self, name: &str) -> Option<MethodId> {
        self.inner
            .methods
            .read()
            .values()
            .find(|m| m.name == name)
            .map(|m| m.id)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .methods
            .read()
            .values()
            .map(|m| m.name.clone())
            .collect()
    }

    pub fn signature(&self, name_or_id: &str) -> Result<Vec<ArgSpec>> {
        Ok(self.resolve(name_or_id)?.args.clone())
    }

    /// Call with natively typed arguments
    pub fn invoke(&self, name_or_id: &str, args: &[Value]) -> Result<Value> {
        let method = self.resolve(name_or_id)?;
        if args.len() != method.args.len() {
            return Err(Error::parse(
                format!("arguments of {}", method.name),
                format!("expected {} arguments, got {}", method.args.len(), args.len()),
            ));
        }
        for (spec, value) in method.args.iter().zip(args) {
            if !spec.ty.accepts(value) {
                return Err(Error::TypeMismatch {
                    name: format!("{}({})", method.name, spec.name),
                    expected: spec.ty.type_name().to_string(),
                    found: value.type_name().to_string(),
                });
            }
        }
        self.call(&method, args)
    }

    /// Call with a delimited argument string
    pub fn invoke_str(&self, name_or_id: &str, text: &str) -> Result<Value> {
        let method = self.resolve(name_or_id)?;
        let texts = if text.is_empty() && method.args.is_empty() {
            Vec::new()
        } else {
            args::split(text)?
        };
        if texts.len() != method.args.len() {
            return Err(Error::parse(
                format!("arguments of {}", method.name),
                format!(
                    "expected {} arguments, got {} (escape literal commas as \\,)",
                    method.args.len(),
                    texts.len()
                ),
            ));
        }
        let values = method
            .args
            .iter()
            .zip(&texts)
            .map(|(spec, text)| spec.ty.parse(&spec.name, text))
            .collect::<Result<Vec<_>>>()?;
        self.call(&method, &values)
    }

    fn call(&self, method: &Method, args: &[Value]) -> Result<Value> {
        if !method.enabled.load(Ordering::SeqCst) {
            return Err(Error::Disabled(format!("method {}", method.name)));
        }
        let _entered = self
            .inner
            .lifecycle
            .enter()
            .ok_or_else(|| Error::ShuttingDown(self.inner.owner.clone()))?;
        (method.body)(args).map_err(|message| {
            tracing::debug!(owner = %self.inner.owner, method = %method.name, %message, "method failed");
            Error::Rejected(message)
        })
    }

    pub fn enable(&self, name_or_id: &str) -> Result<()> {
        self.set_enabled(name_or_id, true)
    }

    pub fn disable(&self, name_or_id: &str) -> Result<()> {
        self.set_enabled(name_or_id, false)
    }

    fn set_enabled(&self, name_or_id: &str, enabled: bool) -> Result<()> {
        let method = self.resolve(name_or_id)?;
        method.enabled.store(enabled, Ordering::SeqCst);
        self.inner
            .info
            .graft(&format!(".method.{}.enabled", method.name), Tree::leaf(enabled));
        Ok(())
    }

    /// False for unknown ids
    pub fn remove(&self, id: MethodId) -> bool {
        let Some(method) = self.inner.methods.write().remove(&id) else {
            return false;
        };
        self.inner.info.prune(&format!(".method.{}", method.name));
        true
    }

    pub(crate) fn clear(&self) {
        self.inner.methods.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use parking_lot::Mutex;

    fn bag() -> (MethodBag, InfoTree) {
        let info = InfoTree::new();
        (MethodBag::new("test", info.clone(), Lifecycle::new()), info)
    }

    fn concat_bag() -> (MethodBag, Arc<Mutex<usize>>) {
        let (bag, _) = bag();
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        bag.make(
            "concat",
            "Join a string n times",
            vec![
                ArgSpec::new("text", "what to repeat", ArgType::Str),
                ArgSpec::new("times", "how often", ArgType::Int),
            ],
            move |args| {
                *c.lock() += 1;
                let text = args[0].as_str().unwrap_or_default();
                let times = args[1].as_int().unwrap_or(0);
                Ok(Value::Str(text.repeat(times as usize)))
            },
        )
        .unwrap();
        (bag, calls)
    }

    #[test]
    fn test_invoke_typed() {
        let (bag, _) = concat_bag();
        let out = bag
            .invoke("concat", &[Value::from("ab"), Value::Int(2)])
            .unwrap();
        assert_eq!(out, Value::from("abab"));

        let err = bag
            .invoke("concat", &[Value::Int(2), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_invoke_str_with_escaped_comma() {
        let (bag, _) = concat_bag();
        let out = bag.invoke_str("concat", r"a\,b,2").unwrap();
        assert_eq!(out, Value::from("a,ba,b"));
    }

    #[test]
    fn test_unescaped_delimiter_is_rejected_without_calling() {
        let (bag, calls) = concat_bag();
        let err = bag.invoke_str("concat", "a,b,2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        let err = bag.invoke_str("concat", "ab,two").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_zero_arity() {
        let (bag, _) = bag();
        bag.make("ping", "", Vec::new(), |_| Ok(Value::from("pong")))
            .unwrap();
        assert_eq!(bag.invoke_str("ping", "").unwrap(), Value::from("pong"));
        assert!(bag.invoke_str("ping", "x").is_err());
    }

    #[test]
    fn test_body_failure_is_reported() {
        let (bag, _) = bag();
        bag.make("fail", "", Vec::new(), |_| Err("no device".to_string()))
            .unwrap();
        assert_eq!(
            bag.invoke_str("fail", "").unwrap_err(),
            Error::Rejected("no device".into())
        );
    }

    #[test]
    fn test_disable_and_remove() {
        let (bag, info) = bag();
        let id = bag
            .make("ping", "", Vec::new(), |_| Ok(Value::Bool(true)))
            .unwrap();
        assert!(info.exists(".method.ping.arguments"));

        bag.disable("ping").unwrap();
        assert_eq!(bag.invoke(&id.to_string(), &[]).unwrap_err().kind(), ErrorKind::InvalidState);
        bag.enable("ping").unwrap();
        assert!(bag.invoke("ping", &[]).is_ok());

        assert!(bag.remove(id));
        assert!(!bag.remove(id));
        assert!(!info.exists(".method.ping"));
        assert_eq!(bag.invoke("ping", &[]).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_name() {
        let (bag, _) = bag();
        bag.make("m", "", Vec::new(), |_| Ok(Value::Bool(true))).unwrap();
        assert!(bag.make("m", "", Vec::new(), |_| Ok(Value::Bool(true))).is_err());
    }
}
