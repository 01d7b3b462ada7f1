//! Data-flow ports and their connections
//!
//! Every component declares writer ports (what it produces) and follower
//! ports (what it consumes) through a [`ConnectionSpec`]. The claw owns
//! the ports and the connection state machine:
//!
//! ```text
//! plain follower:   Unconnected ──connect──▶ Connected ──disconnect──▶ Unconnected
//! meta follower:    Declared ──connect──▶ Instance[n]: Connected ──disconnect──▶ (destroyed)
//! ```
//!
//! A connection is stored on the follower side, keyed by the id of the
//! concrete follower port it binds. Connecting against a meta template
//! materializes a fresh instance (label `in%` → `in0`, `in1`, ...) with its
//! own id; disconnecting destroys the instance and frees its label.
//!
//! Connect and disconnect on the same follower id are mutually exclusive.
//! For a meta template, the template's lock covers validation, instance
//! allocation and binding. Operations on different ids do not contend.

pub mod spec;

pub use spec::{capability_matches, ConnectionSpec, PortSpec, ANY_CAPABILITY, META_SUFFIX};

use crate::component::{Behavior, BehaviorSlot, InfoTree, Lifecycle};
use crate::error::{Error, Result};
use crate::signal::{ON_CONNECTION_ADDED, ON_CONNECTION_REMOVED};
use crate::tree::Tree;
use crate::types::{ComponentId, FollowerId, IdCounter, WriterId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Whether one writer may feed several instances of the same meta follower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaDuplicatePolicy {
    #[default]
    Allow,
    Reject,
}

/// A writer port as seen from another component
#[derive(Debug, Clone, PartialEq)]
pub struct WriterInfo {
    pub component: ComponentId,
    pub component_name: String,
    pub id: WriterId,
    pub label: String,
    pub can_do: Vec<String>,
}

/// One live connection, stored on the follower side
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub follower_id: FollowerId,
    pub follower_label: String,
    /// Meta template the follower was instantiated from
    pub template: Option<String>,
    pub writer_component: ComponentId,
    pub writer_component_name: String,
    pub writer_id: WriterId,
    pub writer_label: String,
    /// Writer capability the follower accepted
    pub capability: String,
}

impl ConnectionInfo {
    fn to_tree(&self) -> Tree {
        let mut tree = Tree::new();
        tree.vgraft("follower_id", self.follower_id.0 as i64);
        if let Some(template) = &self.template {
            tree.vgraft("template", template.as_str());
        }
        tree.vgraft("writer_component", self.writer_component_name.as_str());
        tree.vgraft("writer_component_id", self.writer_component.0 as i64);
        tree.vgraft("writer_label", self.writer_label.as_str());
        tree.vgraft("writer_id", self.writer_id.0 as i64);
        tree.vgraft("capability", self.capability.as_str());
        tree
    }
}

/// Resolves writer ports across components
///
/// Implemented by the registry; a claw holds it weakly.
pub trait PortDirectory: Send + Sync {
    fn writer(&self, component: ComponentId, writer: WriterId) -> Result<WriterInfo>;

    /// A dynamic writer went away; followers it fed must be disconnected
    fn writer_removed(&self, component: ComponentId, writer: WriterId);
}

/// The component a claw belongs to
pub(crate) struct Owner {
    pub id: ComponentId,
    pub name: String,
    pub info: InfoTree,
    pub lifecycle: Lifecycle,
    pub behavior: BehaviorSlot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Plain,
    Template,
    Instance { template: FollowerId },
}

struct WriterPort {
    spec: PortSpec,
    /// Meta writer this one was added to
    from_meta: Option<WriterId>,
}

struct FollowerPort {
    spec: PortSpec,
    role: Role,
    connection: Option<ConnectionInfo>,
    serial: Arc<Mutex<()>>,
}

#[derive(Default)]
struct Ports {
    writers: BTreeMap<WriterId, WriterPort>,
    followers: BTreeMap<FollowerId, FollowerPort>,
}

impl Ports {
    fn label_taken(&self, label: &str) -> bool {
        self.followers.values().any(|p| p.spec.label == label)
    }

    fn writer_label_taken(&self, label: &str) -> bool {
        self.writers.values().any(|p| p.spec.label == label)
    }

    fn materialized(&self) -> ConnectionSpec {
        ConnectionSpec {
            writer: self.writers.values().map(|p| p.spec.clone()).collect(),
            follower: self.followers.values().map(|p| p.spec.clone()).collect(),
        }
    }
}

/// Ports and connections of one component
pub struct Claw {
    owner: Owner,
    ids: IdCounter,
    ports: RwLock<Ports>,
    directory: Weak<dyn PortDirectory>,
    policy: MetaDuplicatePolicy,
}

impl Claw {
    pub(crate) fn new(
        owner: Owner,
        spec: &ConnectionSpec,
        directory: Weak<dyn PortDirectory>,
        policy: MetaDuplicatePolicy,
    ) -> Self {
        let ids = IdCounter::default();
        let mut ports = Ports::default();
        for writer in &spec.writer {
            ports.writers.insert(
                WriterId(ids.next()),
                WriterPort {
                    spec: writer.clone(),
                    from_meta: None,
                },
            );
        }
        for follower in &spec.follower {
            let role = if follower.is_meta() {
                Role::Template
            } else {
                Role::Plain
            };
            ports.followers.insert(
                FollowerId(ids.next()),
                FollowerPort {
                    spec: follower.clone(),
                    role,
                    connection: None,
                    serial: Arc::new(Mutex::new(())),
                },
            );
        }
        let claw = Self {
            owner,
            ids,
            ports: RwLock::new(ports),
            directory,
            policy,
        };
        claw.publish_spec();
        claw
    }

    fn publish_spec(&self) {
        let spec = self.ports.read().materialized();
        self.owner.info.graft(".connection_spec", spec.to_tree());
    }

    /// Id of a declared writer label
    pub fn get_swid(&self, label: &str) -> Option<WriterId> {
        self.ports
            .read()
            .writers
            .iter()
            .find(|(_, p)| p.spec.label == label)
            .map(|(id, _)| *id)
    }

    /// Id of a follower label; for a meta label, the template's id
    pub fn get_sfid(&self, label: &str) -> Option<FollowerId> {
        self.ports
            .read()
            .followers
            .iter()
            .find(|(_, p)| p.spec.label == label)
            .map(|(id, _)| *id)
    }

    /// Every materialized follower label: plain ports, meta templates and
    /// their live instances
    pub fn get_follower_labels(&self) -> Vec<String> {
        self.ports
            .read()
            .followers
            .values()
            .map(|p| p.spec.label.clone())
            .collect()
    }

    pub fn get_writer_labels(&self) -> Vec<String> {
        self.ports
            .read()
            .writers
            .values()
            .map(|p| p.spec.label.clone())
            .collect()
    }

    /// Current ports, meta instances included
    pub fn connection_spec(&self) -> ConnectionSpec {
        self.ports.read().materialized()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.ports
            .read()
            .followers
            .values()
            .filter_map(|p| p.connection.clone())
            .collect()
    }

    pub fn connection(&self, follower: FollowerId) -> Option<ConnectionInfo> {
        self.ports
            .read()
            .followers
            .get(&follower)
            .and_then(|p| p.connection.clone())
    }

    pub fn is_connected(&self, follower: FollowerId) -> bool {
        self.connection(follower).is_some()
    }

    /// Describe one of this component's writers for a connecting follower
    pub fn writer_info(&self, writer: WriterId) -> Result<WriterInfo> {
        let ports = self.ports.read();
        let port = ports
            .writers
            .get(&writer)
            .ok_or_else(|| Error::PortNotFound(format!("{} on {}", writer, self.owner.name)))?;
        if port.spec.is_meta() {
            return Err(Error::PortNotFound(format!(
                "{} on {} is a meta writer template",
                port.spec.label, self.owner.name
            )));
        }
        Ok(WriterInfo {
            component: self.owner.id,
            component_name: self.owner.name.clone(),
            id: writer,
            label: port.spec.label.clone(),
            can_do: port.spec.can_do.clone(),
        })
    }

    fn serial_of(&self, follower: FollowerId) -> Result<Arc<Mutex<()>>> {
        self.ports
            .read()
            .followers
            .get(&follower)
            .map(|p| p.serial.clone())
            .ok_or_else(|| self.follower_not_found(follower))
    }

    fn follower_not_found(&self, follower: FollowerId) -> Error {
        Error::PortNotFound(format!("{} on {}", follower, self.owner.name))
    }

    /// Run a behavior hook inside the liveness gate
    fn hook(&self, f: impl FnOnce(&dyn Behavior) -> bool) -> Result<bool> {
        let behavior = self.owner.behavior.read().clone();
        let _entered = self
            .owner
            .lifecycle
            .enter()
            .ok_or_else(|| Error::ShuttingDown(self.owner.name.clone()))?;
        Ok(behavior.map_or(true, |b| f(b.as_ref())))
    }

    /// Connect a follower label; meta labels materialize a new instance
    pub fn connect_label(
        &self,
        follower: &str,
        source: ComponentId,
        writer: WriterId,
    ) -> Result<FollowerId> {
        let id = self
            .get_sfid(follower)
            .ok_or_else(|| Error::PortNotFound(format!("{} on {}", follower, self.owner.name)))?;
        self.connect(id, source, writer)
    }

    /// Connect a meta template through a chosen instance label
    ///
    /// The label must be one the template derives (`in3` for `in%`) and
    /// must be free. Restoring a session uses this to bring writers back
    /// on the instances they were saved on.
    pub fn connect_instance(
        &self,
        template: &str,
        instance: &str,
        source: ComponentId,
        writer: WriterId,
    ) -> Result<FollowerId> {
        let id = self
            .get_sfid(template)
            .ok_or_else(|| Error::PortNotFound(format!("{} on {}", template, self.owner.name)))?;
        self.bind(id, source, writer, Some(instance))
    }

    /// Bind `writer` of component `source` to a follower
    ///
    /// Returns the id of the bound follower: `follower` itself for a plain
    /// port, a new instance id for a meta template. On failure nothing
    /// changed: no port, tree entry or signal.
    pub fn connect(
        &self,
        follower: FollowerId,
        source: ComponentId,
        writer: WriterId,
    ) -> Result<FollowerId> {
        self.bind(follower, source, writer, None)
    }

    fn bind(
        &self,
        follower: FollowerId,
        source: ComponentId,
        writer: WriterId,
        instance: Option<&str>,
    ) -> Result<FollowerId> {
        let serial = self.serial_of(follower)?;
        let _serial = serial.lock();

        let (spec, role, connected) = {
            let ports = self.ports.read();
            let port = ports
                .followers
                .get(&follower)
                .ok_or_else(|| self.follower_not_found(follower))?;
            (port.spec.clone(), port.role, port.connection.is_some())
        };

        let directory = self
            .directory
            .upgrade()
            .ok_or_else(|| Error::ResourceUnavailable("component registry is gone".into()))?;
        let writer_info = directory.writer(source, writer)?;

        let capability = match spec::negotiate(&writer_info.can_do, &spec.can_do) {
            Some(capability) => capability.to_string(),
            None => {
                tracing::warn!(
                    follower = %format!("{}.{}", self.owner.name, spec.label),
                    writer = %format!("{}.{}", writer_info.component_name, writer_info.label),
                    "capability mismatch"
                );
                return Err(Error::CapabilityMismatch {
                    writer: writer_info.can_do.join(", "),
                    follower: spec.can_do.join(", "),
                });
            }
        };

        let (target, label, template) = match role {
            Role::Plain | Role::Instance { .. } => {
                if instance.is_some() {
                    return Err(Error::parse(
                        "follower",
                        format!("{}.{} is not a meta port", self.owner.name, spec.label),
                    ));
                }
                if connected {
                    return Err(Error::AlreadyConnected(format!(
                        "{}.{}",
                        self.owner.name, spec.label
                    )));
                }
                (follower, spec.label.clone(), None)
            }
            Role::Template => {
                if self.policy == MetaDuplicatePolicy::Reject
                    && self.feeds_template(follower, source, writer)
                {
                    return Err(Error::DuplicateMetaConnection {
                        writer: format!("{}.{}", writer_info.component_name, writer_info.label),
                        follower: format!("{}.{}", self.owner.name, spec.label),
                    });
                }
                let label = match instance {
                    Some(wanted) => self.requested_instance_label(&spec.label, wanted)?,
                    None => self.free_instance_label(&spec.label),
                };
                (FollowerId(self.ids.next()), label, Some(spec.label.clone()))
            }
        };

        let connection = ConnectionInfo {
            follower_id: target,
            follower_label: label.clone(),
            template,
            writer_component: writer_info.component,
            writer_component_name: writer_info.component_name.clone(),
            writer_id: writer_info.id,
            writer_label: writer_info.label.clone(),
            capability,
        };

        if !self.hook(|b| b.on_connect(&connection))? {
            tracing::warn!(component = %self.owner.name, follower = %label, "connection refused");
            return Err(Error::Rejected(format!(
                "{} refused connection on {}",
                self.owner.name, label
            )));
        }

        {
            let mut ports = self.ports.write();
            if role == Role::Template {
                ports.followers.insert(
                    target,
                    FollowerPort {
                        spec: PortSpec {
                            label: label.clone(),
                            description: spec.description.clone(),
                            can_do: spec.can_do.clone(),
                        },
                        role: Role::Instance { template: follower },
                        connection: Some(connection.clone()),
                        serial: Arc::new(Mutex::new(())),
                    },
                );
            } else if let Some(port) = ports.followers.get_mut(&target) {
                port.connection = Some(connection.clone());
            }
        }

        let path = format!(".claw.connections.{}", label);
        self.owner.info.graft(&path, connection.to_tree());
        if role == Role::Template {
            self.publish_spec();
        }
        let _ = self
            .owner
            .info
            .signals()
            .emit(ON_CONNECTION_ADDED, &Tree::leaf(path.as_str()));

        tracing::debug!(
            follower = %format!("{}.{}", self.owner.name, label),
            writer = %format!("{}.{}", writer_info.component_name, writer_info.label),
            id = %target,
            "connected"
        );
        Ok(target)
    }

    fn feeds_template(&self, template: FollowerId, source: ComponentId, writer: WriterId) -> bool {
        self.ports.read().followers.values().any(|p| {
            p.role == Role::Instance { template }
                && p.connection
                    .as_ref()
                    .map_or(false, |c| c.writer_component == source && c.writer_id == writer)
        })
    }

    fn free_instance_label(&self, template: &str) -> String {
        let ports = self.ports.read();
        (0..)
            .map(|index| spec::derive_label(template, index))
            .find(|label| !ports.label_taken(label))
            .unwrap_or_else(|| template.to_string())
    }

    fn requested_instance_label(&self, template: &str, wanted: &str) -> Result<String> {
        if spec::instance_index(template, wanted).is_none() {
            return Err(Error::parse(
                "follower",
                format!("{} is not an instance of {}", wanted, template),
            ));
        }
        if self.ports.read().label_taken(wanted) {
            return Err(Error::AlreadyConnected(format!("{}.{}", self.owner.name, wanted)));
        }
        Ok(wanted.to_string())
    }

    /// Remove the connection on `follower`
    ///
    /// Fails when the id is unknown or not connected. A meta instance is
    /// destroyed, freeing its label.
    pub fn disconnect(&self, follower: FollowerId) -> Result<()> {
        self.disconnect_inner(follower, false)
    }

    /// Disconnect even if the behavior refuses
    pub(crate) fn force_disconnect(&self, follower: FollowerId) -> Result<()> {
        self.disconnect_inner(follower, true)
    }

    fn disconnect_inner(&self, follower: FollowerId, force: bool) -> Result<()> {
        let serial = self.serial_of(follower)?;
        let _serial = serial.lock();

        let (connection, role) = {
            let ports = self.ports.read();
            let port = ports
                .followers
                .get(&follower)
                .ok_or_else(|| self.follower_not_found(follower))?;
            let connection = port.connection.clone().ok_or_else(|| {
                Error::NotConnected(format!("{}.{}", self.owner.name, port.spec.label))
            })?;
            (connection, port.role)
        };

        match self.hook(|b| b.on_disconnect(&connection)) {
            Ok(true) => {}
            Ok(false) | Err(_) if force => {}
            Ok(false) => {
                return Err(Error::Rejected(format!(
                    "{} refused to disconnect {}",
                    self.owner.name, connection.follower_label
                )))
            }
            Err(e) => return Err(e),
        }

        {
            let mut ports = self.ports.write();
            match role {
                Role::Instance { .. } => {
                    ports.followers.remove(&follower);
                }
                _ => {
                    if let Some(port) = ports.followers.get_mut(&follower) {
                        port.connection = None;
                    }
                }
            }
        }

        let path = format!(".claw.connections.{}", connection.follower_label);
        self.owner.info.prune(&path);
        if matches!(role, Role::Instance { .. }) {
            self.publish_spec();
        }
        let _ = self
            .owner
            .info
            .signals()
            .emit(ON_CONNECTION_REMOVED, &Tree::leaf(path.as_str()));

        tracing::debug!(
            follower = %format!("{}.{}", self.owner.name, connection.follower_label),
            forced = force,
            "disconnected"
        );
        Ok(())
    }

    /// Materialize a writer under a meta writer template
    pub fn add_writer_to_meta(&self, meta: WriterId, can_do: &[&str]) -> Result<WriterId> {
        let id = {
            let mut ports = self.ports.write();
            let template = ports
                .writers
                .get(&meta)
                .ok_or_else(|| Error::PortNotFound(format!("{} on {}", meta, self.owner.name)))?;
            if !template.spec.is_meta() {
                return Err(Error::InvalidSpec(format!(
                    "{} is not a meta writer",
                    template.spec.label
                )));
            }
            let template_label = template.spec.label.clone();
            let description = template.spec.description.clone();
            let label = (0..)
                .map(|index| spec::derive_label(&template_label, index))
                .find(|label| !ports.writer_label_taken(label))
                .unwrap_or_else(|| template_label.clone());
            let id = WriterId(self.ids.next());
            ports.writers.insert(
                id,
                WriterPort {
                    spec: PortSpec {
                        label,
                        description,
                        can_do: can_do.iter().map(|c| c.to_string()).collect(),
                    },
                    from_meta: Some(meta),
                },
            );
            id
        };
        self.publish_spec();
        Ok(id)
    }

    /// Remove a writer added with [`Claw::add_writer_to_meta`]
    ///
    /// Followers it fed are disconnected.
    pub fn remove_writer_from_meta(&self, writer: WriterId) -> Result<()> {
        {
            let mut ports = self.ports.write();
            let port = ports
                .writers
                .get(&writer)
                .ok_or_else(|| Error::PortNotFound(format!("{} on {}", writer, self.owner.name)))?;
            if port.from_meta.is_none() {
                return Err(Error::InvalidSpec(format!(
                    "{} was not added to a meta writer",
                    port.spec.label
                )));
            }
            ports.writers.remove(&writer);
        }
        self.publish_spec();
        if let Some(directory) = self.directory.upgrade() {
            directory.writer_removed(self.owner.id, writer);
        }
        Ok(())
    }
}
