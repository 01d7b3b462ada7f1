//! Switchyard - host runtime for composable components
//!
//! This crate hosts independently written components and lets them be
//! inspected, configured and wired together while running.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Registry                            │
//! │   kinds ──▶ factories      ids / names      save / load     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌───────────────────────┐      ┌───────────────────────┐   │
//! │  │     Component a       │      │     Component b       │   │
//! │  │  ┌─────────────────┐  │      │  ┌─────────────────┐  │   │
//! │  │  │  PropertyBag    │  │      │  │  PropertyBag    │  │   │
//! │  │  │  MethodBag      │  │      │  │  MethodBag      │  │   │
//! │  │  │  SignalBag      │  │      │  │  SignalBag      │  │   │
//! │  │  └─────────────────┘  │      │  └─────────────────┘  │   │
//! │  │  Claw:  writer out ───┼──────┼──▶ follower in%       │   │
//! │  │  Tree (information)   │      │  Tree (information)   │   │
//! │  └───────────────────────┘      └───────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! ## Tree
//!
//! A [`Tree`] is an ordered hierarchy of named nodes, each optionally
//! carrying a scalar [`Value`]. Components describe themselves in one, and
//! sessions are saved as one.
//!
//! ## Properties, methods and signals
//!
//! Each component registers, while it is built:
//! - typed properties, settable and readable as strings
//! - methods taking a delimited string of arguments
//! - signals delivering a tree payload synchronously to subscribers
//!
//! ## Claw
//!
//! The [`claw::Claw`] of a component holds its writer and follower ports.
//! A follower connects to a writer of another component when their
//! capabilities overlap. A meta follower (`in%`) grows a new port per
//! connection.
//!
//! # Example
//!
//! ```rust
//! use switchyard::{Registry, RegistryConfig};
//!
//! let registry = Registry::with_builtins(RegistryConfig::default()).unwrap();
//! registry.create("echo", "a", None).unwrap();
//! let b = registry.create("echo", "b", None).unwrap();
//!
//! let id = registry.connect("a", "out", "b", "in").unwrap();
//! assert_eq!(b.claw().connections().len(), 1);
//! b.claw().disconnect(id).unwrap();
//! assert!(b.claw().disconnect(id).is_err());
//! ```

pub mod builtin;
pub mod claw;
pub mod component;
pub mod error;
pub mod method;
pub mod property;
pub mod registry;
pub mod signal;
pub mod tree;
pub mod types;

pub use claw::{Claw, ConnectionInfo, ConnectionSpec, MetaDuplicatePolicy, PortSpec};
pub use component::{Behavior, Component};
pub use error::{Error, ErrorKind, Result};
pub use method::{ArgSpec, ArgType, MethodBag};
pub use property::{Access, PropertyBag, PropertyKind};
pub use registry::{ConfigError, KindDoc, LoadReport, Qrox, Registry, RegistryConfig};
pub use signal::SignalBag;
pub use tree::{Tree, TreeError, Value};
pub use types::{ComponentId, FollowerId, MethodId, PropertyId, SignalId, SubscriptionId, WriterId};
