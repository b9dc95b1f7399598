//! # Declarative
//!
//! Reconcile typed resources against a host.
//!
//! This crate provides the core abstractions for declaring desired state,
//! loading current state, and converging a host to match. It knows nothing
//! about concrete resource types; applications implement the traits and
//! register their types.
//!
//! ## Core Concepts
//!
//! - **Resource**: A typed unit of desired state with one identifying field
//!   and an `absent` flag
//! - **SingleResource / GroupResource**: The two reconciliation shapes
//! - **Action**: Outcome of comparing a declaration with loaded state
//! - **Registry**: Type name to prototype, shape and decoder
//! - **Host**: Everything a reconciler may do to a machine
//! - **Session**: Host, cancellation token and fan-out width for one run
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{MemoryHost, Registry, Session, SingleResource};
//!
//! let registry = Registry::new().register::<Motd>(Any::Motd);
//! let host = MemoryHost::new();
//! let session = Session::new(&host);
//!
//! let target = Motd { path: "/etc/motd".into(), text: "hello".into(), ..Motd::default() };
//! target.apply(&session)?;
//! assert!(target.load(&session)?.satisfies(&target));
//! ```
//!
//! ## Testing
//!
//! [`MemoryHost`] is a complete in-memory [`Host`] with a mutation journal,
//! so reconcilers can be tested for convergence and idempotence without
//! touching the machine running the tests.

pub mod action;
pub mod context;
pub mod error;
pub mod fanout;
pub mod host;
pub mod memory;
pub mod merge;
pub mod registry;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use action::{Action, ActionSummary, Comparison};
pub use context::{CancelToken, DEFAULT_JOBS, Removal, Session};
pub use error::{CommandFailure, Error, Result};
pub use fanout::join_all;
pub use host::{FileStat, FileType, Host, NodeType, PERMISSION_BITS};
pub use memory::{MemoryHost, Mutation};
pub use merge::{MergeConflict, MergeError, Merged, Sourced, merge_declarations};
pub use registry::{Registry, check_contract};
pub use resource::{GroupResource, Resource, Shape, SingleResource, is_false};
pub use types::{Command, CommandOutput, ExitStatus};
