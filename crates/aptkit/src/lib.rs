//! # aptkit
//!
//! Pure Rust library for the text interfaces of the Debian package tools.
//!
//! This crate provides functionality for:
//! - Building `dpkg-query --show` invocations and parsing their stanzas
//! - Parsing `debconf-show` output and speaking the `debconf-communicate`
//!   request/reply protocol
//! - Rendering `apt-get` and `apt-mark` arguments
//! - Parsing `update-alternatives --query` and building its commands
//! - Validating package names, versions and architectures
//!
//! Nothing here runs a process. Callers execute the argument vectors on
//! whatever host they manage and feed the output back in.
//!
//! ## Example
//!
//! ```
//! use aptkit::dpkg;
//!
//! let args = dpkg::show_args(["curl", "libc6:amd64"]);
//! assert_eq!(args[0], "--show");
//!
//! let installed = dpkg::parse_show(
//!     "Package=curl\nArchitecture=amd64\nVersion=8.5.0-2\nend\n",
//! )
//! .unwrap();
//! assert_eq!(installed[0].version, "8.5.0-2");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alternatives;
pub mod apt;
pub mod debconf;
pub mod dpkg;
pub mod error;
pub mod validate;

pub use error::{Error, Result};
