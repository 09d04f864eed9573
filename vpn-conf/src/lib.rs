//! strongSwan IPsec gateway and client configuration management.
//!
//! The library loads `ipsec.conf` and `ipsec.secrets`, sorts every managed
//! connection into one of a small catalog of scenarios, lets callers edit
//! connections and secrets under the catalog's rules, and renders the result
//! back to files together with the firewall rules the gateways need.
//!
//! # Architecture
//!
//! ## Model
//!
//! - [`scenario`]: the scenario catalog, its templates and classification
//! - [`secrets`]: secret buckets and their file representation
//! - [`store`]: connections, the current selection and every edit operation
//!
//! ## Files
//!
//! - [`conf_files`]: translation between parsed files and the store
//! - [`settings`]: TOML settings naming the managed paths and global switches
//!
//! ## Output
//!
//! - [`firewall`]: rule derivation and custom-rules script maintenance
//! - [`apply`]: planning and carrying out a write of the whole configuration
//! - [`verify`]: pre-apply checks
//! - [`report`]: terminal rendering

pub mod apply;
pub mod conf_files;
pub mod firewall;
pub mod report;
pub mod scenario;
pub mod secrets;
pub mod settings;
pub mod store;
pub mod verify;
