//! Generic strongSwan flat-file parsing and writing primitives used by higher-level tools.
//!
//! `ipsec.conf` is read into a [`ConfDocument`] of header/parameter sections and
//! `ipsec.secrets` into a [`SecretsDocument`] of `selectors : value` entries. Nothing
//! here interprets what the sections or secrets mean.

pub mod parser;
pub mod tree;
pub mod writer;

pub use parser::{parse_conf, parse_conf_file, parse_secrets, parse_secrets_file, ParseError};
pub use tree::{ConfDocument, ConfSection, SecretEntry, SecretsDocument};
pub use writer::{write_conf, write_conf_file, write_secrets, write_secrets_file, WriteError};
