//! Mesh DNS Domain Layer
pub mod config;
pub mod dns_table;
pub mod errors;

pub use config::{CliOverrides, ProxyConfig};
pub use dns_table::{DnsTable, DnsTableRecord};
pub use errors::DomainError;
