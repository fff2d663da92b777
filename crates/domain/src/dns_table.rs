use serde::{Deserialize, Serialize};

/// Reconfiguration payload pushed by the control plane.
///
/// Every record name gets an A-family and an AAAA-family answer set; every
/// valid IP literal becomes one answer of the matching family. The TTL is
/// shared by the whole batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsTable {
    pub ttl: u32,
    pub records: Vec<DnsTableRecord>,
}

/// One locally-known service name with its IP literals (unqualified form).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsTableRecord {
    pub name: String,
    #[serde(default)]
    pub ips: Vec<String>,
}
