pub mod handler;
pub mod metrics;
pub mod server;
pub mod table;
pub mod upstream;

pub use handler::QueryHandler;
pub use metrics::ServerMetrics;
pub use server::DnsProxy;
pub use table::{RecordTable, TableEntry};
pub use upstream::{UdpUpstream, Upstream};
