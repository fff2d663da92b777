//! Mesh DNS Proxy Layer
//!
//! An embedded DNS proxy for service-mesh data planes: answers queries for
//! locally-known service names authoritatively and forwards everything else
//! to the host's configured upstream resolver.
pub mod dns;
