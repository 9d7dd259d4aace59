//! DNS-SD discovery interface
//!
//! Sources advertise as `_omt._tcp.` (the trailing dot matters to vMix and
//! OMT Viewer) and receivers browse the same type. The mDNS responder
//! itself is supplied by the embedding application; this module defines
//! the naming rules and the trait seams it plugs into.

use std::net::Ipv4Addr;

use crate::error::Result;

/// DNS-SD service type, trailing dot included.
pub const SERVICE_TYPE: &str = "_omt._tcp.";

/// A source found by browsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    /// Full instance name, e.g. `STUDIO-PC (Camera 1)`.
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// Format the service instance name for a source.
///
/// The convention is `"<HOST> (<SourceName>)"`. A source name that already
/// carries parentheses is taken as pre-formatted and used verbatim.
pub fn instance_name(host: &str, source_name: &str) -> String {
    if source_name.contains('(') && source_name.contains(')') {
        source_name.to_string()
    } else {
        format!("{host} ({source_name})")
    }
}

/// Advertises a bound source. Implemented over the platform's mDNS
/// responder; registered once the TCP listener is up.
pub trait Advertiser: Send {
    fn register(&mut self, instance_name: &str, port: u16, addr: Ipv4Addr) -> Result<()>;
    fn unregister(&mut self) -> Result<()>;
}

/// Enumerates advertised sources.
pub trait Browser: Send {
    fn browse(&mut self) -> Result<Vec<DiscoveredSource>>;
}
