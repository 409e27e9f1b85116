//! Collaborators around the core: pool seeding and reporting

pub mod discovery;
pub mod reporter;

pub use discovery::{
    get_session, get_session_with, parse_listing, seed, DiscoverySource, Prober,
    ProxyListSource, SeedReport,
};
pub use reporter::{report, report_at};
