/*!
Data model for the collection pipeline: decoded/enriched records, the prefix
registry, and the read-only enrichment stores (ROA trie, incident maps, AS
topology).
*/
pub mod aspath;
pub mod incidents;
pub mod record;
pub mod registry;
pub mod roa;
pub mod topology;

pub use aspath::*;
pub use incidents::*;
pub use record::*;
pub use registry::*;
pub use roa::*;
pub use topology::*;
