/// Connection management and schema setup.
pub mod connection;

/// Read queries, graph suppliers and write helpers.
pub mod queries;

pub use connection::{Database, OPTIONAL_TABLES};
pub use queries::{function_node_id, module_node_id, type_node_id, KNOWN_TABLES};
