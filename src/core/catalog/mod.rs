mod connection;
mod http;
mod memory;

pub use connection::*;
pub use http::HttpCatalogConnection;
pub use memory::MemoryCatalog;
