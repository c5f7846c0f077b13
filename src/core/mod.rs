pub mod catalog;
pub mod ids;
pub mod models;
pub mod observability;
pub mod pingidentity;
pub mod providers;
pub mod scheduler;
