pub mod config_load;
pub mod connect;
pub mod observability;
pub mod providers;
pub mod scheduler;
