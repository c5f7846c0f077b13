pub mod entity;
pub mod pingidentity;
