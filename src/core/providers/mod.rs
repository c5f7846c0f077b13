mod error;
mod pingidentity;

pub use error::*;
pub use pingidentity::*;
