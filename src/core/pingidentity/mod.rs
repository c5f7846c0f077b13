mod client;
mod read;

pub use client::*;
pub use read::*;
