pub mod cli;
pub mod client;
pub mod codec;
pub mod controller;
pub mod crypto;
pub mod peers;
pub mod transport;
pub mod utils;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
