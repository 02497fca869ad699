pub mod client;
pub mod session;
pub mod wire;

pub use client::ChatClient;
