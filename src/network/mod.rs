//! Framed TCP transport: the sender server and the receiver client

pub mod receiver;
pub mod server;
pub mod session;

pub use receiver::{Receiver, ReceiverConfig, ReceiverHandler};
pub use server::{Source, SourceConfig};
pub use session::Session;
