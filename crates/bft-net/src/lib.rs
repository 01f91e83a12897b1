//! Transport for the BFT replica core: a framed, signed `Channel` (spec
//! §4.A, §6.3) and the replica fan-out/batching layer built on top of it
//! (spec §4.B).

pub mod channel;
pub mod communicator;
pub mod error;

pub use channel::{Channel, SharedVerifier, TcpChannel, TcpListenerChannel};
pub use communicator::ReplicaCommunicator;
pub use error::{NetError, Result};
