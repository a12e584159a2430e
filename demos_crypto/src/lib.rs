#[macro_use]
extern crate serde;

mod audit;
mod ballot;
mod combine;
mod dispatch;
mod error;
mod group;
mod jobs;
mod key;
mod queue;
mod request;
mod serde_hex;
mod server;
mod store;
mod tally;
mod transport;
mod zk;

pub mod codec;
pub mod wire;

pub use audit::*;
pub use ballot::*;
pub use combine::*;
pub use dispatch::*;
pub use error::*;
pub use group::*;
pub use jobs::*;
pub use key::*;
pub use queue::*;
pub use request::*;
pub use serde_hex::*;
pub use server::*;
pub use store::*;
pub use tally::*;
pub use transport::*;
pub use zk::*;

#[cfg(test)]
mod tests;
