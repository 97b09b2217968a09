pub mod types;
pub mod utils;
pub mod wire;

pub use types::*;
pub use wire::{Envelope, InboundMessage};
