//! The per-connection voice pipeline: protocol types, the session state
//! machine, and the three supervised backend legs.

pub mod bridge;
pub mod generate;
pub mod protocol;
pub mod session;
pub mod synth;
pub mod transcribe;

pub use session::ws_handler;
