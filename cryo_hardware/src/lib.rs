//! Transports for the cryostat coordination engine.
//!
//! The wire protocol to physical sub-controllers lives outside this workspace;
//! this crate carries the transport error type and a simulated cryostat used
//! by the CLI and by integration tests.
pub mod error;
pub mod sim;

pub use error::TransportError;
pub use sim::{
    Interlock, SimAxisCfg, SimCfg, SimCommand, SimulatedAxis, SimulatedChannel, SimulatedCryostat,
    default_interlocks,
};
