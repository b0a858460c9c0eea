//! Port Interfaces
//!
//! Driven ports the application layer depends on. The gRPC client in
//! `infrastructure::grpc` is the production adapter for each of them.

mod instrument_source_port;

pub use instrument_source_port::{InstrumentSource, InstrumentSourceError};

#[cfg(test)]
pub use instrument_source_port::MockInstrumentSource;
