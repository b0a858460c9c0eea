//! Application Layer - Services and port definitions.
//!
//! This layer contains the application services and the port interfaces
//! that decouple them from the gRPC transport.

/// Port interfaces for external systems.
pub mod ports;

/// Application services built on the ports.
pub mod services;
