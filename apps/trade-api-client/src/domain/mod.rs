//! Domain Layer - Request builders and stream types.
//!
//! This layer contains the client's own vocabulary, independent of the wire
//! contract. Conversion to and from protobuf messages lives in
//! `infrastructure::grpc`.

/// Exchange segments and instrument directory entries.
pub mod instruments;

/// Order, stop-order and portfolio request builders.
pub mod orders;

/// Event kinds and stream lifecycle.
pub mod streaming;

/// Subscribe/unsubscribe commands.
pub mod subscription;
