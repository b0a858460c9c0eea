//! gRPC Transport Adapter
//!
//! Binds the client to the broker's generated gRPC contract.
//!
//! # Architecture
//!
//! - `channel`: one lazily connected `tonic` channel per client, with the
//!   access token attached by an interceptor
//! - `convert`: domain request builders to protobuf messages and back
//! - `error`: `TradeApiError`, the failure type of every public call
//! - `client`: `TradeApiClient`, the public façade over unary calls and the
//!   event stream

pub mod channel;
pub mod client;
pub mod convert;
pub mod error;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod contract {
    /// Message types (`proto.tradeapi.v1`).
    pub mod proto {
        pub mod tradeapi {
            pub mod v1 {
                include!(concat!(env!("OUT_DIR"), "/proto.tradeapi.v1.rs"));
            }
        }
    }

    /// Service stubs (`grpc.tradeapi.v1`).
    pub mod grpc {
        pub mod tradeapi {
            pub mod v1 {
                include!(concat!(env!("OUT_DIR"), "/grpc.tradeapi.v1.rs"));
            }
        }
    }
}

pub use client::TradeApiClient;
pub use contract::grpc::tradeapi::v1 as services;
pub use contract::proto::tradeapi::v1 as proto;
pub use error::TradeApiError;
