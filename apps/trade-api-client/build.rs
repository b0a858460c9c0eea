//! Build Script for Trade API Client
//!
//! Generates Rust protobuf stubs from the workspace proto contract.
//!
//! # Panics Policy
//!
//! Build scripts use `.expect()` and panic on failure: there is no caller
//! to propagate errors to, and a missing prerequisite must halt the build.
#![allow(clippy::expect_used)]

use std::{env, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Emit cfg for coverage detection
    if env::var("CARGO_LLVM_COV").is_ok()
        || env::var("LLVM_PROFILE_FILE").is_ok()
        || env::var("RUSTFLAGS")
            .map(|f| f.contains("instrument-coverage"))
            .unwrap_or(false)
    {
        println!("cargo:rustc-cfg=coverage");
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let proto_root = manifest_dir.join("../../packages/proto");
    println!("cargo:rerun-if-changed={}", proto_root.display());

    let proto_files = [
        "proto/tradeapi/v1/common.proto",
        "proto/tradeapi/v1/events.proto",
        "proto/tradeapi/v1/orders.proto",
        "proto/tradeapi/v1/portfolios.proto",
        "proto/tradeapi/v1/security.proto",
        "proto/tradeapi/v1/stops.proto",
        "grpc/tradeapi/v1/events.proto",
        "grpc/tradeapi/v1/orders.proto",
        "grpc/tradeapi/v1/portfolios.proto",
        "grpc/tradeapi/v1/securities.proto",
        "grpc/tradeapi/v1/stops.proto",
    ]
    .map(|relative| proto_root.join(relative));

    for proto in &proto_files {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    // Vendored protoc keeps the build independent of a system installation.
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("vendored protoc is available");
    // SAFETY: the build script is single-threaded at this point.
    unsafe {
        env::set_var("PROTOC", protoc);
    }
    let well_known_types =
        protoc_bin_vendored::include_path().expect("vendored protoc include path is available");

    tonic_prost_build::configure()
        .build_client(true)
        // Server stubs back the in-process mock broker used by integration tests.
        .build_server(true)
        .compile_protos(&proto_files, &[proto_root, well_known_types])
        .expect("Failed to compile protobuf definitions");
}
