//! Application Services
//!
//! - `InstrumentDirectory`: cached lookup of instruments by board and code

mod instrument_directory;

pub use instrument_directory::{DirectoryError, InstrumentDirectory};
