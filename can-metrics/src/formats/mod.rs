//! Recording parsers
//!
//! Each parser implements an iterator pattern over `Result<RawFrame>`, so
//! recordings stream into the session decoder one frame at a time.

pub mod candump;

pub use candump::{CandumpFrameIterator, CandumpParser};
