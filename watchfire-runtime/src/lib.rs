//! Watchfire Runtime
//!
//! Runs the scorers against a feed:
//! - `worker`: offload units on dedicated threads
//! - `offload`: correlated request/response bridge to the units
//! - `feed`: snapshot types and the `FeedSource` trait
//! - `engine`: the refresh cycle and run loop

pub mod engine;
pub mod feed;
pub mod offload;
pub mod worker;

pub use engine::*;
pub use feed::*;
pub use offload::*;
pub use worker::*;
