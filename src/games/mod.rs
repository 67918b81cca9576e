//! Bundled game implementations.
//!
//! The search, self-play driver and reservoir are generic over
//! [`GamePosition`](crate::GamePosition); the games here exist so the
//! binaries run out of the box and so the full pipeline can be exercised in
//! tests without an external rules engine.

pub mod tictactoe;
