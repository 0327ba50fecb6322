//! Integration tests for Chord rings
//!
//! The `integration` module holds the harness; scenarios live under `tests/`.

pub mod integration;
