//! Provider specific [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Each submodule offers a concrete client that speaks a particular vendor's
//! API while conforming to the uniform colloquy contract.

pub mod common;

pub mod openai;
