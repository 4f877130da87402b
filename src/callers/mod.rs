//! [`HttpCaller`](crate::HttpCaller) implementations.

pub mod rest;

#[cfg(feature = "mock")]
pub mod mock;
