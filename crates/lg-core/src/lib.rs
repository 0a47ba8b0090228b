#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod gallery;
pub mod pending;
pub mod snap_key;
pub mod tags;
pub mod types;
