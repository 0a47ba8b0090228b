#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod time;
