//! The datalogger operating system abstraction layer API.
//!
//! Everything the acquisition core needs from the platform goes through the traits in this crate:
//!
//! - [`time`]: a monotonic millisecond tick.
//! - [`storage`]: the append-only medium persisted logs are written to.
//! - [`net`]: the transports readings are republished over (serial, BLE SPP, TCP).
//!
//! Implementations live in platform crates such as `datalogger-osal-std`.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod net;
pub mod storage;
pub mod time;

pub use net::NetError;
pub use storage::StorageError;
