//! Std operating system abstraction layer for the datalogger.
//!
//! This provides the platform services the acquisition core needs on a host: a monotonic clock, a directory of
//! per-Session log files, and the network transports.

#![forbid(unsafe_code)]

pub mod net;
pub mod storage;
pub mod time;

/// Helper trait to convert errors into osal errors.
///
/// We cannot implement `From` as that would be part of the public API.
pub(crate) trait IntoOsalError<E>
where
    E: core::error::Error,
{
    /// Converts the error into an OSAL error.
    fn into_osal_error(self) -> E;
}
