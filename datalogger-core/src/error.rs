use crate::config::ConfigError;
use crate::reading::SourceKind;

/// Errors while assembling a [`Datalogger`](crate::Datalogger).
///
/// Once running, the logger contains every subsystem failure at its boundary and reports it through
/// [`Stats`](crate::stats::Stats) instead of returning errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// The configuration snapshot is unusable.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// A source was installed for a capability the configuration disables.
    #[error("the {0} source is disabled in the configuration")]
    SourceDisabled(SourceKind),

    /// A second source was installed for the same capability.
    #[error("a {0} source is already installed")]
    DuplicateSource(SourceKind),

    /// A publish target was added that the configuration disables.
    #[error("the {0} publish target is disabled in the configuration")]
    TargetDisabled(&'static str),

    /// Sources and targets can only be added before [`Datalogger::start`](crate::Datalogger::start).
    #[error("the datalogger is already running")]
    AlreadyStarted,
}
