use thiserror::Error;

/// Errors surfaced by pool operations and the platform gateway.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The platform connection failed or dropped. Recovered automatically
    /// by the supervisor's restart loop unless the pool is shutting down.
    #[error("connection failure: {0}")]
    Connection(String),

    /// A command's target channel does not exist. This is a
    /// platform-state inconsistency, surfaced as a hard failure to the
    /// invoking code path rather than retried.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The resolved channel exists but cannot carry text.
    #[error("not a text channel: {0}")]
    NotATextChannel(String),
}
