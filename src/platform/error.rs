use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already a member of this channel")]
    AlreadyMember,
    #[error("joined too many channels")]
    TooManyChannels,
    #[error("channel is private or access is forbidden")]
    PrivateForbidden,
    #[error("join request already sent and pending approval")]
    InviteAlreadyPending,
    #[error("invite is invalid or expired: {0}")]
    InviteInvalid(String),
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    /// Join outcomes that mean "nothing to do" rather than a failure.
    pub fn is_benign_join(&self) -> bool {
        matches!(self, Self::AlreadyMember | Self::InviteAlreadyPending)
    }
}
