use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never completed or the server answered with an
    /// unexpected status. Recoverable: sends surface this as a `Failed`
    /// pending entry, the lease logs it and tries again next interval.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected the token. Terminal for the session.
    #[error("authentication rejected")]
    Unauthorized,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
