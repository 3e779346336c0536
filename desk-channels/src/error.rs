use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http error: {0}")]
    Http(String),

    #[error("send rejected: status={status} body={body}")]
    Rejected { status: u16, body: String },

    #[error("inbound queue closed: {0}")]
    QueueClosed(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}
