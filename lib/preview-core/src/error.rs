use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid proxy configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported origin scheme: {0}")]
    UnsupportedScheme(String),
}
