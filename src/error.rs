//! Error types for request intake, allocation and configuration.
//!
//! Cancelling an unknown or unbooked request is not an error; see
//! [`crate::CancellationOutcome`].

use thiserror::Error;

use crate::RequestId;

pub type Result<T> = std::result::Result<T, BookingError>;

#[derive(Error, Debug)]
pub enum BookingError {
    /// Route codes name exactly two stations, e.g. `AC`
    #[error("Invalid route '{0}': expected two station codes such as AB")]
    MalformedRouteCode(String),

    #[error("Unknown station '{0}'")]
    UnknownStation(String),

    #[error("Invalid member count {0}: must be greater than zero")]
    InvalidMembers(i64),

    #[error("Invalid fare per section {0}: must be greater than zero")]
    InvalidFareRate(f64),

    /// Allocation was asked for before any group was added
    #[error("No groups to allocate")]
    NoRequests,

    #[error("Duplicate request id {0}")]
    DuplicateRequestId(RequestId),

    /// The id counter cannot move past the last representable id
    #[error("No request ids left to issue")]
    RequestIdsExhausted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
