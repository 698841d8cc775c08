use std::fmt;

use crate::types::ActivityId;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Timeout,
    Decode(String),
    ZoneNotFound(String),
    ActivityNotFound { zone: String, activity: ActivityId },
    Schedule(String),
    StaleData,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Timeout => write!(f, "request timed out"),
            Error::Decode(msg) => write!(f, "malformed document: {msg}"),
            Error::ZoneNotFound(id) => write!(f, "zone not found: {id}"),
            Error::ActivityNotFound { zone, activity } => {
                write!(f, "zone {zone} has no activity {activity}")
            }
            Error::Schedule(msg) => write!(f, "schedule data error: {msg}"),
            Error::StaleData => write!(f, "no config snapshot available"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
