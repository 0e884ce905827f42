use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, ErrorKind};

/// Progress of an asynchronous operation as reported by a last-operation poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::InProgress => "in progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationState::InProgress)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in progress" => Ok(OperationState::InProgress),
            "succeeded" => Ok(OperationState::Succeeded),
            "failed" => Ok(OperationState::Failed),
            other => Err(Error::new(ErrorKind::Validation)
                .with_message(format!("unknown operation state '{other}'"))),
        }
    }
}
