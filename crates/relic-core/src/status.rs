// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The fixed status-code vocabulary exposed by every scene-graph operation.

use crate::renderer::error::RenderError;
use std::fmt;

/// Outcome code of a scene-graph call, mirroring the legacy return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The call succeeded.
    Ok,
    /// The call failed for a reason not covered by the other codes.
    GenericFailure,
    /// An argument was out of range or malformed.
    InvalidParameter,
    /// The referenced item is not present.
    NotFound,
}

/// A failed scene-graph call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RmError {
    /// The call failed for a reason not covered by the other codes.
    GenericFailure,
    /// An argument was out of range or malformed.
    InvalidParameter,
    /// The referenced item is not present.
    NotFound,
}

/// Result type of every scene-graph operation.
pub type RmResult<T> = Result<T, RmError>;

impl RmError {
    /// Returns the status code carried by this error.
    pub fn status(self) -> Status {
        match self {
            RmError::GenericFailure => Status::GenericFailure,
            RmError::InvalidParameter => Status::InvalidParameter,
            RmError::NotFound => Status::NotFound,
        }
    }
}

impl Status {
    /// Collapses a result into its status code.
    pub fn of<T>(result: &RmResult<T>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

impl fmt::Display for RmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RmError::GenericFailure => write!(f, "Generic failure."),
            RmError::InvalidParameter => write!(f, "Invalid parameter."),
            RmError::NotFound => write!(f, "Object not found."),
        }
    }
}

impl std::error::Error for RmError {}

impl From<RenderError> for RmError {
    fn from(err: RenderError) -> Self {
        log::error!("Render call failed: {err}");
        RmError::GenericFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of_result() {
        let ok: RmResult<u32> = Ok(3);
        assert_eq!(Status::of(&ok), Status::Ok);
        let err: RmResult<u32> = Err(RmError::NotFound);
        assert_eq!(Status::of(&err), Status::NotFound);
    }

    #[test]
    fn test_render_error_maps_to_generic_failure() {
        let err: RmError = RenderError::DeviceLost.into();
        assert_eq!(err, RmError::GenericFailure);
        assert_eq!(format!("{err}"), "Generic failure.");
    }
}
