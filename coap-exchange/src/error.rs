// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use std::fmt::{Debug, Display, Formatter};

/// Type for errors encountered while moving CoAP messages through the
/// exchange core.
///
/// Note that most failures never surface as a returned `Error`: the core
/// reports them to the originating [`ClientCallback`][crate::ClientCallback]
/// as typed events instead.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Error {
    /// One or more of the supplied arguments are not valid for the given operation.
    InvalidArgument,

    /// The message-ID space for the remote endpoint is saturated.
    NoMessageId,

    /// The token pool is exhausted.
    NoToken,

    /// An I/O error occurred while writing to the underlying transport.
    IOError,

    /// This operation has been cancelled.
    Cancelled,

    /// The transaction was reset by the remote endpoint.
    Reset,

    /// A confirmable message exhausted its retransmissions.
    ResponseTimeout,

    /// An unspecified error has occurred.
    Unspecified,
}

impl std::convert::From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::IOError
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        <Self as Debug>::fmt(self, f)
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::Unspecified
    }
}
