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

use crate::message::Message;
use crate::Error;
use futures::future::BoxFuture;
use futures::prelude::*;
use std::net::SocketAddr;

/// The outbound half of the wire: something that can take an
/// already-parsed [`Message`] and deliver it to a remote endpoint.
///
/// Encoding the message and owning the socket are the implementor's
/// business; the core only awaits the outcome of the write. See
/// `coap-exchange-tokio` for a UDP-backed implementation.
pub trait MessageTransport: Send + Sync + 'static {
    /// Writes `message` to `dest`, resolving once the datagram has been
    /// handed to the network (or failed to be).
    fn send_message(&self, message: &Message, dest: SocketAddr) -> BoxFuture<'static, Result<(), Error>>;
}

/// A [`MessageTransport`] that accepts and silently discards every write.
///
/// Useful as a stand-in during tests: from the core's point of view a
/// `NullTransport` behaves exactly like a remote that never answers.
#[derive(Debug, Default)]
pub struct NullTransport;

impl NullTransport {
    /// Creates a new instance of [`NullTransport`].
    pub fn new() -> NullTransport {
        NullTransport
    }
}

impl MessageTransport for NullTransport {
    fn send_message(&self, _message: &Message, _dest: SocketAddr) -> BoxFuture<'static, Result<(), Error>> {
        future::ready(Ok(())).boxed()
    }
}
