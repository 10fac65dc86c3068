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

use crate::message::{MsgId, Token};
use std::net::SocketAddr;

/// Events emitted while a message exchange progresses.
///
/// Events travel the channel pipeline synchronously: the reliability engine
/// terminates transfers on the events that end an exchange, the callback
/// manager translates every event into the matching
/// [`ClientCallback`][crate::ClientCallback] invocation, and an optional
/// observer installed on the channel sees each event last.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    /// A message id was assigned to an outbound message.
    MessageIdAssigned {
        /// The remote endpoint the message is addressed to.
        remote: SocketAddr,
        /// The id that was assigned.
        msg_id: MsgId,
        /// The token of the exchange.
        token: Token,
    },

    /// A confirmable message was rewritten to the wire.
    MessageRetransmitted {
        /// The remote endpoint the copy was sent to.
        remote: SocketAddr,
        /// The message id of the retransmitted message.
        msg_id: MsgId,
        /// The token of the exchange.
        token: Token,
    },

    /// An empty acknowledgement arrived; the response will follow
    /// separately under the same token.
    EmptyAckReceived {
        /// The remote endpoint that acknowledged.
        remote: SocketAddr,
        /// The message id that was acknowledged.
        msg_id: MsgId,
        /// The token of the exchange.
        token: Token,
    },

    /// The remote endpoint reset the exchange.
    ResetReceived {
        /// The remote endpoint that sent the reset.
        remote: SocketAddr,
        /// The message id the reset refers to.
        msg_id: MsgId,
        /// The token of the exchange.
        token: Token,
    },

    /// A confirmable message exhausted its retransmissions without being
    /// acknowledged.
    TransmissionTimeout {
        /// The remote endpoint that never acknowledged.
        remote: SocketAddr,
        /// The message id of the timed-out message.
        msg_id: MsgId,
        /// The token of the exchange.
        token: Token,
    },

    /// The exchange failed for a reason described in `description`.
    MiscError {
        /// The remote endpoint of the failed exchange.
        remote: SocketAddr,
        /// The message id, if one had been assigned.
        msg_id: Option<MsgId>,
        /// The token of the exchange.
        token: Token,
        /// Human-readable failure description.
        description: String,
    },

    /// A block of a larger representation arrived; reassembly continues
    /// outside the core.
    PartialContentReceived {
        /// The remote endpoint the block came from.
        remote: SocketAddr,
        /// The message id of the block, if known.
        msg_id: Option<MsgId>,
        /// The token of the exchange.
        token: Token,
    },

    /// The remote endpoint of an ongoing exchange moved to a new socket
    /// address (e.g. after a connection-oriented handshake migrated).
    RemoteSocketChanged {
        /// The address the exchange is now bound to.
        remote: SocketAddr,
        /// The address the exchange was previously bound to.
        previous: SocketAddr,
        /// The token of the exchange.
        token: Token,
    },

    /// The application declined to continue an observation; the
    /// observation-termination layer outside the core sends the actual
    /// cancellation.
    LazyObservationTermination {
        /// The remote endpoint being observed.
        remote: SocketAddr,
        /// The token of the observation.
        token: Token,
    },
}

impl ExchangeEvent {
    /// Returns the token of the exchange this event belongs to.
    pub fn token(&self) -> Token {
        match self {
            ExchangeEvent::MessageIdAssigned { token, .. }
            | ExchangeEvent::MessageRetransmitted { token, .. }
            | ExchangeEvent::EmptyAckReceived { token, .. }
            | ExchangeEvent::ResetReceived { token, .. }
            | ExchangeEvent::TransmissionTimeout { token, .. }
            | ExchangeEvent::MiscError { token, .. }
            | ExchangeEvent::PartialContentReceived { token, .. }
            | ExchangeEvent::RemoteSocketChanged { token, .. }
            | ExchangeEvent::LazyObservationTermination { token, .. } => *token,
        }
    }

    /// Returns the remote endpoint this event refers to.
    pub fn remote(&self) -> SocketAddr {
        match self {
            ExchangeEvent::MessageIdAssigned { remote, .. }
            | ExchangeEvent::MessageRetransmitted { remote, .. }
            | ExchangeEvent::EmptyAckReceived { remote, .. }
            | ExchangeEvent::ResetReceived { remote, .. }
            | ExchangeEvent::TransmissionTimeout { remote, .. }
            | ExchangeEvent::MiscError { remote, .. }
            | ExchangeEvent::PartialContentReceived { remote, .. }
            | ExchangeEvent::RemoteSocketChanged { remote, .. }
            | ExchangeEvent::LazyObservationTermination { remote, .. } => *remote,
        }
    }
}
