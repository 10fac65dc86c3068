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

use crate::message::{Message, MsgId};
use std::net::SocketAddr;

/// The capability set a caller hands to
/// [`ExchangeChannel::send_request`][crate::ExchangeChannel::send_request].
///
/// All methods are invoked on scheduler threads. Apart from
/// [`on_response`][ClientCallback::on_response] every method has an empty
/// default implementation, so a minimal client only implements the one
/// method it cares about.
///
/// Exactly one *terminal* notification ends the exchange: the final
/// response, [`on_reset`][ClientCallback::on_reset],
/// [`on_timeout`][ClientCallback::on_timeout], or
/// [`on_misc_error`][ClientCallback::on_misc_error]. After a terminal
/// notification the callback is deregistered and no further methods are
/// invoked.
pub trait ClientCallback: Send + Sync {
    /// A response arrived for the request this callback was registered
    /// with. For observations this is invoked once per delivered update
    /// notification.
    fn on_response(&self, response: Message);

    /// The request was acknowledged with an empty ACK; the actual response
    /// will arrive separately under the same token.
    fn on_empty_ack(&self) {}

    /// The remote endpoint reset the exchange.
    fn on_reset(&self) {}

    /// The confirmable request was retransmitted `MAX_RETRANSMIT` times
    /// without an acknowledgement.
    fn on_timeout(&self) {}

    /// A retransmission of the confirmable request went out.
    fn on_retransmission(&self) {}

    /// The outbound message was assigned the given message id.
    fn on_message_id_assigned(&self, _msg_id: MsgId) {}

    /// The exchange failed; `description` says why.
    fn on_misc_error(&self, _description: &str) {}

    /// The remote endpoint of this exchange moved to a new socket address.
    fn on_remote_socket_changed(&self, _remote: SocketAddr, _previous: SocketAddr) {}

    /// A block of a larger representation arrived; the exchange continues.
    fn on_partial_content(&self) {}

    /// Asked before each non-terminal update notification is delivered.
    /// Returning `false` asks the observation layer to cancel the
    /// observation.
    fn continue_observation(&self) -> bool {
        false
    }
}
