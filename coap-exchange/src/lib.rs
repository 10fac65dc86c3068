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

//! The client-side message-exchange core of the Constrained Application
//! Protocol (CoAP, [RFC 7252]).
//!
//! This crate turns a request into a reliable, correlated exchange with a
//! remote CoAP endpoint and routes the server's responses — including
//! [RFC 7641] observe notifications — back to the originator. It owns three
//! tightly coupled jobs:
//!
//! 1. **Message-ID assignment and lifecycle**: unique 16-bit ids per remote
//!    endpoint, retired only after `EXCHANGE_LIFETIME` has passed.
//! 2. **Reliable transmission of confirmable messages**: retransmissions
//!    with exponential back-off and jitter, cancellation on ACK/RST, and
//!    timeout reporting.
//! 3. **Callback dispatch**: correlating inbound responses to the pending
//!    request via `(remote socket, token)` and surfacing protocol events
//!    (empty ACK, RST, retransmission, timeout) to the caller.
//!
//! What this crate deliberately does *not* do: encode or decode the wire
//! format, own the UDP socket, process options or block-wise transfers, or
//! serve requests. The channel consumes and produces already-parsed
//! [`Message`](message::Message) values; the outbound half of the wire is
//! abstracted behind
//! [`MessageTransport`] (see the `coap-exchange-tokio` crate for a
//! UDP-backed implementation), and the inbound half is whatever receive
//! loop calls [`ExchangeChannel::handle_inbound`].
//!
//! # Overview
//!
//! ```no_run
//! use coap_exchange::prelude::*;
//! use std::sync::Arc;
//!
//! struct LogResponse;
//!
//! impl ClientCallback for LogResponse {
//!     fn on_response(&self, response: Message) {
//!         println!("<< {}", response);
//!     }
//!
//!     fn on_timeout(&self) {
//!         println!("request timed out");
//!     }
//! }
//!
//! // One scheduler is shared by every channel of a client.
//! let scheduler = Scheduler::new().expect("scheduler start failed");
//! let channel = ExchangeChannel::new(NullTransport::new(), scheduler);
//!
//! // Confirmable GET; the channel assigns the message id and the token.
//! let request = Message::request(MsgType::Con, MsgCode::MethodGet);
//! let remote = "10.0.0.1:5683".parse().unwrap();
//! channel.send_request(request, remote, Arc::new(LogResponse));
//!
//! // Meanwhile, the receive loop feeds parsed datagrams back in:
//! // channel.handle_inbound(message, source);
//! ```
//!
//! [RFC 7252]: https://tools.ietf.org/html/rfc7252
//! [RFC 7641]: https://tools.ietf.org/html/rfc7641

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod message;

mod error;
pub use error::*;

mod trans_params;
pub use trans_params::*;

mod events;
pub use events::*;

mod scheduler;
pub use scheduler::*;

mod transport;
pub use transport::*;

mod msg_id_factory;
pub use msg_id_factory::MessageIdFactory;

mod token_factory;
pub use token_factory::TokenFactory;

mod callback;
pub use callback::*;

mod callback_manager;
pub use callback_manager::CallbackError;

mod reliability;
pub use reliability::Disposition;

mod channel;
pub use channel::*;

#[doc(hidden)]
pub mod prelude {
    pub use super::message::{Message, MsgCode, MsgId, MsgType, Token};

    pub use super::ClientCallback;
    pub use super::Disposition;
    pub use super::ExchangeChannel;
    pub use super::ExchangeEvent;
    pub use super::MessageTransport;
    pub use super::NullTransport;
    pub use super::Scheduler;
    pub use super::StandardParams;
    pub use super::TransParams;
}
