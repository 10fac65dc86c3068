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

//! This crate provides [`TokioUdpTransport`]\: an asynchronous,
//! [Tokio][]-based implementation of the
//! [`MessageTransport`][coap_exchange::MessageTransport] trait from
//! [`coap-exchange`][coap_exchange], for use with
//! [`ExchangeChannel`][coap_exchange::ExchangeChannel].
//!
//! The exchange core deals in already-parsed messages, so the transport is
//! parameterized by the encoder that turns a
//! [`Message`][coap_exchange::message::Message] into datagram bytes.
//!
//! # Example
//!
//! ```no_run
//! use coap_exchange::prelude::*;
//! use coap_exchange_tokio::TokioUdpTransport;
//! use std::sync::Arc;
//!
//! # fn encode(message: &Message) -> Result<Vec<u8>, coap_exchange::Error> {
//! #     Ok(message.payload().to_vec())
//! # }
//! #
//! #[tokio::main]
//! async fn main() {
//!     let transport = TokioUdpTransport::bind("[::]:0", encode)
//!         .await
//!         .expect("UDP bind failed");
//!
//!     let scheduler = Scheduler::new().expect("scheduler start failed");
//!     let channel = ExchangeChannel::new(transport, scheduler);
//!
//!     // Drive a receive loop over the same socket and feed decoded
//!     // messages into `channel.handle_inbound(..)`.
//! }
//! ```
//!
//! [Tokio]: https://tokio.rs/

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![warn(missing_docs)]

mod tokio_udp_transport;
pub use tokio_udp_transport::TokioUdpTransport;
