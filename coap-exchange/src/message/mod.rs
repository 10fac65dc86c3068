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

//! Types describing the CoAP messages the exchange core observes.
//!
//! The core deals in already-parsed messages; encoding and decoding the
//! wire format is the responsibility of the surrounding codec layer.

use std::fmt::{Display, Formatter};

/// Type for representing a CoAP message id.
pub type MsgId = u16;

mod msg_code;
pub use msg_code::MsgCode;
pub use msg_code::MsgCodeClass;

mod msg_type;
pub use msg_type::MsgType;

mod token;
pub use token::Token;

/// Observe option value that registers an observation (RFC 7641).
pub const OBSERVE_REGISTER: u32 = 0;

/// Observe option value that deregisters an observation (RFC 7641).
pub const OBSERVE_DEREGISTER: u32 = 1;

const OBSERVE_SEQ_MASK: u32 = 0x00FF_FFFF;

/// An owned, already-parsed CoAP message as seen by the exchange core.
///
/// Only the header fields the core acts on are modeled: message id, token,
/// type, code, the observe sequence number, and the (opaque) payload.
/// Everything else a full message carries travels inside `payload` from the
/// core's point of view.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    msg_id: Option<MsgId>,
    token: Token,
    msg_type: MsgType,
    code: MsgCode,
    observe: Option<u32>,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a new message with the given type and code, no message id,
    /// and an empty token and payload.
    pub fn new(msg_type: MsgType, code: MsgCode) -> Message {
        Message {
            msg_id: None,
            token: Token::EMPTY,
            msg_type,
            code,
            observe: None,
            payload: Vec::new(),
        }
    }

    /// Creates a CoAP ping: a confirmable message with the empty code.
    pub fn ping() -> Message {
        Message::new(MsgType::Con, MsgCode::Empty)
    }

    /// Creates a request with the given method code.
    pub fn request(msg_type: MsgType, code: MsgCode) -> Message {
        debug_assert!(code.is_method());
        Message::new(msg_type, code)
    }

    /// Creates a response with the given response code and token.
    pub fn response(msg_type: MsgType, code: MsgCode, token: Token) -> Message {
        debug_assert!(code.is_response());
        let mut msg = Message::new(msg_type, code);
        msg.token = token;
        msg
    }

    /// Returns the message id, or `None` if no id has been assigned yet.
    pub fn msg_id(&self) -> Option<MsgId> {
        self.msg_id
    }

    /// Assigns or clears the message id.
    pub fn set_msg_id(&mut self, msg_id: Option<MsgId>) {
        self.msg_id = msg_id;
    }

    /// Returns the token.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Replaces the token.
    pub fn set_token(&mut self, token: Token) {
        self.token = token;
    }

    /// Returns the message type.
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    /// Returns the message code.
    pub fn code(&self) -> MsgCode {
        self.code
    }

    /// Returns the value of the observe option, if present.
    pub fn observe(&self) -> Option<u32> {
        self.observe
    }

    /// Sets the value of the observe option.
    pub fn set_observe(&mut self, observe: Option<u32>) {
        self.observe = observe.map(|x| x & OBSERVE_SEQ_MASK);
    }

    /// Advances the observe sequence number by one, wrapping within the
    /// 24-bit option space. No-op if the option is absent.
    pub fn bump_observe(&mut self) {
        if let Some(seq) = self.observe {
            self.observe = Some((seq + 1) & OBSERVE_SEQ_MASK);
        }
    }

    /// Returns the payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replaces the payload bytes.
    pub fn set_payload<P: Into<Vec<u8>>>(&mut self, payload: P) {
        self.payload = payload.into();
    }

    /// Builder-style helper to attach a token.
    pub fn with_token(mut self, token: Token) -> Message {
        self.token = token;
        self
    }

    /// Builder-style helper to attach an observe option value.
    pub fn with_observe(mut self, observe: u32) -> Message {
        self.set_observe(Some(observe));
        self
    }

    /// Builder-style helper to attach a payload.
    pub fn with_payload<P: Into<Vec<u8>>>(mut self, payload: P) -> Message {
        self.payload = payload.into();
        self
    }

    /// Returns true if this message is a CoAP ping: confirmable with the
    /// empty code.
    pub fn is_ping(&self) -> bool {
        self.msg_type.is_con() && self.code.is_empty()
    }

    /// Returns true if this message carries a request method code.
    pub fn is_request(&self) -> bool {
        self.code.is_method()
    }

    /// Returns true if this message carries a response code.
    pub fn is_response(&self) -> bool {
        self.code.is_response()
    }

    /// Returns true if this message is an update notification: a response
    /// carrying an observe sequence number (RFC 7641).
    pub fn is_update_notification(&self) -> bool {
        self.is_response() && self.observe.is_some()
    }

    /// Returns true if this message carries an error response code.
    pub fn is_error_response(&self) -> bool {
        self.code.is_error()
    }

    /// Returns true if this message carries the empty code.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {:?} MID:{} TOK:{}",
            self.msg_type,
            self.code,
            match self.msg_id {
                Some(id) => format!("{:04X}", id),
                None => "----".to_string(),
            },
            self.token,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_shape() {
        let ping = Message::ping();
        assert!(ping.is_ping());
        assert!(!ping.is_request());
        assert!(!ping.is_response());
        assert!(ping.token().is_empty());
        assert_eq!(ping.msg_id(), None);
    }

    #[test]
    fn notification_predicates() {
        let notif = Message::response(MsgType::Con, MsgCode::SuccessContent, Token::from(1u8))
            .with_observe(5);
        assert!(notif.is_response());
        assert!(notif.is_update_notification());
        assert!(!notif.is_error_response());

        let plain = Message::response(MsgType::Ack, MsgCode::SuccessContent, Token::from(1u8));
        assert!(!plain.is_update_notification());

        let error = Message::response(MsgType::Ack, MsgCode::ClientErrorNotFound, Token::from(1u8));
        assert!(error.is_error_response());
    }

    #[test]
    fn observe_bump_wraps() {
        let mut notif = Message::response(MsgType::Con, MsgCode::SuccessContent, Token::from(1u8))
            .with_observe(OBSERVE_SEQ_MASK);
        notif.bump_observe();
        assert_eq!(notif.observe(), Some(0));

        let mut plain = Message::response(MsgType::Ack, MsgCode::SuccessContent, Token::from(1u8));
        plain.bump_observe();
        assert_eq!(plain.observe(), None);
    }
}
