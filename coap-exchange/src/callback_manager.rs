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

use crate::callback::ClientCallback;
use crate::channel::ExchangeInner;
use crate::events::ExchangeEvent;
use crate::message::{Message, Token, OBSERVE_DEREGISTER};
use crate::reliability::Disposition;
use crate::token_factory::TokenFactory;
use crate::trans_params::TransParams;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// Failure modes of registering a callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CallbackError {
    /// A callback is already registered for this `(remote, token)` pair.
    TokenInUse,
}

/// Routes inbound responses and exchange events to the
/// [`ClientCallback`] that initiated the exchange, and owns the token
/// lifecycle around each registration.
pub(crate) struct CallbackManager {
    callbacks: RwLock<HashMap<(SocketAddr, Token), Arc<dyn ClientCallback>>>,
    token_factory: TokenFactory,
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let callbacks = self.callbacks.read().expect("callback table poisoned");
        f.debug_struct("CallbackManager")
            .field("callbacks", &callbacks.keys())
            .field("token_factory", &self.token_factory)
            .finish()
    }
}

impl CallbackManager {
    pub(crate) fn new(max_token_length: usize) -> CallbackManager {
        CallbackManager {
            callbacks: RwLock::new(HashMap::new()),
            token_factory: TokenFactory::new(max_token_length),
        }
    }

    /// The send task behind [`ExchangeChannel::send_request`] and
    /// [`ExchangeChannel::send_ping`]: resolves the token, registers the
    /// callback, and pushes the message through the outbound pipeline.
    ///
    /// [`ExchangeChannel::send_request`]: crate::ExchangeChannel::send_request
    /// [`ExchangeChannel::send_ping`]: crate::ExchangeChannel::send_ping
    pub(crate) async fn write_message_task<TP: TransParams>(
        channel: Arc<ExchangeInner<TP>>,
        mut message: Message,
        remote: SocketAddr,
        callback: Arc<dyn ClientCallback>,
    ) {
        let callbacks = channel.callbacks();
        let is_observation_cancel =
            message.is_request() && message.observe() == Some(OBSERVE_DEREGISTER);

        if message.is_ping() {
            // Pings use the empty token; only one may be in flight per remote.
            if callbacks.get(remote, Token::EMPTY).is_some() {
                callback.on_misc_error(&format!("There is another ongoing PING for {}", remote));
                return;
            }
            message.set_token(Token::EMPTY);
        } else if is_observation_cancel {
            // A request to stop an ongoing observation reuses the
            // observation's token, whose callback is already registered.
            if callbacks.get(remote, message.token()).is_none() {
                callback.on_misc_error(&format!(
                    "No ongoing observation on {} with token {}",
                    remote,
                    message.token()
                ));
                return;
            }
        } else {
            match callbacks.token_factory.acquire() {
                Some(token) => message.set_token(token),
                None => {
                    callback.on_misc_error(&format!("No token available for {}", remote));
                    return;
                }
            }
        }

        if !is_observation_cancel {
            if let Err(CallbackError::TokenInUse) =
                callbacks.add(remote, message.token(), callback.clone())
            {
                error!(
                    "Tried to use token twice (remote: {}, token: {})",
                    remote,
                    message.token()
                );
                return;
            }
        }

        if let Disposition::Continue =
            channel.reliability().handle_outbound(&mut message, remote, &channel)
        {
            if let Err(error) = channel.transport().send_message(&message, remote).await {
                error!("Could not write {} to {}: {}", message, remote, error);
                channel.dispatch_event(ExchangeEvent::MiscError {
                    remote,
                    msg_id: message.msg_id(),
                    token: message.token(),
                    description: format!("Message could not be sent ({})", error),
                });
            }
        }
    }

    /// Dispatches an inbound response to the callback registered for its
    /// token, deregistering the callback first when the response is
    /// terminal.
    pub(crate) fn handle_response<TP: TransParams>(
        &self,
        response: Message,
        remote: SocketAddr,
        channel: &Arc<ExchangeInner<TP>>,
    ) -> Disposition {
        let token = response.token();
        let callback = match self.get(remote, token) {
            Some(callback) => callback,
            None => {
                warn!(
                    "No callback found for response from {} (token: {})",
                    remote, token
                );
                return Disposition::Drop;
            }
        };

        if response.is_error_response() || !response.is_update_notification() {
            // This is the terminal response for the exchange.
            self.remove(remote, token);
        } else if !callback.continue_observation() {
            // The observation-termination layer outside the core sends the
            // actual cancellation and tears the callback down.
            channel.dispatch_event(ExchangeEvent::LazyObservationTermination { remote, token });
        }

        callback.on_response(response);
        Disposition::Drop
    }

    /// Translates pipeline events into callback invocations. Terminal
    /// events deregister the callback and return its token to the pool.
    pub(crate) fn handle_event(&self, event: &ExchangeEvent) {
        match event {
            ExchangeEvent::MessageIdAssigned {
                remote,
                msg_id,
                token,
            } => match self.get(*remote, *token) {
                Some(callback) => callback.on_message_id_assigned(*msg_id),
                None => warn!(
                    "No callback found for message-ID assignment (remote: {}, token: {})",
                    remote, token
                ),
            },

            ExchangeEvent::MessageRetransmitted { remote, token, .. } => {
                match self.get(*remote, *token) {
                    Some(callback) => callback.on_retransmission(),
                    None => warn!(
                        "No callback found for retransmission (remote: {}, token: {})",
                        remote, token
                    ),
                }
            }

            ExchangeEvent::EmptyAckReceived { remote, token, .. } => {
                match self.get(*remote, *token) {
                    // Separate-response mode: the callback stays registered
                    // until the actual response arrives.
                    Some(callback) => callback.on_empty_ack(),
                    None => warn!(
                        "No callback found for empty ACK (remote: {}, token: {})",
                        remote, token
                    ),
                }
            }

            ExchangeEvent::ResetReceived { remote, token, .. } => {
                match self.remove(*remote, *token) {
                    Some(callback) => callback.on_reset(),
                    None => warn!(
                        "No callback found for RST (remote: {}, token: {})",
                        remote, token
                    ),
                }
            }

            ExchangeEvent::TransmissionTimeout { remote, token, .. } => {
                match self.remove(*remote, *token) {
                    Some(callback) => callback.on_timeout(),
                    None => warn!(
                        "No callback found for timeout (remote: {}, token: {})",
                        remote, token
                    ),
                }
            }

            ExchangeEvent::MiscError {
                remote,
                token,
                description,
                ..
            } => match self.remove(*remote, *token) {
                Some(callback) => callback.on_misc_error(description),
                None => warn!(
                    "No callback found for error \"{}\" (remote: {}, token: {})",
                    description, remote, token
                ),
            },

            ExchangeEvent::PartialContentReceived { remote, token, .. } => {
                match self.get(*remote, *token) {
                    Some(callback) => callback.on_partial_content(),
                    None => warn!(
                        "No callback found for partial content (remote: {}, token: {})",
                        remote, token
                    ),
                }
            }

            ExchangeEvent::RemoteSocketChanged {
                remote,
                previous,
                token,
            } => match self.update(*remote, *previous, *token) {
                Some(callback) => callback.on_remote_socket_changed(*remote, *previous),
                None => warn!(
                    "No callback found for socket change (previous: {}, token: {})",
                    previous, token
                ),
            },

            ExchangeEvent::LazyObservationTermination { remote, token } => {
                // Handled by the observation layer outside this core.
                debug!(
                    "Observation on {} (token: {}) marked for lazy termination",
                    remote, token
                );
            }
        }
    }

    fn get(&self, remote: SocketAddr, token: Token) -> Option<Arc<dyn ClientCallback>> {
        self.callbacks
            .read()
            .expect("callback table poisoned")
            .get(&(remote, token))
            .cloned()
    }

    /// Registers a callback for `(remote, token)`. Fails if the pair is
    /// already taken — a token collision indicates a bug in token handling.
    fn add(
        &self,
        remote: SocketAddr,
        token: Token,
        callback: Arc<dyn ClientCallback>,
    ) -> Result<(), CallbackError> {
        {
            let callbacks = self.callbacks.read().expect("callback table poisoned");
            if callbacks.contains_key(&(remote, token)) {
                return Err(CallbackError::TokenInUse);
            }
        }

        let mut callbacks = self.callbacks.write().expect("callback table poisoned");
        if callbacks.contains_key(&(remote, token)) {
            return Err(CallbackError::TokenInUse);
        }
        callbacks.insert((remote, token), callback);
        debug!("Added callback (remote: {}, token: {})", remote, token);
        Ok(())
    }

    /// Deregisters the callback for `(remote, token)` and returns its token
    /// to the pool. Returns `None` if no callback was registered.
    fn remove(&self, remote: SocketAddr, token: Token) -> Option<Arc<dyn ClientCallback>> {
        {
            let callbacks = self.callbacks.read().expect("callback table poisoned");
            if !callbacks.contains_key(&(remote, token)) {
                return None;
            }
        }

        let mut callbacks = match self.callbacks.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                debug!("Recovering from poisoned callback table");
                poisoned.into_inner()
            }
        };

        let callback = callbacks.remove(&(remote, token));
        if callback.is_some() {
            info!(
                "Removed callback (remote: {}, token: {}); {} remaining",
                remote,
                token,
                callbacks.len()
            );
            // The ping token never came from the factory.
            if !token.is_empty() {
                self.token_factory.release(token);
            }
        }
        callback
    }

    /// Re-keys the callback for `token` from its previous remote socket to
    /// the new one. Returns `None` if no callback was registered under the
    /// previous socket.
    fn update(
        &self,
        remote: SocketAddr,
        previous: SocketAddr,
        token: Token,
    ) -> Option<Arc<dyn ClientCallback>> {
        {
            let callbacks = self.callbacks.read().expect("callback table poisoned");
            if !callbacks.contains_key(&(previous, token)) {
                return None;
            }
        }

        let mut callbacks = self.callbacks.write().expect("callback table poisoned");
        let callback = callbacks.remove(&(previous, token))?;
        if callbacks
            .insert((remote, token), callback.clone())
            .is_some()
        {
            warn!(
                "Socket change displaced a callback (remote: {}, token: {})",
                remote, token
            );
        }
        info!(
            "Updated remote socket (old: {}, new: {}, token: {})",
            previous, remote, token
        );
        Some(callback)
    }

    #[cfg(test)]
    pub(crate) fn callback_count(&self) -> usize {
        self.callbacks.read().expect("callback table poisoned").len()
    }

    #[cfg(test)]
    pub(crate) fn live_token_count(&self) -> usize {
        self.token_factory.live_count()
    }

    pub(crate) fn is_registered(&self, remote: SocketAddr, token: Token) -> bool {
        self.callbacks
            .read()
            .expect("callback table poisoned")
            .contains_key(&(remote, token))
    }
}
