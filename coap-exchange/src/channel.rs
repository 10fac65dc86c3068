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
use crate::callback_manager::CallbackManager;
use crate::events::ExchangeEvent;
use crate::message::{Message, Token};
use crate::reliability::{Disposition, OutboundReliability};
use crate::scheduler::Scheduler;
use crate::trans_params::{StandardParams, TransParams};
use crate::transport::MessageTransport;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

type EventObserver = Box<dyn Fn(&ExchangeEvent) + Send + Sync>;

/// The client side of a CoAP message-exchange pipeline.
///
/// An `ExchangeChannel` turns [`send_request`][ExchangeChannel::send_request]
/// calls into tracked, reliable exchanges on an outbound
/// [`MessageTransport`], and routes the messages fed into
/// [`handle_inbound`][ExchangeChannel::handle_inbound] back to the
/// originating [`ClientCallback`]. Everything below the parsed-message
/// boundary — the codec and the socket — lives outside the channel.
///
/// The channel is thread-safe; writes, retransmissions, and inbound
/// dispatch may run concurrently on the shared [`Scheduler`].
///
/// # Example
///
/// ```
/// use coap_exchange::prelude::*;
/// use std::sync::Arc;
///
/// struct PrintResponse;
///
/// impl ClientCallback for PrintResponse {
///     fn on_response(&self, response: Message) {
///         println!("Got {}", response);
///     }
/// }
///
/// let scheduler = Scheduler::new().expect("scheduler start failed");
/// let channel = ExchangeChannel::new(NullTransport::new(), scheduler);
///
/// let request = Message::request(MsgType::Con, MsgCode::MethodGet);
/// let remote = "10.0.0.1:5683".parse().unwrap();
/// channel.send_request(request, remote, Arc::new(PrintResponse));
/// ```
#[derive(Debug)]
pub struct ExchangeChannel<TP: TransParams = StandardParams> {
    inner: Arc<ExchangeInner<TP>>,
}

pub(crate) struct ExchangeInner<TP: TransParams> {
    transport: Arc<dyn MessageTransport>,
    scheduler: Scheduler,
    reliability: OutboundReliability<TP>,
    callbacks: CallbackManager,
    observer: RwLock<Option<EventObserver>>,
}

impl<TP: TransParams> std::fmt::Debug for ExchangeInner<TP> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeInner")
            .field("reliability", &self.reliability)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl ExchangeChannel<StandardParams> {
    /// Creates a channel over the given transport with the standard
    /// RFC 7252 transmission parameters.
    pub fn new<T: MessageTransport>(transport: T, scheduler: Scheduler) -> ExchangeChannel {
        Self::with_trans_params(transport, scheduler, StandardParams)
    }
}

impl<TP: TransParams> ExchangeChannel<TP> {
    /// Creates a channel over the given transport using custom transmission
    /// parameters.
    pub fn with_trans_params<T: MessageTransport>(
        transport: T,
        scheduler: Scheduler,
        trans_params: TP,
    ) -> ExchangeChannel<TP> {
        ExchangeChannel {
            inner: Arc::new(ExchangeInner {
                transport: Arc::new(transport),
                scheduler,
                reliability: OutboundReliability::new(trans_params),
                callbacks: CallbackManager::new(trans_params.max_token_length()),
                observer: RwLock::new(None),
            }),
        }
    }

    /// Sends a request to `remote`, reporting everything that happens to
    /// the exchange to `callback`.
    ///
    /// The send runs as a task on the scheduler; this method returns
    /// immediately. Failures — no token, no message id, a rejected write —
    /// arrive at the callback as
    /// [`on_misc_error`][ClientCallback::on_misc_error].
    pub fn send_request(
        &self,
        request: Message,
        remote: SocketAddr,
        callback: Arc<dyn ClientCallback>,
    ) {
        let inner = self.inner.clone();
        self.inner.scheduler.spawn(CallbackManager::write_message_task(
            inner, request, remote, callback,
        ));
    }

    /// Sends a CoAP ping (a confirmable message with the empty code and the
    /// empty token) to `remote`. The remote's RST arrives at the callback
    /// as [`on_reset`][ClientCallback::on_reset].
    pub fn send_ping(&self, remote: SocketAddr, callback: Arc<dyn ClientCallback>) {
        self.send_request(Message::ping(), remote, callback);
    }

    /// Pushes an already-prepared message through the outbound pipeline
    /// without registering a callback.
    ///
    /// This is the path outbound *responses* take on an endpoint that also
    /// serves — most importantly update notifications, which the
    /// reliability engine folds into a still-unacknowledged predecessor
    /// under the same token instead of opening a second exchange.
    pub fn send_message(&self, message: Message, remote: SocketAddr) {
        let inner = self.inner.clone();
        self.inner.scheduler.spawn(async move {
            let mut message = message;
            if let Disposition::Continue =
                inner.reliability.handle_outbound(&mut message, remote, &inner)
            {
                if let Err(error) = inner.transport.send_message(&message, remote).await {
                    error!("Could not write {} to {}: {}", message, remote, error);
                    inner.dispatch_event(ExchangeEvent::MiscError {
                        remote,
                        msg_id: message.msg_id(),
                        token: message.token(),
                        description: format!("Message could not be sent ({})", error),
                    });
                }
            }
        });
    }

    /// Feeds an inbound, already-parsed message into the channel. Call this
    /// from the receive loop that owns the socket.
    ///
    /// Returns [`Disposition::Drop`] when the message was consumed by the
    /// exchange core (an ACK/RST for a tracked transfer, or a response that
    /// was dispatched to a callback); [`Disposition::Continue`] means the
    /// message is not the client's business — typically an inbound request
    /// for a server-side handler behind this one.
    pub fn handle_inbound(&self, message: Message, remote: SocketAddr) -> Disposition {
        debug!("INBOUND from {}: {}", remote, message);

        match self
            .inner
            .reliability
            .handle_inbound(&message, remote, &self.inner)
        {
            Disposition::Drop => Disposition::Drop,
            Disposition::Continue => {
                if message.is_response() {
                    self.inner.callbacks.handle_response(message, remote, &self.inner)
                } else {
                    Disposition::Continue
                }
            }
        }
    }

    /// Injects an event into the pipeline, exactly as the core's own
    /// stages do. This is the boundary with surrounding handlers: a
    /// connection-oriented transport reports socket migration with
    /// [`ExchangeEvent::RemoteSocketChanged`], a block-wise layer reports
    /// progress with [`ExchangeEvent::PartialContentReceived`], and so on.
    pub fn dispatch_event(&self, event: ExchangeEvent) {
        self.inner.dispatch_event(event);
    }

    /// Installs an observer that sees every event after the core's own
    /// stages have processed it. Replaces any previous observer.
    pub fn set_event_observer<F>(&self, observer: F)
    where
        F: Fn(&ExchangeEvent) + Send + Sync + 'static,
    {
        *self.inner.observer.write().expect("event observer poisoned") = Some(Box::new(observer));
    }

    /// Returns true if a callback is currently registered for
    /// `(remote, token)` — i.e. the exchange is still live.
    pub fn has_pending_exchange(&self, remote: SocketAddr, token: Token) -> bool {
        self.inner.callbacks.is_registered(remote, token)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<ExchangeInner<TP>> {
        &self.inner
    }
}

impl<TP: TransParams> Clone for ExchangeChannel<TP> {
    fn clone(&self) -> Self {
        ExchangeChannel {
            inner: self.inner.clone(),
        }
    }
}

impl<TP: TransParams> ExchangeInner<TP> {
    pub(crate) fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn reliability(&self) -> &OutboundReliability<TP> {
        &self.reliability
    }

    pub(crate) fn callbacks(&self) -> &CallbackManager {
        &self.callbacks
    }

    /// Runs an event through the pipeline: the reliability engine first
    /// (transfer termination), then the callback manager (delivery), then
    /// the installed observer.
    pub(crate) fn dispatch_event(self: &Arc<Self>, event: ExchangeEvent) {
        self.reliability.handle_event(&event);
        self.callbacks.handle_event(&event);
        if let Some(observer) = &*self.observer.read().expect("event observer poisoned") {
            observer(&event);
        }
    }
}
