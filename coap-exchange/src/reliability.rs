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

use crate::channel::ExchangeInner;
use crate::events::ExchangeEvent;
use crate::message::{Message, MsgId, Token};
use crate::msg_id_factory::MessageIdFactory;
use crate::scheduler::ScheduledTask;
use crate::trans_params::TransParams;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// What a pipeline stage decided about a message: pass it on to the next
/// stage, or swallow it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Disposition {
    /// The message continues through the pipeline.
    Continue,

    /// The message was consumed (or rejected) by this stage.
    Drop,
}

/// One outbound message the engine still cares about.
#[derive(Debug)]
pub(crate) enum OutboundTransfer {
    /// A non-confirmable request: tracked only so a later response can be
    /// correlated, never retransmitted.
    Bare { token: Token },

    /// A confirmable message with a live retransmission schedule.
    Reliable(Arc<Mutex<ReliableTransfer>>),
}

/// State of one confirmable transfer. Shared between the reliability table
/// and the scheduled retransmission task; the task re-reads `confirmed`
/// under this lock before every write, so cancelling the scheduled task is
/// only ever a shortcut.
#[derive(Debug)]
pub(crate) struct ReliableTransfer {
    remote: SocketAddr,
    msg_id: MsgId,
    token: Token,
    message: Message,
    retransmission_count: u32,
    confirmed: bool,
    task: Option<ScheduledTask>,
}

#[derive(Debug, Default)]
struct TransferTables {
    by_id: HashMap<(SocketAddr, MsgId), OutboundTransfer>,
    by_token: HashMap<(SocketAddr, Token), MsgId>,
}

/// Tracks in-flight outbound transfers, retransmits confirmable messages
/// with the RFC 7252 back-off, and reports the fate of each transfer as
/// [`ExchangeEvent`]s.
#[derive(Debug)]
pub(crate) struct OutboundReliability<TP: TransParams> {
    tables: RwLock<TransferTables>,
    msg_id_factory: MessageIdFactory<TP>,
    trans_params: TP,
}

impl<TP: TransParams> OutboundReliability<TP> {
    pub(crate) fn new(trans_params: TP) -> OutboundReliability<TP> {
        OutboundReliability {
            tables: RwLock::new(TransferTables::default()),
            msg_id_factory: MessageIdFactory::new(trans_params),
            trans_params,
        }
    }

    /// Processes a message on its way out. Assigns a message id if needed,
    /// installs tracking state, and schedules the first retransmission for
    /// confirmable messages. Returns [`Disposition::Drop`] if the message
    /// must not reach the wire (it was folded into a pending transfer, or
    /// no message id was available).
    pub(crate) fn handle_outbound(
        &self,
        message: &mut Message,
        remote: SocketAddr,
        channel: &Arc<ExchangeInner<TP>>,
    ) -> Disposition {
        // A newer notification for a token whose previous notification is
        // still in flight rides along on the existing schedule instead of
        // opening a second exchange.
        if message.is_update_notification() && !message.msg_type().is_ack() {
            if self.fold_notification(remote, message) {
                debug!("Folded update notification for token {}", message.token());
                return Disposition::Drop;
            }
            message.set_msg_id(None);
        }

        let msg_id = match message.msg_id() {
            Some(msg_id) => msg_id,
            None => match self.msg_id_factory.next_id(remote) {
                Some(msg_id) => {
                    message.set_msg_id(Some(msg_id));
                    channel.dispatch_event(ExchangeEvent::MessageIdAssigned {
                        remote,
                        msg_id,
                        token: message.token(),
                    });
                    msg_id
                }
                None => {
                    channel.dispatch_event(ExchangeEvent::MiscError {
                        remote,
                        msg_id: None,
                        token: message.token(),
                        description: format!("No message ID available for {}", remote),
                    });
                    return Disposition::Drop;
                }
            },
        };

        if message.msg_type().is_con() {
            let transfer = Arc::new(Mutex::new(ReliableTransfer {
                remote,
                msg_id,
                token: message.token(),
                message: message.clone(),
                retransmission_count: 0,
                confirmed: false,
                task: None,
            }));
            self.insert_transfer(
                remote,
                msg_id,
                message.token(),
                OutboundTransfer::Reliable(transfer.clone()),
            );
            let delay = self.trans_params.retransmission_delay(1);
            Self::schedule_retransmission(channel, &transfer, delay);
        } else if message.is_request() {
            // NON requests may still receive a response within the lifetime
            // of the message id.
            self.insert_transfer(
                remote,
                msg_id,
                message.token(),
                OutboundTransfer::Bare {
                    token: message.token(),
                },
            );
        }

        Disposition::Continue
    }

    /// Processes an inbound message. ACKs and RSTs confirm the matching
    /// transfer and are consumed here unless they carry a piggy-backed
    /// response; everything else passes through untouched.
    pub(crate) fn handle_inbound(
        &self,
        message: &Message,
        remote: SocketAddr,
        channel: &Arc<ExchangeInner<TP>>,
    ) -> Disposition {
        if !(message.msg_type().is_ack() || message.msg_type().is_rst()) {
            return Disposition::Continue;
        }

        let msg_id = match message.msg_id() {
            Some(msg_id) => msg_id,
            None => return Disposition::Drop,
        };

        let token = match self.terminate_transfer(remote, msg_id) {
            Some(token) => token,
            None => {
                warn!(
                    "No open CON found for {:?} from {} with message ID {}",
                    message.msg_type(),
                    remote,
                    msg_id
                );
                return Disposition::Drop;
            }
        };

        if message.is_empty() {
            let event = if message.msg_type().is_ack() {
                info!("Received empty ACK from {} (message ID {})", remote, msg_id);
                ExchangeEvent::EmptyAckReceived {
                    remote,
                    msg_id,
                    token,
                }
            } else {
                info!("Received RST from {} (message ID {})", remote, msg_id);
                ExchangeEvent::ResetReceived {
                    remote,
                    msg_id,
                    token,
                }
            };
            channel.dispatch_event(event);
            return Disposition::Drop;
        }

        // Piggy-backed response: the callback manager dispatches it.
        Disposition::Continue
    }

    /// Consumes the pipeline events that end a transfer's life.
    pub(crate) fn handle_event(&self, event: &ExchangeEvent) {
        match event {
            ExchangeEvent::TransmissionTimeout { remote, msg_id, .. } => {
                self.terminate_transfer(*remote, *msg_id);
            }
            ExchangeEvent::MiscError {
                remote,
                msg_id: Some(msg_id),
                ..
            } => {
                self.terminate_transfer(*remote, *msg_id);
            }
            _ => {}
        }
    }

    /// Replaces the payload of a still-unconfirmed transfer for `(remote,
    /// token)` with the newer notification, keeping the message id and the
    /// retransmission schedule. Returns false if no such transfer exists.
    fn fold_notification(&self, remote: SocketAddr, message: &mut Message) -> bool {
        let key = (remote, message.token());

        {
            let tables = self.tables.read().expect("reliability tables poisoned");
            if !tables.by_token.contains_key(&key) {
                return false;
            }
        }

        let tables = self.tables.write().expect("reliability tables poisoned");
        let msg_id = match tables.by_token.get(&key) {
            Some(&msg_id) => msg_id,
            None => return false,
        };
        match tables.by_id.get(&(remote, msg_id)) {
            Some(OutboundTransfer::Reliable(transfer)) => {
                message.set_msg_id(Some(msg_id));
                let mut transfer = transfer.lock().expect("transfer state poisoned");
                transfer.message = message.clone();
                true
            }
            _ => false,
        }
    }

    fn insert_transfer(
        &self,
        remote: SocketAddr,
        msg_id: MsgId,
        token: Token,
        transfer: OutboundTransfer,
    ) {
        let mut tables = self.tables.write().expect("reliability tables poisoned");
        if let Some(stale_id) = tables.by_token.insert((remote, token), msg_id) {
            // A previous exchange under this token that was never
            // confirmed; its entry must not outlive the token index.
            if stale_id != msg_id {
                tables.by_id.remove(&(remote, stale_id));
            }
        }
        tables.by_id.insert((remote, msg_id), transfer);
        debug!(
            "Added outbound transfer (remote: {}, message ID: {}, token: {})",
            remote, msg_id, token
        );
    }

    /// Removes the transfer for `(remote, msg_id)` from both indices and
    /// marks it confirmed so the scheduled retransmission becomes a no-op.
    /// Returns the transfer's token, or `None` if there was no transfer.
    fn terminate_transfer(&self, remote: SocketAddr, msg_id: MsgId) -> Option<Token> {
        {
            let tables = self.tables.read().expect("reliability tables poisoned");
            if !tables.by_id.contains_key(&(remote, msg_id)) {
                return None;
            }
        }

        let mut tables = match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                debug!("Recovering from poisoned reliability tables");
                poisoned.into_inner()
            }
        };

        let transfer = tables.by_id.remove(&(remote, msg_id))?;
        let token = match &transfer {
            OutboundTransfer::Bare { token } => *token,
            OutboundTransfer::Reliable(transfer) => {
                let mut transfer = transfer.lock().expect("transfer state poisoned");
                transfer.confirmed = true;
                if let Some(task) = transfer.task.take() {
                    task.cancel();
                }
                debug!("Confirmed reliable transfer (message ID: {})", msg_id);
                transfer.token
            }
        };

        if tables.by_token.get(&(remote, token)) == Some(&msg_id) {
            tables.by_token.remove(&(remote, token));
        }
        Some(token)
    }

    fn schedule_retransmission(
        channel: &Arc<ExchangeInner<TP>>,
        transfer: &Arc<Mutex<ReliableTransfer>>,
        delay: std::time::Duration,
    ) {
        let weak_channel = Arc::downgrade(channel);
        let weak_transfer = Arc::downgrade(transfer);
        let task = channel.scheduler().schedule(delay, async move {
            if let Some(future) = Self::retransmission_fire(&weak_channel, &weak_transfer) {
                future.await;
            }
        });
        transfer.lock().expect("transfer state poisoned").task = Some(task);
    }

    /// Upgrades the weak handles a scheduled retransmission was created
    /// with. A torn-down channel or an already-terminated transfer makes
    /// the firing a silent no-op.
    fn retransmission_fire(
        channel: &Weak<ExchangeInner<TP>>,
        transfer: &Weak<Mutex<ReliableTransfer>>,
    ) -> Option<BoxFuture<'static, ()>> {
        let channel = channel.upgrade()?;
        let transfer = transfer.upgrade()?;
        Some(Self::run_retransmission(channel, transfer))
    }

    fn run_retransmission(
        channel: Arc<ExchangeInner<TP>>,
        transfer: Arc<Mutex<ReliableTransfer>>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let (message, remote, msg_id, token, next_delay) = {
                let mut state = transfer.lock().expect("transfer state poisoned");
                if state.confirmed {
                    return;
                }

                let remote = state.remote;
                let msg_id = state.msg_id;
                let token = state.token;

                if state.retransmission_count >= channel.reliability().trans_params.max_retransmit()
                {
                    // The final wait elapsed with no ACK or RST.
                    drop(state);
                    info!(
                        "Transmission to {} timed out (message ID: {})",
                        remote, msg_id
                    );
                    channel.dispatch_event(ExchangeEvent::TransmissionTimeout {
                        remote,
                        msg_id,
                        token,
                    });
                    return;
                }

                state.retransmission_count += 1;
                if state.message.is_update_notification() {
                    // The copy must carry a fresh observe sequence number.
                    state.message.bump_observe();
                }

                let next_delay = channel
                    .reliability()
                    .trans_params
                    .retransmission_delay(state.retransmission_count + 1);
                (state.message.clone(), remote, msg_id, token, next_delay)
            };

            // The follow-up fire is scheduled before the write completes;
            // if the write fails, the MiscError below tears the transfer
            // down and the follow-up finds nothing to do.
            Self::schedule_retransmission(&channel, &transfer, next_delay);

            match channel.transport().send_message(&message, remote).await {
                Ok(()) => {
                    debug!("Retransmitted {} to {}", message, remote);
                    channel.dispatch_event(ExchangeEvent::MessageRetransmitted {
                        remote,
                        msg_id,
                        token,
                    });
                }
                Err(error) => {
                    channel.dispatch_event(ExchangeEvent::MiscError {
                        remote,
                        msg_id: Some(msg_id),
                        token,
                        description: format!("Could not send retransmission ({})", error),
                    });
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn transfer_msg_id(&self, remote: SocketAddr, token: Token) -> Option<MsgId> {
        let tables = self.tables.read().expect("reliability tables poisoned");
        tables.by_token.get(&(remote, token)).copied()
    }

    #[cfg(test)]
    pub(crate) fn transfer_count(&self) -> usize {
        let tables = self.tables.read().expect("reliability tables poisoned");
        tables.by_id.len()
    }
}
