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

//! End-to-end exchange tests against a simulated wire: the transport
//! records every outbound message, and "the server" answers by feeding
//! parsed messages back through `handle_inbound`.

use coap_exchange::prelude::*;
use coap_exchange::message::{OBSERVE_DEREGISTER, OBSERVE_REGISTER};
use coap_exchange::Error;
use futures::future::BoxFuture;
use futures::prelude::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Short timings so the retransmission scenarios finish in seconds.
#[derive(Debug, Default, Clone, Copy)]
struct TestParams;

impl TransParams for TestParams {
    const ACK_TIMEOUT: Duration = Duration::from_millis(50);
    const EXCHANGE_LIFETIME: Duration = Duration::from_millis(500);
}

const ACK_TIMEOUT_MS: u64 = 50;

#[derive(Debug, Clone, Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<(Message, SocketAddr, Instant)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl RecordingTransport {
    fn failing() -> RecordingTransport {
        let transport = RecordingTransport::default();
        transport.fail_writes.store(true, Ordering::SeqCst);
        transport
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn sent(&self, index: usize) -> Message {
        self.sent.lock().unwrap()[index].0.clone()
    }

    fn sent_at(&self, index: usize) -> Instant {
        self.sent.lock().unwrap()[index].2
    }

    fn wait_for_writes(&self, count: usize) {
        wait_until(Duration::from_secs(5), || self.sent_count() >= count);
    }
}

impl MessageTransport for RecordingTransport {
    fn send_message(
        &self,
        message: &Message,
        dest: SocketAddr,
    ) -> BoxFuture<'static, Result<(), Error>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return future::ready(Err(Error::IOError)).boxed();
        }
        self.sent
            .lock()
            .unwrap()
            .push((message.clone(), dest, Instant::now()));
        future::ready(Ok(())).boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Record {
    Response(Message),
    EmptyAck,
    Reset,
    Timeout,
    Retransmission,
    MsgIdAssigned(MsgId),
    MiscError(String),
    SocketChanged(SocketAddr, SocketAddr),
    PartialContent,
}

#[derive(Debug)]
struct RecordingCallback {
    records: Mutex<Vec<Record>>,
    keep_observing: AtomicBool,
}

impl RecordingCallback {
    fn new() -> Arc<RecordingCallback> {
        Arc::new(RecordingCallback {
            records: Mutex::new(Vec::new()),
            keep_observing: AtomicBool::new(true),
        })
    }

    fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    fn push(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    fn stop_observing(&self) {
        self.keep_observing.store(false, Ordering::SeqCst);
    }

    fn wait_for(&self, predicate: impl Fn(&[Record]) -> bool) {
        wait_until(Duration::from_secs(5), || {
            predicate(&self.records.lock().unwrap())
        });
    }
}

impl ClientCallback for RecordingCallback {
    fn on_response(&self, response: Message) {
        self.push(Record::Response(response));
    }

    fn on_empty_ack(&self) {
        self.push(Record::EmptyAck);
    }

    fn on_reset(&self) {
        self.push(Record::Reset);
    }

    fn on_timeout(&self) {
        self.push(Record::Timeout);
    }

    fn on_retransmission(&self) {
        self.push(Record::Retransmission);
    }

    fn on_message_id_assigned(&self, msg_id: MsgId) {
        self.push(Record::MsgIdAssigned(msg_id));
    }

    fn on_misc_error(&self, description: &str) {
        self.push(Record::MiscError(description.to_string()));
    }

    fn on_remote_socket_changed(&self, remote: SocketAddr, previous: SocketAddr) {
        self.push(Record::SocketChanged(remote, previous));
    }

    fn on_partial_content(&self) {
        self.push(Record::PartialContent);
    }

    fn continue_observation(&self) -> bool {
        self.keep_observing.load(Ordering::SeqCst)
    }
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < deadline, "condition never became true");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn remote() -> SocketAddr {
    "10.0.0.1:5683".parse().unwrap()
}

fn test_channel() -> (ExchangeChannel<TestParams>, RecordingTransport) {
    let transport = RecordingTransport::default();
    let channel = ExchangeChannel::with_trans_params(
        transport.clone(),
        Scheduler::new().expect("scheduler start failed"),
        TestParams,
    );
    (channel, transport)
}

fn collected_events(channel: &ExchangeChannel<TestParams>) -> Arc<Mutex<Vec<ExchangeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    channel.set_event_observer(move |event| {
        events_clone.lock().unwrap().push(event.clone());
    });
    events
}

#[test]
fn happy_con_ack() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    let msg_id = written.msg_id().expect("no message id assigned");
    assert!(written.msg_type().is_con());
    assert!(!written.token().is_empty());

    let mut response = Message::response(MsgType::Ack, MsgCode::SuccessContent, written.token());
    response.set_msg_id(Some(msg_id));
    assert_eq!(
        channel.handle_inbound(response.clone(), remote()),
        Disposition::Drop
    );

    assert_eq!(
        callback.records(),
        vec![Record::MsgIdAssigned(msg_id), Record::Response(response)]
    );
    assert!(!channel.has_pending_exchange(remote(), written.token()));

    // No retransmission happens once the exchange is confirmed.
    std::thread::sleep(Duration::from_millis(3 * ACK_TIMEOUT_MS));
    assert_eq!(transport.sent_count(), 1);

    // The token went back to the pool: the next request gets it again.
    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        RecordingCallback::new(),
    );
    transport.wait_for_writes(2);
    assert_eq!(transport.sent(1).token(), written.token());
}

#[test]
fn separate_response_keeps_token_live() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    let token = written.token();

    let mut empty_ack = Message::new(MsgType::Ack, MsgCode::Empty);
    empty_ack.set_msg_id(written.msg_id());
    assert_eq!(
        channel.handle_inbound(empty_ack, remote()),
        Disposition::Drop
    );

    callback.wait_for(|records| records.contains(&Record::EmptyAck));
    // Between the empty ACK and the separate response the exchange stays
    // live under its token.
    assert!(channel.has_pending_exchange(remote(), token));

    let mut response = Message::response(MsgType::Con, MsgCode::SuccessContent, token);
    response.set_msg_id(Some(0x0700));
    assert_eq!(
        channel.handle_inbound(response.clone(), remote()),
        Disposition::Drop
    );

    assert_eq!(
        callback.records(),
        vec![
            Record::MsgIdAssigned(written.msg_id().unwrap()),
            Record::EmptyAck,
            Record::Response(response),
        ]
    );
    assert!(!channel.has_pending_exchange(remote(), token));
}

#[test]
fn timeout_after_four_retransmissions() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );

    callback.wait_for(|records| records.contains(&Record::Timeout));

    let records = callback.records();
    assert_eq!(
        records
            .iter()
            .filter(|r| **r == Record::Retransmission)
            .count(),
        4
    );
    assert_eq!(records.last(), Some(&Record::Timeout));

    // Initial transmission plus MAX_RETRANSMIT copies, nothing more.
    assert_eq!(transport.sent_count(), 5);
    let token = transport.sent(0).token();
    assert!(!channel.has_pending_exchange(remote(), token));

    // Every copy is byte-identical for a plain request.
    for i in 1..5 {
        assert_eq!(transport.sent(i), transport.sent(0));
    }

    // Back-off: the gap before copy n is 2^(n-1) * ACK_TIMEOUT, scaled by
    // at most ACK_RANDOM_FACTOR (plus scheduling slack).
    for i in 1..5u32 {
        let gap = transport.sent_at(i as usize) - transport.sent_at(i as usize - 1);
        let base = ACK_TIMEOUT_MS << (i - 1);
        let gap_ms = gap.as_millis() as u64;
        assert!(
            gap_ms + 30 >= base,
            "gap {}ms before copy {} under base {}ms",
            gap_ms,
            i,
            base
        );
        assert!(
            gap_ms < base * 3 / 2 + 200,
            "gap {}ms before copy {} over jittered bound of base {}ms",
            gap_ms,
            i,
            base
        );
    }
}

#[test]
fn reset_stops_retransmissions() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    let mut rst = Message::new(MsgType::Rst, MsgCode::Empty);
    rst.set_msg_id(written.msg_id());
    assert_eq!(channel.handle_inbound(rst, remote()), Disposition::Drop);

    callback.wait_for(|records| records.contains(&Record::Reset));
    let writes_after_reset = transport.sent_count();

    std::thread::sleep(Duration::from_millis(4 * ACK_TIMEOUT_MS));
    assert_eq!(transport.sent_count(), writes_after_reset);
    assert_eq!(
        callback
            .records()
            .iter()
            .filter(|r| **r == Record::Reset)
            .count(),
        1
    );
    assert!(!channel.has_pending_exchange(remote(), written.token()));
}

#[test]
fn update_notification_folds_into_pending_transfer() {
    let (channel, transport) = test_channel();
    let events = collected_events(&channel);
    let token = Token::new(&[0x42]);

    let first = Message::response(MsgType::Con, MsgCode::SuccessContent, token)
        .with_observe(5)
        .with_payload(&b"state-1"[..]);
    channel.send_message(first, remote());
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    let msg_id = written.msg_id().expect("no message id assigned");
    assert_eq!(written.observe(), Some(5));

    // A newer notification for the same token arrives before the CON is
    // acknowledged: it must not open a second exchange.
    let second = Message::response(MsgType::Con, MsgCode::SuccessContent, token)
        .with_observe(6)
        .with_payload(&b"state-2"[..]);
    channel.send_message(second, remote());

    // The next copy on the wire is the scheduled retransmission, now
    // carrying the newer payload under the original message id.
    transport.wait_for_writes(2);
    let retransmitted = transport.sent(1);
    assert_eq!(retransmitted.msg_id(), Some(msg_id));
    assert_eq!(retransmitted.payload(), b"state-2");
    assert_eq!(retransmitted.observe(), Some(7));

    // Only the first notification was assigned an id; the second rode along.
    let assigned = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ExchangeEvent::MessageIdAssigned { .. }))
        .count();
    assert_eq!(assigned, 1);

    let mut ack = Message::new(MsgType::Ack, MsgCode::Empty);
    ack.set_msg_id(Some(msg_id));
    assert_eq!(channel.handle_inbound(ack, remote()), Disposition::Drop);
}

#[test]
fn observation_delivers_until_cancelled() {
    let (channel, transport) = test_channel();
    let events = collected_events(&channel);
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet).with_observe(OBSERVE_REGISTER),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    let token = written.token();

    // Notification #1 rides piggy-backed on the ACK.
    let mut first = Message::response(MsgType::Ack, MsgCode::SuccessContent, token)
        .with_observe(5)
        .with_payload(&b"v1"[..]);
    first.set_msg_id(written.msg_id());
    channel.handle_inbound(first.clone(), remote());

    // Notification #2 arrives later as a separate CON.
    let mut second = Message::response(MsgType::Con, MsgCode::SuccessContent, token)
        .with_observe(6)
        .with_payload(&b"v2"[..]);
    second.set_msg_id(Some(0x0800));
    channel.handle_inbound(second.clone(), remote());

    assert!(channel.has_pending_exchange(remote(), token));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .all(|e| !matches!(e, ExchangeEvent::LazyObservationTermination { .. })));

    // The application loses interest: the next notification fires the lazy
    // termination event, but is still delivered.
    callback.stop_observing();
    let mut third = Message::response(MsgType::Con, MsgCode::SuccessContent, token)
        .with_observe(7)
        .with_payload(&b"v3"[..]);
    third.set_msg_id(Some(0x0801));
    channel.handle_inbound(third.clone(), remote());

    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ExchangeEvent::LazyObservationTermination { .. })));
    assert_eq!(
        callback.records(),
        vec![
            Record::MsgIdAssigned(written.msg_id().unwrap()),
            Record::Response(first),
            Record::Response(second),
            Record::Response(third),
        ]
    );
    // Tearing the observation down is the termination layer's job; until
    // then the callback stays registered.
    assert!(channel.has_pending_exchange(remote(), token));
}

#[test]
fn observation_cancel_reuses_the_token() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet).with_observe(OBSERVE_REGISTER),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    let token = written.token();

    let mut first = Message::response(MsgType::Ack, MsgCode::SuccessContent, token)
        .with_observe(5)
        .with_payload(&b"v1"[..]);
    first.set_msg_id(written.msg_id());
    channel.handle_inbound(first, remote());

    // Cancel the observation under the same token.
    let cancel_callback = RecordingCallback::new();
    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet)
            .with_observe(OBSERVE_DEREGISTER)
            .with_token(token),
        remote(),
        cancel_callback.clone(),
    );
    transport.wait_for_writes(2);

    let cancel_written = transport.sent(1);
    assert_eq!(cancel_written.token(), token);
    assert_eq!(cancel_written.observe(), Some(OBSERVE_DEREGISTER));

    // The confirmation is a plain response: terminal for the observation's
    // callback, which is still the one registered under the token.
    let mut confirmation = Message::response(MsgType::Ack, MsgCode::SuccessContent, token);
    confirmation.set_msg_id(cancel_written.msg_id());
    channel.handle_inbound(confirmation.clone(), remote());

    assert!(!channel.has_pending_exchange(remote(), token));
    assert_eq!(
        callback.records().last(),
        Some(&Record::Response(confirmation))
    );
    assert!(cancel_callback.records().is_empty());
}

#[test]
fn cancelling_unknown_observation_fails() {
    let (channel, _transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet)
            .with_observe(OBSERVE_DEREGISTER)
            .with_token(Token::new(&[0x99])),
        remote(),
        callback.clone(),
    );

    callback.wait_for(|records| {
        records
            .iter()
            .any(|r| matches!(r, Record::MiscError(desc) if desc.contains("No ongoing observation")))
    });
}

#[test]
fn ping_and_duplicate_ping() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_ping(remote(), callback.clone());
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    assert!(written.is_ping());
    assert!(written.token().is_empty());

    // A second ping to the same remote while the first is live is refused;
    // the first keeps going.
    let second_callback = RecordingCallback::new();
    channel.send_ping(remote(), second_callback.clone());
    second_callback.wait_for(|records| {
        records
            .iter()
            .any(|r| matches!(r, Record::MiscError(desc) if desc.contains("ongoing PING")))
    });
    assert!(channel.has_pending_exchange(remote(), Token::EMPTY));

    // A ping to a different remote is fine.
    let elsewhere: SocketAddr = "10.0.0.2:5683".parse().unwrap();
    channel.send_ping(elsewhere, RecordingCallback::new());
    transport.wait_for_writes(2);

    let mut rst = Message::new(MsgType::Rst, MsgCode::Empty);
    rst.set_msg_id(written.msg_id());
    channel.handle_inbound(rst, remote());

    callback.wait_for(|records| records.contains(&Record::Reset));
    assert!(!channel.has_pending_exchange(remote(), Token::EMPTY));
}

#[test]
fn non_request_gets_no_retransmissions() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Non, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);

    let written = transport.sent(0);
    std::thread::sleep(Duration::from_millis(4 * ACK_TIMEOUT_MS));
    assert_eq!(transport.sent_count(), 1);

    // The response still correlates through the token.
    let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent, written.token());
    response.set_msg_id(Some(0x0900));
    assert_eq!(
        channel.handle_inbound(response.clone(), remote()),
        Disposition::Drop
    );
    assert_eq!(
        callback.records(),
        vec![
            Record::MsgIdAssigned(written.msg_id().unwrap()),
            Record::Response(response),
        ]
    );
}

#[test]
fn rejected_write_terminates_the_exchange() {
    let transport = RecordingTransport::failing();
    let channel = ExchangeChannel::with_trans_params(
        transport.clone(),
        Scheduler::new().expect("scheduler start failed"),
        TestParams,
    );
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );

    callback.wait_for(|records| {
        records
            .iter()
            .any(|r| matches!(r, Record::MiscError(desc) if desc.contains("could not be sent")))
    });
    assert_eq!(transport.sent_count(), 0);
}

#[test]
fn remote_socket_change_rekeys_the_exchange() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();
    let moved: SocketAddr = "10.0.0.7:5683".parse().unwrap();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);
    let token = transport.sent(0).token();

    channel.dispatch_event(ExchangeEvent::RemoteSocketChanged {
        remote: moved,
        previous: remote(),
        token,
    });

    callback.wait_for(|records| records.contains(&Record::SocketChanged(moved, remote())));
    assert!(channel.has_pending_exchange(moved, token));
    assert!(!channel.has_pending_exchange(remote(), token));

    // The separate response now arrives from the new socket.
    let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent, token);
    response.set_msg_id(Some(0x0A00));
    channel.handle_inbound(response.clone(), moved);
    assert_eq!(callback.records().last(), Some(&Record::Response(response)));
    assert!(!channel.has_pending_exchange(moved, token));
}

#[test]
fn partial_content_is_not_terminal() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);
    let token = transport.sent(0).token();

    channel.dispatch_event(ExchangeEvent::PartialContentReceived {
        remote: remote(),
        msg_id: None,
        token,
    });

    callback.wait_for(|records| records.contains(&Record::PartialContent));
    assert!(channel.has_pending_exchange(remote(), token));
}

#[test]
fn error_response_tears_down_an_observation() {
    let (channel, transport) = test_channel();
    let callback = RecordingCallback::new();

    channel.send_request(
        Message::request(MsgType::Con, MsgCode::MethodGet).with_observe(OBSERVE_REGISTER),
        remote(),
        callback.clone(),
    );
    transport.wait_for_writes(1);
    let written = transport.sent(0);

    // Even with an observe option, an error response is terminal.
    let mut error = Message::response(MsgType::Ack, MsgCode::ClientErrorNotFound, written.token())
        .with_observe(5);
    error.set_msg_id(written.msg_id());
    channel.handle_inbound(error.clone(), remote());

    assert_eq!(callback.records().last(), Some(&Record::Response(error)));
    assert!(!channel.has_pending_exchange(remote(), written.token()));
}
