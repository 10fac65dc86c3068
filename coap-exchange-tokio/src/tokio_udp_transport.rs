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

use coap_exchange::message::Message;
use coap_exchange::{Error, MessageTransport};
use futures::future::BoxFuture;
use futures::prelude::*;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};

/// A [`MessageTransport`] over a [`tokio::net::UdpSocket`], with the
/// message-to-bytes encoding supplied by the caller.
///
/// The socket must be created inside a Tokio runtime; once created, the
/// write futures may be driven from any executor while that runtime is
/// alive.
pub struct TokioUdpTransport<E> {
    socket: Arc<UdpSocket>,
    encoder: E,
}

impl<E> Debug for TokioUdpTransport<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioUdpTransport")
            .field("socket", &self.socket)
            .finish()
    }
}

impl<E> TokioUdpTransport<E>
where
    E: Fn(&Message) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
{
    /// Binds a new UDP socket to `addr` and wraps it in a transport that
    /// encodes outbound messages with `encoder`.
    pub async fn bind<A: ToSocketAddrs>(addr: A, encoder: E) -> std::io::Result<TokioUdpTransport<E>> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, encoder))
    }

    /// Wraps an already-bound [`UdpSocket`] in a transport.
    pub fn from_socket(socket: UdpSocket, encoder: E) -> TokioUdpTransport<E> {
        TokioUdpTransport {
            socket: Arc::new(socket),
            encoder,
        }
    }

    /// Returns the socket this transport writes to. The receive loop that
    /// feeds `ExchangeChannel::handle_inbound` typically reads from a clone
    /// of this.
    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    /// Returns the local address of the underlying socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl<E> MessageTransport for TokioUdpTransport<E>
where
    E: Fn(&Message) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
{
    fn send_message(&self, message: &Message, dest: SocketAddr) -> BoxFuture<'static, Result<(), Error>> {
        let buffer = match (self.encoder)(message) {
            Ok(buffer) => buffer,
            Err(error) => return future::ready(Err(error)).boxed(),
        };

        let socket = self.socket.clone();
        async move {
            socket.send_to(&buffer, dest).await?;
            Ok(())
        }
        .boxed()
    }
}
