// Copyright 2024 the verity developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Network I/O for running a [`Server`].
//!
//! The [`Server`] structure and its methods implement the processing
//! logic of the responder abstracted from underlying network I/O. To
//! actually run a [`Server`], an I/O provider is needed; the
//! [`UdpIoProvider`] implemented here acts as the intermediary between
//! the operating system's socket APIs on one hand and the [`Server`] on
//! the other.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info};

use crate::server::{Server, MAX_UDP_PAYLOAD};

/// How often the receive loop wakes up to check for shutdown.
///
/// Implementing graceful shutdown requires us to time out if no
/// datagram arrives, so that the loop gets a chance to notice that the
/// shutdown flag has been raised.
const CHECK_FOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

////////////////////////////////////////////////////////////////////////
// THE BLOCKING UDP I/O PROVIDER                                      //
////////////////////////////////////////////////////////////////////////

/// A blocking, single-socket UDP I/O provider.
///
/// The provider owns one bound UDP socket and runs the
/// receive/handle/send loop on the calling thread until the shutdown
/// flag passed to [`UdpIoProvider::run`] is raised. Failure to send a
/// response is logged and does not stop the loop; an error receiving is
/// fatal (it almost certainly indicates that the socket is broken).
pub struct UdpIoProvider {
    socket: UdpSocket,
}

impl UdpIoProvider {
    /// Binds a UDP socket to `addr` and prepares it for serving.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(CHECK_FOR_SHUTDOWN_TIMEOUT))?;
        info!("listening on {} (UDP)", socket.local_addr()?);
        Ok(Self { socket })
    }

    /// Returns the local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the receive/handle/send loop until `shutdown` becomes true.
    pub fn run(&self, server: &Server, shutdown: &AtomicBool) -> io::Result<()> {
        let mut received_buf = [0; MAX_UDP_PAYLOAD];
        let mut response_buf = [0; MAX_UDP_PAYLOAD];

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }

            // Receive a DNS message. If interrupted, we skip the rest
            // of the loop body and check the shutdown flag again before
            // retrying. Otherwise, repeated interruptions could in
            // theory prevent the call from ever timing out.
            let (received_len, src) = match self.socket.recv_from(&mut received_buf) {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            debug!("received {} octet(s) from {}", received_len, src);

            // Process the DNS message and send the response. Don't
            // exit the loop if the send fails; transient errors (e.g.
            // an ICMP port unreachable from a previous send) shouldn't
            // take the server down.
            let response_len =
                server.handle_message(&received_buf[0..received_len], &mut response_buf);
            log_io_errors(retry_if_interrupted(|| {
                self.socket.send_to(&response_buf[0..response_len], src)
            }));
        }
    }
}

/// Executes `f`, retrying the operation if it is interrupted.
fn retry_if_interrupted<F, R>(mut f: F) -> io::Result<R>
where
    F: FnMut() -> io::Result<R>,
{
    loop {
        match f() {
            Ok(r) => return Ok(r),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Logs errors if an I/O operation fails.
fn log_io_errors<T>(result: io::Result<T>) {
    if let Err(e) = result {
        let current_thread = thread::current();
        let thread_name = current_thread.name().unwrap_or("anonymous thread");
        error!("I/O error in thread {}: {}", thread_name, e);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::store::{file, RecordStore};

    /// Serves a query over loopback UDP and checks the response octets.
    #[test]
    fn provider_answers_over_udp() {
        let store = file::read("example.com. IN A 3600 192.168.0.1\n".as_bytes()).unwrap();
        let server = Arc::new(Server::new(Arc::new(store)));

        let provider = UdpIoProvider::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = provider.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let server = server.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || provider.run(&server, &shutdown))
        };

        let query = b"\x07\x03\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                      \x07example\x03com\x00\x00\x01\x00\x01";
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        client.send_to(query, server_addr).unwrap();

        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(
            &buf[0..len],
            b"\x07\x03\x84\x00\x00\x01\x00\x01\x00\x00\x00\x00\
              \x07example\x03com\x00\x00\x01\x00\x01\
              \x07example\x03com\x00\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x04\xc0\xa8\x00\x01"
                .as_slice()
        );

        shutdown.store(true, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    }
}
