//! High-level netlink connection with request/response handling.
//!
//! A [`Connection`] owns one socket and provides three levels of access:
//!
//! - [`send`](Connection::send) / [`receive`](Connection::receive): raw
//!   traffic, safe to call concurrently with each other.
//! - [`execute`](Connection::execute): one request and its complete reply,
//!   exclusive against every other call on the same connection so replies
//!   cannot be interleaved.
//! - [`close`](Connection::close): aborts any pending socket wait.
//!
//! ```text
//! execute: Idle ─► Sent ─► Receiving ─┬─► Validated ─► Done
//!                            ▲        │
//!                            └─ MULTI ┘   (any step) ─► Failed
//! ```

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;

use super::ack::check_message;
use super::config::Config;
use super::error::{Error, Result};
use super::message::{Message, parse_messages};
use super::socket::{NetlinkSocket, Protocol, Socket, SocketOption};

#[derive(Debug, Default, Clone, Copy)]
struct Deadlines {
    read: Option<Instant>,
    write: Option<Instant>,
}

/// High-level netlink connection.
pub struct Connection<S: Socket = NetlinkSocket> {
    socket: S,
    seq: AtomicU32,
    lock: RwLock<()>,
    closed: watch::Sender<bool>,
    deadlines: Mutex<Deadlines>,
    config: Config,
}

impl Connection<NetlinkSocket> {
    /// Create a new connection for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Self::with_config(protocol, Config::default())
    }

    /// Create a connection with explicit options.
    pub fn with_config(protocol: Protocol, config: Config) -> Result<Self> {
        let socket = NetlinkSocket::with_config(protocol, &config)?;
        Ok(Self::from_socket(socket, config))
    }
}

impl<S: Socket> Connection<S> {
    /// Wrap an already bound socket.
    ///
    /// The sequence counter is seeded randomly.
    pub fn from_socket(socket: S, config: Config) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            socket,
            seq: AtomicU32::new(rand::random()),
            lock: RwLock::new(()),
            closed,
            deadlines: Mutex::new(Deadlines::default()),
            config,
        }
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Options this connection was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Local port ID.
    pub fn pid(&self) -> u32 {
        self.socket.pid()
    }

    /// Get the next sequence number. Zero is never returned.
    pub fn next_seq(&self) -> u32 {
        loop {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if seq != 0 {
                return seq;
            }
        }
    }

    /// Send a message without waiting for a reply.
    ///
    /// Zero length, sequence and pid fields are filled in; the populated
    /// message is returned for later [`validate`](Self::validate).
    pub async fn send(&self, msg: Message) -> Result<Message> {
        let _shared = self.lock.read().await;
        self.locked_send(vec![msg])
            .await
            .map(|mut sent| sent.remove(0))
            .map_err(|e| e.with_op("send"))
    }

    /// Send several messages in a single datagram.
    pub async fn send_messages(&self, msgs: Vec<Message>) -> Result<Vec<Message>> {
        if msgs.is_empty() {
            return Ok(msgs);
        }
        let _shared = self.lock.read().await;
        self.locked_send(msgs).await.map_err(|e| e.with_op("send"))
    }

    /// Receive one complete transmission.
    ///
    /// Multi-part replies are read until their `NLMSG_DONE` terminator, which
    /// is checked for errors and dropped from the result.
    pub async fn receive(&self) -> Result<Vec<Message>> {
        let _shared = self.lock.read().await;
        self.locked_receive()
            .await
            .map_err(|e| e.with_op("receive"))
    }

    /// Send a request and return its validated replies.
    pub async fn execute(&self, msg: Message) -> Result<Vec<Message>> {
        let _exclusive = self.lock.write().await;

        let request = self
            .locked_send(vec![msg])
            .await
            .map(|mut sent| sent.remove(0))
            .map_err(|e| e.with_op("send"))?;

        let replies = self
            .locked_receive()
            .await
            .map_err(|e| e.with_op("receive"))?;

        Self::validate(&request, &replies).map_err(|e| e.with_op("validate"))?;
        Ok(replies)
    }

    /// Check that every reply belongs to `request`.
    ///
    /// A zero request sequence skips sequence checks; a zero pid on either
    /// side skips pid checks. Both indicate multicast traffic.
    pub fn validate(request: &Message, replies: &[Message]) -> Result<()> {
        let req = &request.header;
        for reply in replies {
            let rep = &reply.header;
            if req.nlmsg_seq != 0 && rep.nlmsg_seq != req.nlmsg_seq {
                return Err(Error::CorrelationMismatch {
                    field: "sequence",
                    expected: req.nlmsg_seq,
                    actual: rep.nlmsg_seq,
                });
            }
            if req.nlmsg_pid != 0 && rep.nlmsg_pid != 0 && rep.nlmsg_pid != req.nlmsg_pid {
                return Err(Error::CorrelationMismatch {
                    field: "pid",
                    expected: req.nlmsg_pid,
                    actual: rep.nlmsg_pid,
                });
            }
        }
        Ok(())
    }

    /// Join a multicast group.
    pub fn join_group(&self, group: u32) -> Result<()> {
        self.ensure_open()
            .and_then(|()| self.socket.join_group(group))
            .map_err(|e| e.with_op("join-group"))
    }

    /// Leave a multicast group.
    pub fn leave_group(&self, group: u32) -> Result<()> {
        self.ensure_open()
            .and_then(|()| self.socket.leave_group(group))
            .map_err(|e| e.with_op("leave-group"))
    }

    /// Enable or disable a socket option.
    pub fn set_option(&self, option: SocketOption, enable: bool) -> Result<()> {
        self.ensure_open()
            .and_then(|()| self.socket.set_option(option, enable))
            .map_err(|e| e.with_op("set-option"))
    }

    /// Set the kernel receive buffer size.
    pub fn set_read_buffer(&self, bytes: usize) -> Result<()> {
        self.ensure_open()
            .and_then(|()| self.socket.set_read_buffer(bytes))
            .map_err(|e| e.with_op("set-read-buffer"))
    }

    /// Set the kernel send buffer size.
    pub fn set_write_buffer(&self, bytes: usize) -> Result<()> {
        self.ensure_open()
            .and_then(|()| self.socket.set_write_buffer(bytes))
            .map_err(|e| e.with_op("set-write-buffer"))
    }

    /// Set both read and write deadlines. `None` clears them.
    pub fn set_deadline(&self, deadline: Option<std::time::Instant>) {
        let at = deadline.map(Instant::from_std);
        let mut d = self.deadlines.lock().unwrap_or_else(PoisonError::into_inner);
        d.read = at;
        d.write = at;
    }

    /// Set the deadline for socket reads. `None` clears it.
    pub fn set_read_deadline(&self, deadline: Option<std::time::Instant>) {
        let mut d = self.deadlines.lock().unwrap_or_else(PoisonError::into_inner);
        d.read = deadline.map(Instant::from_std);
    }

    /// Set the deadline for socket writes. `None` clears it.
    pub fn set_write_deadline(&self, deadline: Option<std::time::Instant>) {
        let mut d = self.deadlines.lock().unwrap_or_else(PoisonError::into_inner);
        d.write = deadline.map(Instant::from_std);
    }

    /// Close the connection.
    ///
    /// Pending socket waits return [`Error::Closed`], as does every later
    /// call. Does not wait for the connection lock.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Check if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn deadlines(&self) -> Deadlines {
        *self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a socket operation, aborting on close or deadline.
    async fn guarded<T>(
        &self,
        deadline: Option<Instant>,
        op: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::Closed);
        }

        let io = async move {
            match deadline {
                Some(at) => tokio::time::timeout_at(at, op).await.map_err(|_| {
                    Error::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "netlink deadline exceeded",
                    ))
                })?,
                None => op.await,
            }
        };

        tokio::select! {
            res = io => res,
            () = wait_closed(&mut closed) => Err(Error::Closed),
        }
    }

    fn populate(&self, msg: &mut Message) -> Result<()> {
        if msg.header.nlmsg_len == 0 {
            let len = u32::try_from(msg.encoded_len()).map_err(|_| {
                Error::MalformedMessage(format!("{} byte payload is too large", msg.data.len()))
            })?;
            msg.header.nlmsg_len = len;
        }
        let header = &mut msg.header;
        if header.nlmsg_seq == 0 {
            header.nlmsg_seq = self.next_seq();
        }
        if header.nlmsg_pid == 0 {
            header.nlmsg_pid = self.socket.pid();
        }
        Ok(())
    }

    async fn locked_send(&self, mut msgs: Vec<Message>) -> Result<Vec<Message>> {
        self.ensure_open()?;

        let mut buf = Vec::new();
        for msg in &mut msgs {
            self.populate(msg)?;
            buf.extend_from_slice(&msg.marshal()?);
            self.log_frame("send", msg);
        }

        let deadline = self.deadlines().write;
        self.guarded(deadline, self.socket.send(&buf)).await?;
        Ok(msgs)
    }

    async fn locked_receive(&self) -> Result<Vec<Message>> {
        let mut msgs = Vec::with_capacity(2);

        loop {
            let datagram = self.read_datagram().await?;
            let batch = parse_messages(&datagram)?;

            let mut more = false;
            for msg in &batch {
                self.log_frame("receive", msg);
                check_message(msg)?;
                if msg.header.is_multi() {
                    more = !msg.header.is_done();
                }
            }

            msgs.extend(batch);
            if !more {
                break;
            }
        }

        if let Some(last) = msgs.last()
            && last.header.is_done()
            && last.header.is_multi()
        {
            msgs.pop();
        }
        Ok(msgs)
    }

    /// Read one datagram, growing the buffer until a peek fits.
    ///
    /// Peeks report the full datagram length, so a datagram of exactly
    /// `size` bytes fits.
    async fn read_datagram(&self) -> Result<BytesMut> {
        let max = self.config.max_receive_size;
        let deadline = self.deadlines().read;
        let mut size = page_size().min(max);

        loop {
            let mut peeked = BytesMut::zeroed(size);
            let n = self
                .guarded(deadline, self.socket.recv(&mut peeked, true))
                .await?;
            if n <= size {
                break;
            }
            if size >= max {
                return Err(Error::MalformedMessage(format!(
                    "datagram exceeds maximum receive size of {max} bytes"
                )));
            }
            size = size.saturating_mul(2).min(max);
        }

        let mut buf = BytesMut::zeroed(size);
        let n = self
            .guarded(deadline, self.socket.recv(&mut buf, false))
            .await?;
        if n > size {
            return Err(Error::MalformedMessage(format!(
                "datagram of {n} bytes truncated to {size}"
            )));
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn log_frame(&self, direction: &'static str, msg: &Message) {
        let h = &msg.header;
        if self.config.debug {
            tracing::debug!(
                direction,
                len = h.nlmsg_len,
                msg_type = h.nlmsg_type,
                flags = h.nlmsg_flags,
                seq = h.nlmsg_seq,
                pid = h.nlmsg_pid,
                "netlink frame"
            );
        } else {
            tracing::trace!(
                direction,
                msg_type = h.nlmsg_type,
                seq = h.nlmsg_seq,
                "netlink frame"
            );
        }
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    loop {
        let closed = *rx.borrow_and_update();
        if closed {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped with the connection.
            return;
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::netlink::fixtures::{self, MockSocket};
    use crate::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_MULTI, NLM_F_REQUEST, NlMsgType};

    const FAMILY: u16 = 0x19;

    fn connection(socket: MockSocket) -> Connection<MockSocket> {
        fixtures::init_tracing();
        Connection::from_socket(socket, Config::new().debug(true))
    }

    fn request() -> Message {
        Message::new(FAMILY, NLM_F_REQUEST | NLM_F_ACK, vec![1, 2, 3, 4])
    }

    #[tokio::test]
    async fn test_send_populates_header() {
        let conn = connection(MockSocket::new(100));
        let sent = conn.send(request()).await.unwrap();

        assert_eq!(sent.header.nlmsg_len, 20);
        assert_ne!(sent.header.nlmsg_seq, 0);
        assert_eq!(sent.header.nlmsg_pid, 100);
        assert_eq!(conn.socket().sent(), vec![sent]);
    }

    #[tokio::test]
    async fn test_send_keeps_explicit_fields() {
        let conn = connection(MockSocket::new(100));
        let mut msg = request();
        msg.header.nlmsg_seq = 5;
        msg.header.nlmsg_pid = 7;
        let sent = conn.send(msg).await.unwrap();
        assert_eq!(sent.header.nlmsg_seq, 5);
        assert_eq!(sent.header.nlmsg_pid, 7);
    }

    #[tokio::test]
    async fn test_send_rejects_unaligned_length() {
        let conn = connection(MockSocket::new(100));
        let mut msg = request();
        msg.header.nlmsg_len = 21;
        let err = conn.send(msg).await.unwrap_err();
        assert_eq!(err.op(), Some("send"));
        assert!(matches!(err.root(), Error::MalformedMessage(_)));
        assert!(conn.socket().sent().is_empty());
    }

    #[tokio::test]
    async fn test_sequence_increments() {
        let conn = connection(MockSocket::new(1));
        let a = conn.next_seq();
        let b = conn.next_seq();
        assert_eq!(b, a.wrapping_add(1).max(1));
    }

    #[tokio::test]
    async fn test_sequence_skips_zero() {
        let conn = connection(MockSocket::new(1));
        conn.seq.store(u32::MAX - 1, Ordering::Relaxed);
        assert_eq!(conn.next_seq(), u32::MAX);
        assert_eq!(conn.next_seq(), 1);
    }

    #[tokio::test]
    async fn test_send_messages_single_datagram() {
        let conn = connection(MockSocket::new(100));
        let sent = conn
            .send_messages(vec![request(), request()])
            .await
            .unwrap();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].header.nlmsg_seq, sent[1].header.nlmsg_seq);
        assert_eq!(conn.socket().datagrams_sent(), 1);
    }

    #[tokio::test]
    async fn test_receive_single_message() {
        let conn = connection(MockSocket::new(100));
        let mut msg = Message::new(FAMILY, 0, vec![9; 8]);
        msg.header.nlmsg_len = msg.encoded_len() as u32;
        conn.socket().push(fixtures::datagram(&[msg.clone()]));

        assert_eq!(conn.receive().await.unwrap(), vec![msg]);
    }

    #[tokio::test]
    async fn test_receive_multipart_across_reads() {
        let conn = connection(MockSocket::new(100));
        let req = fixtures::stamp(Message::new(FAMILY, NLM_F_REQUEST | NLM_F_DUMP, vec![]), 5, 100);

        let parts: Vec<_> = (0..3u8)
            .map(|i| fixtures::reply(&req, FAMILY, NLM_F_MULTI, vec![i; 4]))
            .collect();
        conn.socket().push(fixtures::datagram(&parts[..2]));
        conn.socket().push(fixtures::datagram(&[
            parts[2].clone(),
            fixtures::done(&req),
        ]));

        let msgs = conn.receive().await.unwrap();
        assert_eq!(msgs, parts);
    }

    #[tokio::test]
    async fn test_receive_done_in_separate_read() {
        let conn = connection(MockSocket::new(100));
        let req = fixtures::stamp(Message::new(FAMILY, NLM_F_REQUEST | NLM_F_DUMP, vec![]), 5, 100);
        let part = fixtures::reply(&req, FAMILY, NLM_F_MULTI, vec![1; 4]);
        conn.socket().push(fixtures::datagram(&[part.clone()]));
        conn.socket().push(fixtures::datagram(&[fixtures::done(&req)]));

        assert_eq!(conn.receive().await.unwrap(), vec![part]);
    }

    #[tokio::test]
    async fn test_receive_surfaces_kernel_error() {
        let conn = connection(MockSocket::new(100));
        let req = fixtures::stamp(request(), 5, 100);
        conn.socket()
            .push(fixtures::datagram(&[fixtures::error(&req, libc::EINVAL)]));

        let err = conn.receive().await.unwrap_err();
        assert_eq!(err.op(), Some("receive"));
        assert_eq!(err.errno(), Some(libc::EINVAL));
    }

    #[tokio::test]
    async fn test_receive_grows_buffer() {
        let conn = connection(MockSocket::new(100));
        let mut msg = Message::new(FAMILY, 0, vec![0xab; 3 * page_size()]);
        msg.header.nlmsg_len = msg.encoded_len() as u32;
        conn.socket().push(fixtures::datagram(&[msg.clone()]));

        assert_eq!(conn.receive().await.unwrap(), vec![msg]);
        assert!(conn.socket().peeks() >= 3);
    }

    #[tokio::test]
    async fn test_receive_enforces_maximum() {
        let socket = MockSocket::new(100);
        let mut msg = Message::new(FAMILY, 0, vec![0; 8192]);
        msg.header.nlmsg_len = msg.encoded_len() as u32;
        socket.push(fixtures::datagram(&[msg]));
        let conn = Connection::from_socket(socket, Config::new().max_receive_size(4096));

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err.root(), Error::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn test_receive_datagram_at_maximum() {
        let max = 8192;
        let conn_with = |payload: usize| {
            let socket = MockSocket::new(100);
            let mut msg = Message::new(FAMILY, 0, vec![0x5a; payload]);
            msg.header.nlmsg_len = msg.encoded_len() as u32;
            let datagram = fixtures::datagram(&[msg.clone()]);
            let len = datagram.len();
            socket.push(datagram);
            (Connection::from_socket(socket, Config::new().max_receive_size(max)), msg, len)
        };

        let (conn, msg, len) = conn_with(max - 16);
        assert_eq!(len, max);
        assert_eq!(conn.receive().await.unwrap(), vec![msg]);

        let (conn, _, len) = conn_with(max - 16 + 4);
        assert_eq!(len, max + 4);
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err.root(), Error::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn test_execute_ack() {
        let socket = MockSocket::with_responder(100, |req| {
            vec![fixtures::datagram(&[fixtures::ack(req)])]
        });
        let conn = connection(socket);

        let replies = conn.execute(request()).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].header.nlmsg_type, NlMsgType::ERROR);
    }

    #[tokio::test]
    async fn test_execute_sequence_mismatch() {
        let socket = MockSocket::with_responder(100, |req| {
            let mut bad = fixtures::reply(req, FAMILY, 0, vec![0; 4]);
            bad.header.nlmsg_seq = req.header.nlmsg_seq + 1;
            vec![fixtures::datagram(&[bad])]
        });
        let conn = connection(socket);

        let mut msg = request();
        msg.header.nlmsg_seq = 5;
        msg.header.nlmsg_pid = 100;
        let err = conn.execute(msg).await.unwrap_err();
        assert_eq!(err.op(), Some("validate"));
        assert!(matches!(
            err.root(),
            Error::CorrelationMismatch {
                field: "sequence",
                expected: 5,
                actual: 6
            }
        ));
    }

    #[tokio::test]
    async fn test_execute_assigns_sequence() {
        let socket = MockSocket::with_responder(100, |req| {
            vec![fixtures::datagram(&[fixtures::reply(req, FAMILY, 0, vec![0; 4])])]
        });
        let conn = connection(socket);

        let msg = request();
        assert_eq!(msg.header.nlmsg_seq, 0);
        let replies = conn.execute(msg).await.unwrap();

        let sent = conn.socket().sent();
        assert_ne!(sent[0].header.nlmsg_seq, 0);
        assert_eq!(replies[0].header.nlmsg_seq, sent[0].header.nlmsg_seq);
    }

    #[tokio::test]
    async fn test_execute_rejects_foreign_sequence() {
        // Replies with sequence 0 or any other value than the assigned one.
        for offset in [None, Some(1u32)] {
            let socket = MockSocket::with_responder(100, move |req| {
                let mut bad = fixtures::reply(req, FAMILY, 0, vec![0; 4]);
                bad.header.nlmsg_seq = match offset {
                    Some(d) => req.header.nlmsg_seq.wrapping_add(d),
                    None => 0,
                };
                vec![fixtures::datagram(&[bad])]
            });
            let conn = connection(socket);

            let err = conn.execute(request()).await.unwrap_err();
            assert_eq!(err.op(), Some("validate"));
            assert!(matches!(
                err.root(),
                Error::CorrelationMismatch { field: "sequence", .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_execute_pid_mismatch() {
        let socket = MockSocket::with_responder(100, |req| {
            let mut bad = fixtures::reply(req, FAMILY, 0, vec![0; 4]);
            bad.header.nlmsg_pid = 101;
            vec![fixtures::datagram(&[bad])]
        });
        let conn = connection(socket);

        let mut msg = request();
        msg.header.nlmsg_seq = 5;
        let err = conn.execute(msg).await.unwrap_err();
        assert!(err.is_correlation_mismatch());
        assert!(matches!(err.root(), Error::CorrelationMismatch { field: "pid", .. }));
    }

    #[test]
    fn test_validate_broadcast_context() {
        let request = fixtures::stamp(request(), 0, 0);
        let replies = vec![
            fixtures::stamp(Message::new(FAMILY, 0, vec![]), 6, 101),
            fixtures::stamp(Message::new(FAMILY, 0, vec![]), 9, 0),
        ];
        assert!(Connection::<MockSocket>::validate(&request, &replies).is_ok());

        // Kernel-originated replies carry pid 0.
        let request = fixtures::stamp(self::request(), 5, 100);
        let replies = vec![fixtures::stamp(Message::new(FAMILY, 0, vec![]), 5, 0)];
        assert!(Connection::<MockSocket>::validate(&request, &replies).is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_executes_do_not_interleave() {
        let socket = MockSocket::with_responder(100, |req| {
            let parts: Vec<_> = (0..4)
                .map(|_| fixtures::reply(req, FAMILY, NLM_F_MULTI, vec![0; 4]))
                .collect();
            vec![
                fixtures::datagram(&parts[..2]),
                fixtures::datagram(&parts[2..]),
                fixtures::datagram(&[fixtures::done(req)]),
            ]
        });
        let conn = Arc::new(connection(socket));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move {
                    let dump = Message::new(FAMILY, NLM_F_REQUEST | NLM_F_DUMP, vec![]);
                    conn.execute(dump).await
                })
            })
            .collect();

        for task in tasks {
            let replies = task.await.unwrap().unwrap();
            assert_eq!(replies.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_close_unblocks_receive() {
        let conn = Arc::new(connection(MockSocket::new(100)));

        let pending = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err.root(), Error::Closed));
        assert!(conn.is_closed());
        assert!(matches!(
            conn.send(request()).await.unwrap_err().root(),
            Error::Closed
        ));
        assert!(matches!(conn.join_group(1).unwrap_err().root(), Error::Closed));
    }

    #[tokio::test]
    async fn test_read_deadline() {
        let conn = connection(MockSocket::new(100));
        conn.set_read_deadline(Some(std::time::Instant::now() + Duration::from_millis(10)));

        let err = conn.receive().await.unwrap_err();
        match err.root() {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected error: {other:?}"),
        }

        conn.set_deadline(None);
        let mut msg = Message::new(FAMILY, 0, vec![]);
        msg.header.nlmsg_len = 16;
        conn.socket().push(fixtures::datagram(&[msg]));
        assert_eq!(conn.receive().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_multicast_groups() {
        let conn = connection(MockSocket::new(100));
        conn.join_group(3).unwrap();
        conn.join_group(5).unwrap();
        conn.leave_group(3).unwrap();
        assert_eq!(conn.socket().groups(), vec![5]);
    }

    #[tokio::test]
    async fn test_unsupported_option() {
        let conn = connection(MockSocket::new(100));
        let err = conn
            .set_option(SocketOption::ExtendedAcknowledge, true)
            .unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.op(), Some("set-option"));
        assert!(conn.set_read_buffer(1 << 20).unwrap_err().is_unsupported());
    }

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn connection_is_send_sync() {
        assert_send::<Connection>();
        assert_sync::<Connection>();
        assert_send::<Connection<MockSocket>>();
        assert_sync::<Connection<MockSocket>>();
    }
}
