//! Scripted in-memory socket for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use super::error::Result;
use super::message::{Message, NLM_F_MULTI, NLMSG_HDRLEN, NlMsgType, parse_messages};
use super::socket::Socket;

type Responder = Box<dyn Fn(&Message) -> Vec<Vec<u8>> + Send + Sync>;

/// A [`Socket`] that answers each outgoing message from a closure.
///
/// Datagrams can also be queued directly with [`push`](Self::push).
/// `recv` blocks until a datagram is queued.
pub(crate) struct MockSocket {
    pid: u32,
    responder: Option<Responder>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    ready: Notify,
    sent: Mutex<Vec<Message>>,
    datagrams: AtomicUsize,
    peeks: AtomicUsize,
    groups: Mutex<Vec<u32>>,
}

impl MockSocket {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid,
            responder: None,
            queue: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            sent: Mutex::new(Vec::new()),
            datagrams: AtomicUsize::new(0),
            peeks: AtomicUsize::new(0),
            groups: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_responder(
        pid: u32,
        responder: impl Fn(&Message) -> Vec<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new(pid)
        }
    }

    /// Queue a datagram for the next `recv`.
    pub(crate) fn push(&self, datagram: Vec<u8>) {
        self.queue.lock().unwrap().push_back(datagram);
        self.ready.notify_one();
    }

    /// Every message written so far, in order.
    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn datagrams_sent(&self) -> usize {
        self.datagrams.load(Ordering::SeqCst)
    }

    pub(crate) fn peeks(&self) -> usize {
        self.peeks.load(Ordering::SeqCst)
    }

    pub(crate) fn groups(&self) -> Vec<u32> {
        self.groups.lock().unwrap().clone()
    }
}

impl Socket for MockSocket {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn send(&self, buf: &[u8]) -> Result<()> {
        let msgs = parse_messages(buf)?;
        self.datagrams.fetch_add(1, Ordering::SeqCst);
        for msg in &msgs {
            if let Some(responder) = &self.responder {
                for datagram in responder(msg) {
                    self.push(datagram);
                }
            }
        }
        self.sent.lock().unwrap().extend(msgs);
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8], peek: bool) -> Result<usize> {
        loop {
            {
                let mut queue = self.queue.lock().unwrap();
                if let Some(front) = queue.front() {
                    let len = front.len();
                    let n = len.min(buf.len());
                    buf[..n].copy_from_slice(&front[..n]);
                    if peek {
                        self.peeks.fetch_add(1, Ordering::SeqCst);
                    } else {
                        queue.pop_front();
                    }
                    return Ok(len);
                }
            }
            self.ready.notified().await;
        }
    }

    fn join_group(&self, group: u32) -> Result<()> {
        self.groups.lock().unwrap().push(group);
        Ok(())
    }

    fn leave_group(&self, group: u32) -> Result<()> {
        self.groups.lock().unwrap().retain(|g| *g != group);
        Ok(())
    }
}

/// Set sequence, pid and length on a message.
pub(crate) fn stamp(mut msg: Message, seq: u32, pid: u32) -> Message {
    msg.header.nlmsg_seq = seq;
    msg.header.nlmsg_pid = pid;
    msg.header.nlmsg_len = msg.encoded_len() as u32;
    msg
}

/// A reply correlated with `req`.
pub(crate) fn reply(req: &Message, msg_type: u16, flags: u16, data: Vec<u8>) -> Message {
    stamp(
        Message::new(msg_type, flags, data),
        req.header.nlmsg_seq,
        req.header.nlmsg_pid,
    )
}

/// Multi-part terminator for `req`.
pub(crate) fn done(req: &Message) -> Message {
    reply(req, NlMsgType::DONE, NLM_F_MULTI, 0i32.to_ne_bytes().to_vec())
}

/// Successful acknowledgement of `req`.
pub(crate) fn ack(req: &Message) -> Message {
    error(req, 0)
}

/// Error reply with a positive `errno` (0 for an ACK).
pub(crate) fn error(req: &Message, errno: i32) -> Message {
    let mut data = (-errno).to_ne_bytes().to_vec();
    let mut original = req.header;
    original.nlmsg_len = NLMSG_HDRLEN as u32;
    data.extend_from_slice(&original.to_bytes());
    reply(req, NlMsgType::ERROR, 0, data)
}

/// Concatenate messages into one datagram.
pub(crate) fn datagram(msgs: &[Message]) -> Vec<u8> {
    msgs.iter()
        .flat_map(|m| m.marshal().unwrap())
        .collect()
}

/// Route `tracing` output through the test harness.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
