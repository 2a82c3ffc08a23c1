//! The packet-queue transport. The original binds this to a real netlink
//! NFQUEUE socket; that binding is explicitly out of scope here (§4.5,
//! Non-goals). What's in scope is the full-duplex message contract the
//! distilled spec already names: inbound carries `{packet_id, l2_protocol,
//! payload_bytes}`, outbound carries `{packet_id, mark}` (a verdict is
//! always ACCEPT — `classify` never asks for a drop). [`FramedQueue`]
//! implements that contract over a plain length-prefixed stream, so
//! [`crate::commands::cmd_run`] is exercisable end-to-end against an
//! in-memory buffer, a pipe, or stdio.

use std::io::{self, Read, Write};

use nfqlb_common::L2Protocol;

/// One packet handed to the classifier, as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    pub packet_id: u32,
    pub protocol: L2Protocol,
    pub payload: Vec<u8>,
}

/// Abstraction over the kernel packet queue. The data-plane loop only ever
/// needs `recv`/`send_verdict`; how packets actually arrive and how
/// verdicts actually get back to the kernel is a transport detail this
/// crate treats as pluggable.
pub trait PacketQueue {
    /// Blocks for the next packet, or `Ok(None)` on clean shutdown (EOF).
    fn recv(&mut self) -> io::Result<Option<InboundPacket>>;
    /// Always an ACCEPT verdict; `mark` of `0` means "leave unmarked".
    fn send_verdict(&mut self, packet_id: u32, mark: u32) -> io::Result<()>;
}

/// A minimal length-prefixed framing over any `Read + Write` stream:
///
/// ```text
/// inbound frame:  [packet_id: u32 LE][l2_protocol: u16 LE][payload_len: u16 LE][payload]
/// outbound frame: [packet_id: u32 LE][mark: u32 LE]
/// ```
///
/// This stands in for the real NFQUEUE message format the out-of-scope
/// kernel transport would use.
pub struct FramedQueue<S> {
    stream: S,
}

impl<S> FramedQueue<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S: Read + Write> PacketQueue for FramedQueue<S> {
    fn recv(&mut self) -> io::Result<Option<InboundPacket>> {
        let mut id_buf = [0u8; 4];
        match self.stream.read_exact(&mut id_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let packet_id = u32::from_le_bytes(id_buf);

        let mut ethertype_buf = [0u8; 2];
        self.stream.read_exact(&mut ethertype_buf)?;
        let protocol = L2Protocol::from(u16::from_le_bytes(ethertype_buf));

        let mut len_buf = [0u8; 2];
        self.stream.read_exact(&mut len_buf)?;
        let len = u16::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;

        Ok(Some(InboundPacket {
            packet_id,
            protocol,
            payload,
        }))
    }

    fn send_verdict(&mut self, packet_id: u32, mark: u32) -> io::Result<()> {
        self.stream.write_all(&packet_id.to_le_bytes())?;
        self.stream.write_all(&mark.to_le_bytes())
    }
}
