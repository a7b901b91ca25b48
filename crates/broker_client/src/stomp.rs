//! STOMP 1.2 frame codec
//!
//! Encodes client frames and incrementally decodes server frames out of
//! WebSocket messages. One WebSocket message may carry several frames, a
//! frame may be split across messages, and bare EOLs between frames are
//! heart-beats.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BrokerError, Result};

/// Frame commands used by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header (builder style)
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers after the first are ignored
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn connect(host: &str, heartbeat_out_ms: u64, heartbeat_in_ms: u64) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", format!("{heartbeat_out_ms},{heartbeat_in_ms}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, body: Bytes) -> Self {
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Serialize to wire bytes, NUL-terminated
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(64 + self.body.len());
        let escape = self.command.escapes_headers();

        out.put_slice(self.command.as_str().as_bytes());
        out.put_u8(b'\n');
        for (name, value) in &self.headers {
            put_header_part(&mut out, name, escape);
            out.put_u8(b':');
            put_header_part(&mut out, value, escape);
            out.put_u8(b'\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.put_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.put_u8(b'\n');
        out.put_slice(&self.body);
        out.put_u8(0);
        out.freeze()
    }

    /// One-line rendering for debug logs: command plus headers, body length
    pub fn summary(&self) -> String {
        let mut line = self.command.as_str().to_string();
        for (name, value) in &self.headers {
            line.push(' ');
            line.push_str(name);
            line.push(':');
            line.push_str(value);
        }
        if !self.body.is_empty() {
            line.push_str(&format!(" ({} bytes)", self.body.len()));
        }
        line
    }
}

fn put_header_part(out: &mut BytesMut, s: &str, escape: bool) {
    if !escape {
        out.put_slice(s.as_bytes());
        return;
    }
    for c in s.chars() {
        match c {
            '\\' => out.put_slice(b"\\\\"),
            '\r' => out.put_slice(b"\\r"),
            '\n' => out.put_slice(b"\\n"),
            ':' => out.put_slice(b"\\c"),
            c => {
                let mut buf = [0u8; 4];
                out.put_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            other => {
                return Err(BrokerError::frame(format!(
                    "invalid header escape sequence '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Returns (head length, body start) once the blank line ending the headers is buffered
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    for (i, b) in buf.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        match (buf.get(i + 1), buf.get(i + 2)) {
            (Some(b'\n'), _) => return Some((i, i + 2)),
            (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
            _ => {}
        }
    }
    None
}

/// Incremental frame decoder
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, `Ok(None)` when more input is needed.
    ///
    /// A malformed frame discards the buffer so decoding resynchronizes on
    /// the next message.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let heartbeats = self
            .buf
            .iter()
            .take_while(|b| **b == b'\n' || **b == b'\r')
            .count();
        self.buf.advance(heartbeats);

        if self.buf.is_empty() {
            return Ok(None);
        }

        match self.try_decode() {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.buf.clear();
                Err(e)
            }
        }
    }

    fn try_decode(&mut self) -> Result<Option<Frame>> {
        let Some((head_len, body_start)) = find_header_end(&self.buf) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&self.buf[..head_len])
            .map_err(|e| BrokerError::frame(format!("frame head is not utf-8: {e}")))?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command_line = lines.next().unwrap_or_default();
        let command = Command::parse(command_line)
            .ok_or_else(|| BrokerError::frame(format!("unknown command '{command_line}'")))?;

        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| BrokerError::frame(format!("malformed header line '{line}'")))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| BrokerError::frame(format!("invalid content-length '{v}'")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let body_end = body_start
                    .checked_add(len)
                    .filter(|end| *end < usize::MAX)
                    .ok_or_else(|| {
                        BrokerError::frame(format!("content-length {len} out of range"))
                    })?;
                if self.buf.len() <= body_end {
                    return Ok(None);
                }
                if self.buf[body_end] != 0 {
                    return Err(BrokerError::frame(
                        "frame body not NUL-terminated at content-length",
                    ));
                }
                body_end
            }
            None => match self.buf[body_start..].iter().position(|b| *b == 0) {
                Some(pos) => body_start + pos,
                None => return Ok(None),
            },
        };

        let mut raw = self.buf.split_to(body_end + 1);
        raw.truncate(body_end);
        let body = raw.split_off(body_start).freeze();

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

/// Negotiated heart-beat intervals `(outgoing, incoming)` in ms, 0 = disabled.
///
/// `server` is the `heart-beat` header of the CONNECTED frame.
pub fn negotiate_heartbeat(client_out_ms: u64, client_in_ms: u64, server: Option<&str>) -> (u64, u64) {
    let (server_out, server_in) = server
        .and_then(|h| h.split_once(','))
        .map(|(sx, sy)| {
            (
                sx.trim().parse::<u64>().unwrap_or(0),
                sy.trim().parse::<u64>().unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));

    let outgoing = if client_out_ms == 0 || server_in == 0 {
        0
    } else {
        client_out_ms.max(server_in)
    };
    let incoming = if client_in_ms == 0 || server_out == 0 {
        0
    } else {
        client_in_ms.max(server_out)
    };
    (outgoing, incoming)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_send_frame() {
        let frame = Frame::send("/app/telemetry", Bytes::from_static(b"{\"a\":1}"));
        let wire = frame.encode();
        assert_eq!(
            &wire[..],
            b"SEND\ndestination:/app/telemetry\ncontent-type:application/json\ncontent-length:7\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn test_connect_headers_not_escaped() {
        let wire = Frame::connect("localhost", 10000, 10000).encode();
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.starts_with("CONNECT\n"));
        assert!(text.contains("heart-beat:10000,10000\n"));
        assert!(text.contains("accept-version:1.2,1.1,1.0\n"));
    }

    #[test]
    fn test_header_escaping() {
        let wire = Frame::subscribe("sub-0", "/topic/a:b").encode();
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.contains("destination:/topic/a\\cb\n"));

        let mut decoder = FrameDecoder::new();
        decoder.feed(b"MESSAGE\ndestination:/topic/a\\cb\\n\\\\\n\n\0");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.get("destination"), Some("/topic/a:b\n\\"));
    }

    #[test]
    fn test_decode_multiple_frames_and_heartbeats() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(
            b"\n\nMESSAGE\nsubscription:sub-0\ndestination:/topic/vehicle/1\n\n{\"lat\":1}\0\n\
              MESSAGE\nsubscription:sub-1\ndestination:/topic/vehicle/2\n\n{\"lat\":2}\0",
        );

        let first = decoder.next_frame().unwrap().unwrap();
        assert_eq!(first.command, Command::Message);
        assert_eq!(first.get("subscription"), Some("sub-0"));
        assert_eq!(first.body_str(), Some("{\"lat\":1}"));

        let second = decoder.next_frame().unwrap().unwrap();
        assert_eq!(second.get("subscription"), Some("sub-1"));
        assert_eq!(second.body_str(), Some("{\"lat\":2}"));

        assert!(decoder.next_frame().unwrap().is_none());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decode_split_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"MESSAGE\ndestination:/t\ncontent-le");
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.feed(b"ngth:3\n\nab");
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.feed(b"c\0");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&frame.body[..], b"abc");
    }

    #[test]
    fn test_content_length_allows_nul_in_body() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"MESSAGE\ncontent-length:3\n\na\0b\0");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&frame.body[..], b"a\0b");
    }

    #[test]
    fn test_oversized_content_length_rejected() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(format!("MESSAGE\ncontent-length:{}\n\nab\0", usize::MAX).as_bytes());
        let err = decoder.next_frame().unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(decoder.pending(), 0);

        decoder.feed(b"MESSAGE\ncontent-length:2\n\nab\0");
        assert_eq!(&decoder.next_frame().unwrap().unwrap().body[..], b"ab");
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
    }

    #[test]
    fn test_malformed_frame_resyncs() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"BOGUS\n\n\0");
        assert!(decoder.next_frame().is_err());
        assert_eq!(decoder.pending(), 0);

        decoder.feed(b"RECEIPT\nreceipt-id:1\n\n\0");
        assert_eq!(
            decoder.next_frame().unwrap().unwrap().command,
            Command::Receipt
        );
    }

    #[test]
    fn test_first_repeated_header_wins() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"MESSAGE\nfoo:first\nfoo:second\n\n\0");
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.get("foo"), Some("first"));
    }

    #[test]
    fn test_negotiate_heartbeat() {
        assert_eq!(negotiate_heartbeat(10000, 10000, Some("0,0")), (0, 0));
        assert_eq!(negotiate_heartbeat(10000, 10000, Some("5000,20000")), (20000, 10000));
        assert_eq!(negotiate_heartbeat(0, 10000, Some("5000,5000")), (0, 10000));
        assert_eq!(negotiate_heartbeat(10000, 10000, None), (0, 0));
    }
}
