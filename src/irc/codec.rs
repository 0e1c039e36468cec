/// IRC line codec: frames a byte stream into IRC messages.
///
/// Splits on `\n` (tolerating a missing `\r`), parses each line into an
/// [`IrcMessage`], and serializes outgoing messages with `\r\n` termination.
///
/// Oversized lines are skipped rather than killing the connection. Lines
/// that fail to parse decode to the empty sentinel message so the caller can
/// keep reading.
use bytes::{Buf, BufMut, BytesMut};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead};
use tracing::{debug, warn};

use super::parser::{IrcMessage, MAX_LINE_LENGTH};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("message cannot be represented on the wire")]
    Unrepresentable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct IrcCodec {
    /// True while discarding an oversized line and waiting for its terminator.
    skipping: bool,
}

impl Decoder for IrcCodec {
    type Item = IrcMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH + 2 {
                    warn!(bytes = src.len(), "codec: discarding oversized partial line");
                    src.clear();
                    self.skipping = true;
                }
                return Ok(None);
            };

            let line = src.split_to(pos + 1);

            if self.skipping {
                self.skipping = false;
                debug!(bytes = line.len(), "codec: finished skipping oversized line tail");
                continue;
            }

            if line.len() > MAX_LINE_LENGTH + 2 {
                warn!(bytes = line.len(), "codec: skipped oversized IRC line");
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            return Ok(Some(IrcMessage::parse(&text).unwrap_or_default()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None => {
                // An unterminated final line still counts as a message.
                if src.is_empty() || self.skipping {
                    src.clear();
                    return Ok(None);
                }
                let text = String::from_utf8_lossy(&src[..]).into_owned();
                src.advance(src.len());
                Ok(Some(IrcMessage::parse(&text).unwrap_or_default()))
            }
        }
    }
}

impl Encoder<IrcMessage> for IrcCodec {
    type Error = CodecError;

    fn encode(&mut self, item: IrcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire = item.to_wire().ok_or(CodecError::Unrepresentable)?;
        dst.reserve(wire.len());
        dst.put_slice(wire.as_bytes());
        Ok(())
    }
}

/// Lazy producer of [`IrcMessage`]s from a byte stream.
///
/// Cancel-safe: dropping a pending `next_message` future loses no buffered
/// input, so the read loop can race it against other events.
pub struct MessageParser<R> {
    frames: FramedRead<R, IrcCodec>,
}

impl<R: AsyncRead + Unpin> MessageParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            frames: FramedRead::new(reader, IrcCodec::default()),
        }
    }

    /// The next message, or `None` once the stream has ended or failed.
    ///
    /// `Some` may carry the empty sentinel for a blank or unparseable line.
    pub async fn next_message(&mut self) -> Option<IrcMessage> {
        match self.frames.next().await? {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!(error = %e, "read failed, ending stream");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<IrcMessage> {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(&mut buf).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_decode_crlf_and_lf() {
        let msgs = decode_all(b"NICK alice\r\nUSER alice 0 * :Alice\nPING");
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].is("NICK"));
        assert!(msgs[1].is("USER"));
    }

    #[test]
    fn test_decode_blank_line_is_sentinel() {
        let msgs = decode_all(b"\r\nNICK alice\r\n");
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].is_empty());
        assert!(msgs[1].is("NICK"));
    }

    #[test]
    fn test_decode_skips_oversized_line() {
        let mut input = vec![b'x'; MAX_LINE_LENGTH + 10];
        input.extend_from_slice(b"\r\nNICK alice\r\n");
        let msgs = decode_all(&input);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].is("NICK"));
    }

    #[test]
    fn test_decode_skips_oversized_partial_line() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&vec![b'x'; MAX_LINE_LENGTH + 3][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(b"tail\r\nNICK alice\r\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert!(msg.is("NICK"));
    }

    #[test]
    fn test_decode_eof_unterminated() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"QUIT :bye"[..]);
        let msg = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert!(msg.is("QUIT"));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_encode() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(IrcMessage::new("PING").with_trailing("channels"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PING :channels\r\n");
        assert!(matches!(
            codec.encode(IrcMessage::default(), &mut buf),
            Err(CodecError::Unrepresentable)
        ));
    }

    #[tokio::test]
    async fn test_parser_reports_end_of_stream() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut parser = MessageParser::new(server);

        tokio::io::AsyncWriteExt::write_all(&mut client, b"PONG :channels\r\n")
            .await
            .unwrap();
        drop(client);

        let msg = parser.next_message().await.unwrap();
        assert!(msg.is("PONG"));
        assert!(parser.next_message().await.is_none());
    }
}
