use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::device::{error::DeviceError, DeviceLine};

/// Lines longer than this are assumed to be noise and are discarded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

const DELIMITER: u8 = b'\n';

/// This codec frames a device byte stream into [`DeviceLine`]s.
///
/// Reading: bytes are buffered until a newline is seen.
/// The newline (and a carriage return before it, if any) is not part of the yielded line.
///
/// Writing: each line is put in the buffer followed by a single newline.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a newline into the buffer
    cursor: usize,

    /// Longest line we are willing to buffer.
    max_length: usize,

    /// Set when a line overflowed, until its terminating newline has been skipped.
    discarding: bool,

    /// Replace bad utf8 instead of failing.
    lossy: bool,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(max_length: usize, lossy: bool) -> Self {
        Self {
            cursor: 0,
            max_length,
            discarding: false,
            lossy,
        }
    }

    /// `None` if the line is not utf8 and we are not lossy.
    fn to_line(&self, bytes: &[u8]) -> Option<DeviceLine> {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);

        if self.lossy {
            return Some(DeviceLine::new_lossy(bytes));
        }

        match String::from_utf8(bytes.to_vec()) {
            Ok(line) => Some(DeviceLine::new(line)),
            Err(e) => {
                warn!(%e, "Discarding device line which is not utf8");
                None
            }
        }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH, true)
    }
}

impl Decoder for LinesCodec {
    type Item = DeviceLine;
    type Error = DeviceError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = src.len();

            let look_at = &src[self.cursor..read_to];

            if let Some(position) = look_at.iter().position(|&byte| byte == DELIMITER) {
                // Since we might "start late" in the buffer (from the cursor),
                // the "global" position within the buffer has to be calculated.
                let actual_position = self.cursor + position;

                // Next time we need to start over.
                self.cursor = 0;

                let line = src.split_to(actual_position);

                // Discard the newline by advancing the source buffer beyond it.
                src.advance(1);

                if self.discarding {
                    // This was the tail of an overlong line.
                    self.discarding = false;
                    continue;
                }

                if line.len() > self.max_length {
                    warn!(
                        length = line.len(),
                        max = self.max_length,
                        "Discarding overlong device line"
                    );
                    continue;
                }

                match self.to_line(&line) {
                    Some(line) => return Ok(Some(line)),
                    None => continue,
                }
            } else {
                if read_to > self.max_length {
                    if !self.discarding {
                        warn!(
                            max = self.max_length,
                            "No newline within limit, discarding until the next one"
                        );
                    }
                    src.clear();
                    self.cursor = 0;
                    self.discarding = true;
                } else {
                    // We did not find a full frame.
                    // The next time we are called the same buffer `src` will be provided to us (same starting point),
                    // but possibly with more data.
                    // Since our job is to find the delimiter, we don't need to re-read the bytes we have already looked at.
                    self.cursor = read_to;
                }

                // Indicate that we need more bytes to look at.
                return Ok(None);
            }
        }
    }
}

impl Encoder<DeviceLine> for LinesCodec {
    type Error = DeviceError;

    fn encode(&mut self, item: DeviceLine, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let item = item.as_str().as_bytes();

        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item);
        dst.extend_from_slice(&[DELIMITER]);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn decode_all(codec: &mut LinesCodec, buffer: &mut BytesMut) -> Vec<String> {
        let mut lines = vec![];
        while let Some(line) = codec.decode(buffer).unwrap() {
            lines.push(line.as_str().to_owned());
        }
        lines
    }

    #[test]
    fn partial_line_is_held_back() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::from("POS:1");

        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"23\nSPE");
        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["POS:123"]);

        buffer.extend_from_slice(b"ED:9\n");
        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["SPEED:9"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn carriage_return_is_stripped() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::from("POS:5\r\nSPEED:3\r\n");

        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["POS:5", "SPEED:3"]);
    }

    #[test]
    fn empty_lines_are_lines() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::from("\n\nPOS:1\n");

        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["", "", "POS:1"]);
    }

    #[test]
    fn framing_does_not_depend_on_chunk_boundaries() {
        let stream = b"POS:100\nSPEED:-20\r\nhello there\n\nPOS:abc\nSPEED:255\ntrailing";

        let mut whole_codec = LinesCodec::default();
        let mut whole = BytesMut::from(&stream[..]);
        let expected = decode_all(&mut whole_codec, &mut whole);

        assert_eq!(expected.len(), 6);

        for chunk_size in 1..stream.len() {
            let mut codec = LinesCodec::default();
            let mut buffer = BytesMut::new();
            let mut lines = vec![];

            for chunk in stream.chunks(chunk_size) {
                buffer.extend_from_slice(chunk);
                lines.extend(decode_all(&mut codec, &mut buffer));
            }

            assert_eq!(lines, expected, "chunk size {chunk_size}");
            assert_eq!(&buffer[..], b"trailing");
        }

        for split in 0..stream.len() {
            let mut codec = LinesCodec::default();
            let mut buffer = BytesMut::from(&stream[..split]);
            let mut lines = decode_all(&mut codec, &mut buffer);

            buffer.extend_from_slice(&stream[split..]);
            lines.extend(decode_all(&mut codec, &mut buffer));

            assert_eq!(lines, expected, "split at {split}");
        }
    }

    #[test]
    fn overlong_line_is_discarded() {
        let mut codec = LinesCodec::new(8, true);
        let mut buffer = BytesMut::from("0123456789");

        assert!(codec.decode(&mut buffer).unwrap().is_none());
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"abcdef\nPOS:1\n");
        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["POS:1"]);
    }

    #[test]
    fn overlong_complete_line_is_discarded() {
        let mut codec = LinesCodec::new(4, true);
        let mut buffer = BytesMut::from("SPEED:100\nPOS:\n");

        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["POS:"]);
    }

    #[test]
    fn strict_codec_skips_bad_utf8() {
        let mut codec = LinesCodec::new(DEFAULT_MAX_LINE_LENGTH, false);
        let mut buffer = BytesMut::from(&b"POS:\xff\nPOS:5\n"[..]);

        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["POS:5"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn lossy_codec_replaces_bad_utf8() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::from(&b"POS:\xff\n"[..]);

        let line = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(line.as_str(), "POS:\u{FFFD}");
    }

    #[test]
    fn encode_appends_newline() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::new();

        codec.encode(DeviceLine::from("MOVE 500"), &mut buffer).unwrap();
        codec.encode(DeviceLine::from("STOP_JOG"), &mut buffer).unwrap();

        assert_eq!(&buffer[..], b"MOVE 500\nSTOP_JOG\n");
    }
}
