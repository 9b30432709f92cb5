use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Frames an arbitrary byte stream into UTF-8 chunks for the row decoder.
///
/// Malformed sequences are replaced with U+FFFD rather than failing the read.
pub struct Transcoder {
    decoder: encoding_rs::Decoder,
    scratch: Vec<u8>,
    label: &'static str,
    flushed: bool,
}

impl Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            // BOM sniffing: a leading BOM overrides `encoding` and is stripped.
            decoder: encoding.new_decoder(),
            scratch: Vec::new(),
            label: encoding.name(),
            flushed: false,
        }
    }

    fn transcode(&mut self, src: &[u8], last: bool) -> (usize, BytesMut) {
        let needed = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 4);
        self.scratch.clear();
        self.scratch.resize(needed, 0);

        let (_result, read, written, replaced) =
            self.decoder.decode_to_utf8(src, &mut self.scratch, last);
        if replaced {
            tracing::warn!(
                charset = self.label,
                "replaced malformed byte sequence while transcoding"
            );
        }
        (read, BytesMut::from(&self.scratch[..written]))
    }
}

impl Decoder for Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let (read, out) = self.transcode(src, false);
        src.advance(read);
        // A trailing partial character stays inside the decoder until more bytes arrive.
        Ok((!out.is_empty()).then_some(out))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The decoder may still hold a partial character even when `buf` is empty.
        if self.flushed {
            return Ok(None);
        }
        self.flushed = true;

        let (_read, out) = self.transcode(buf, true);
        buf.clear();
        Ok((!out.is_empty()).then_some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_becomes_utf8() {
        let mut codec = Transcoder::new(encoding_rs::WINDOWS_1252);
        let mut src = BytesMut::from(&b"caf\xe9,na\xefve"[..]);
        let out = codec.decode_eof(&mut src).unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&out).unwrap(), "café,naïve");
    }

    #[test]
    fn truncated_character_is_flushed_at_eof() {
        let mut codec = Transcoder::new(encoding_rs::UTF_8);
        let mut src = BytesMut::from(&b"ok\xe2\x82"[..]);
        let head = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&head[..], b"ok");
        assert!(src.is_empty());

        let tail = codec.decode_eof(&mut src).unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&tail).unwrap(), "\u{FFFD}");
        assert!(codec.decode_eof(&mut src).unwrap().is_none());
    }
}
