//! Multipart frame codec for `multipart/x-mixed-replace` feeds.

use bytes::{BufMut, Bytes, BytesMut};

/// Part delimiter used by every frame feed.
pub const BOUNDARY: &str = "frame";

/// Response content type of a frame feed.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// One captured still image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in its stream, starting at 1.
    pub seq: u64,
    pub content_type: &'static str,
    pub data: Bytes,
}

impl Frame {
    /// `--frame\r\nContent-Type: ...\r\n\r\n<bytes>\r\n`
    pub fn to_multipart(&self) -> Bytes {
        let header = format!("--{BOUNDARY}\r\nContent-Type: {}\r\n\r\n", self.content_type);
        let mut buf = BytesMut::with_capacity(header.len() + self.data.len() + 2);
        buf.put_slice(header.as_bytes());
        buf.put_slice(&self.data);
        buf.put_slice(b"\r\n");
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_layout() {
        let frame = Frame {
            seq: 1,
            content_type: "image/jpeg",
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        };
        let part = frame.to_multipart();
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(&part[..], &expected[..]);
    }

    #[test]
    fn test_content_type_declares_boundary() {
        assert!(MULTIPART_CONTENT_TYPE.ends_with(&format!("boundary={BOUNDARY}")));
    }
}
