use bytes::{Buf, BufMut};
use commonware_codec::{Error, ReadExt, Write};

/// Write a string as length-prefixed UTF-8 bytes.
pub fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Read a length-prefixed UTF-8 string no longer than `max_len` bytes.
pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

pub fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_string_rejects_too_long() {
        let mut buf = Vec::new();
        write_string("settled", &mut buf);

        let err = read_string(&mut buf.as_slice(), 4).expect_err("should reject long string");
        assert!(matches!(err, Error::Invalid("String", "too long")));
    }

    #[test]
    fn read_string_rejects_truncated_buffers() {
        let mut buf = Vec::new();
        (6u32).write(&mut buf);
        buf.extend_from_slice(b"abc");

        let err = read_string(&mut buf.as_slice(), 10).expect_err("should reject truncation");
        assert!(matches!(err, Error::EndOfBuffer));
    }

    #[test]
    fn read_string_rejects_invalid_utf8() {
        let mut buf = Vec::new();
        (2u32).write(&mut buf);
        buf.extend_from_slice(&[0xff, 0xfe]);

        let err = read_string(&mut buf.as_slice(), 10).expect_err("should reject bad utf-8");
        assert!(matches!(err, Error::Invalid("String", "invalid UTF-8")));
    }

    #[test]
    fn encode_size_counts_prefix() {
        let mut buf = Vec::new();
        write_string("user-42", &mut buf);
        assert_eq!(buf.len(), string_encode_size("user-42"));
        assert_eq!(read_string(&mut buf.as_slice(), 64).unwrap(), "user-42");
    }
}
