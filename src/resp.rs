//! RESP reply parsing
//!
//! Client-side decoding for the sentinel query connection. Replies are
//! parsed incrementally: `Incomplete` means read more bytes and retry.

use bytes::{Bytes, BytesMut};

/// Upper bound on reply array length; a sentinel address reply is a
/// handful of elements, anything larger is a corrupt or hostile header.
const MAX_ARRAY_LEN: i64 = 64;

/// Parse error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Need more data to complete parsing
    Incomplete,
    /// Invalid RESP format
    Invalid(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete data"),
            Self::Invalid(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// A single RESP reply value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(Bytes),
    Error(Bytes),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

/// Parse one reply from a buffer
///
/// Returns (reply, bytes_consumed) on success
pub fn parse_reply(buffer: &BytesMut) -> Result<(Reply, usize), ParseError> {
    parse_value(&buffer[..])
}

fn parse_value(buf: &[u8]) -> Result<(Reply, usize), ParseError> {
    if buf.is_empty() {
        return Err(ParseError::Incomplete);
    }

    match buf[0] {
        b'+' => {
            let (line, consumed) = parse_line(&buf[1..])?;
            Ok((Reply::Simple(Bytes::copy_from_slice(line)), 1 + consumed))
        }
        b'-' => {
            let (line, consumed) = parse_line(&buf[1..])?;
            Ok((Reply::Error(Bytes::copy_from_slice(line)), 1 + consumed))
        }
        b':' => {
            let (value, consumed) = parse_integer(&buf[1..])?;
            Ok((Reply::Integer(value), 1 + consumed))
        }
        b'$' => {
            let (len, len_bytes) = parse_integer(&buf[1..])?;
            let mut pos = 1 + len_bytes;

            if len < 0 {
                return Ok((Reply::Bulk(None), pos));
            }

            let len = len as usize;
            if pos + len + 2 > buf.len() {
                return Err(ParseError::Incomplete);
            }

            if &buf[pos + len..pos + len + 2] != b"\r\n" {
                return Err(ParseError::Invalid("missing bulk terminator".to_string()));
            }

            let data = Bytes::copy_from_slice(&buf[pos..pos + len]);
            pos += len + 2;
            Ok((Reply::Bulk(Some(data)), pos))
        }
        b'*' => {
            let (len, len_bytes) = parse_integer(&buf[1..])?;
            let mut pos = 1 + len_bytes;

            if len < 0 {
                return Ok((Reply::Array(None), pos));
            }
            if len > MAX_ARRAY_LEN {
                return Err(ParseError::Invalid(format!(
                    "array length {} exceeds limit",
                    len
                )));
            }

            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let (item, consumed) = parse_value(&buf[pos..])?;
                items.push(item);
                pos += consumed;
            }
            Ok((Reply::Array(Some(items)), pos))
        }
        other => Err(ParseError::Invalid(format!(
            "unexpected reply type byte {:#04x}",
            other
        ))),
    }
}

/// Parse a line up to \r\n and return (line, bytes_consumed incl. terminator)
fn parse_line(buf: &[u8]) -> Result<(&[u8], usize), ParseError> {
    let cr = buf
        .iter()
        .position(|&b| b == b'\r')
        .ok_or(ParseError::Incomplete)?;

    if cr + 1 >= buf.len() {
        return Err(ParseError::Incomplete);
    }
    if buf[cr + 1] != b'\n' {
        return Err(ParseError::Invalid("missing line terminator".to_string()));
    }

    Ok((&buf[..cr], cr + 2))
}

/// Parse a RESP integer line and return (value, bytes_consumed)
fn parse_integer(buf: &[u8]) -> Result<(i64, usize), ParseError> {
    let (line, consumed) = parse_line(buf)?;

    let num_str = std::str::from_utf8(line)
        .map_err(|_| ParseError::Invalid("invalid utf8 in integer".to_string()))?;

    let value: i64 = num_str
        .parse()
        .map_err(|_| ParseError::Invalid("invalid integer".to_string()))?;

    Ok((value, consumed))
}

/// Encode a command as a RESP array of bulk strings
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let buf = BytesMut::from("+OK\r\n");
        let (reply, consumed) = parse_reply(&buf).unwrap();
        assert_eq!(reply, Reply::Simple(Bytes::from_static(b"OK")));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_error_reply() {
        let buf = BytesMut::from("-ERR unknown\r\n");
        let (reply, _) = parse_reply(&buf).unwrap();
        assert_eq!(reply, Reply::Error(Bytes::from_static(b"ERR unknown")));
    }

    #[test]
    fn test_parse_master_addr_reply() {
        // The sentinel answers GET-MASTER-ADDR-BY-NAME with a two-element
        // array of bulk strings.
        let buf = BytesMut::from("*2\r\n$9\r\n127.0.0.1\r\n$4\r\n6379\r\n");
        let (reply, consumed) = parse_reply(&buf).unwrap();

        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(Bytes::from_static(b"127.0.0.1"))),
                Reply::Bulk(Some(Bytes::from_static(b"6379"))),
            ]))
        );
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_parse_null_replies() {
        let (reply, _) = parse_reply(&BytesMut::from("$-1\r\n")).unwrap();
        assert_eq!(reply, Reply::Bulk(None));

        let (reply, _) = parse_reply(&BytesMut::from("*-1\r\n")).unwrap();
        assert_eq!(reply, Reply::Array(None));
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(
            parse_reply(&BytesMut::from("*2\r\n$9\r\n127.0")),
            Err(ParseError::Incomplete)
        );
        assert_eq!(parse_reply(&BytesMut::from("+OK")), Err(ParseError::Incomplete));
        assert_eq!(parse_reply(&BytesMut::new()), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_bad_bulk_terminator_is_invalid() {
        // Length says 2 but the payload runs past it.
        assert!(matches!(
            parse_reply(&BytesMut::from("$2\r\nabcd\r\n")),
            Err(ParseError::Invalid(_))
        ));
    }

    #[test]
    fn test_oversized_array_header_is_rejected() {
        // A hostile length header must fail outright, not reserve memory
        // and wait for elements that never come.
        assert!(matches!(
            parse_reply(&BytesMut::from("*999999999999\r\n")),
            Err(ParseError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_invalid_type_byte() {
        assert!(matches!(
            parse_reply(&BytesMut::from("?what\r\n")),
            Err(ParseError::Invalid(_))
        ));
    }

    #[test]
    fn test_encode_command() {
        let cmd = encode_command(&[b"SENTINEL", b"get-master-addr-by-name", b"mymaster"]);
        assert_eq!(
            cmd,
            b"*3\r\n$8\r\nSENTINEL\r\n$23\r\nget-master-addr-by-name\r\n$8\r\nmymaster\r\n"
        );
    }
}
