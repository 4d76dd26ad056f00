//! The KATCP message grammar: one line per message, a kind prefix, a name, and
//! whitespace-separated arguments with backslash escapes. Arguments are byte
//! strings, not text, because register reads come back as raw binary. This
//! implements the version 4 dialect that `tcpborphserver` speaks (no message
//! identifiers).

use nom::{
    bytes::complete::{take, take_while1},
    combinator::{map_res, opt, verify},
    multi::many0,
    sequence::preceded,
    IResult,
};
use thiserror::Error;

/// Errors produced while parsing or unescaping a message line
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Empty message line")]
    Empty,
    #[error("Message must start with one of `?`, `!`, `#`, got byte {0:#04x}")]
    BadKind(u8),
    #[error("Dangling escape at the end of an argument")]
    DanglingEscape,
    #[error("Unknown escape code `\\{0}`")]
    UnknownEscape(char),
    #[error("Raw special byte {0:#04x} inside an argument")]
    UnescapedSpecial(u8),
    #[error("Parsing failed to match the grammar")]
    ParseMatch,
}

/// The three message kinds, distinguished by their prefix character
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    /// `?` - a request from client to server
    Request,
    /// `!` - the server's reply to a request
    Reply,
    /// `#` - an inform, either belonging to a request or asynchronous
    Inform,
}

impl Kind {
    #[must_use]
    pub fn prefix(self) -> u8 {
        match self {
            Kind::Request => b'?',
            Kind::Reply => b'!',
            Kind::Inform => b'#',
        }
    }

    fn from_prefix(byte: u8) -> Option<Self> {
        Some(match byte {
            b'?' => Kind::Request,
            b'!' => Kind::Reply,
            b'#' => Kind::Inform,
            _ => return None,
        })
    }
}

/// A single KATCP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub name: String,
    pub arguments: Vec<Vec<u8>>,
}

fn is_separator(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-'
}

/// Escape one argument for the wire. The empty argument becomes `\@`.
#[must_use]
pub fn escape(argument: &[u8]) -> Vec<u8> {
    if argument.is_empty() {
        return b"\\@".to_vec();
    }
    let mut out = Vec::with_capacity(argument.len());
    for &byte in argument {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b' ' => out.extend_from_slice(b"\\_"),
            0x00 => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            0x1B => out.extend_from_slice(b"\\e"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(byte),
        }
    }
    out
}

/// Undo [`escape`]. Bytes that should have been escaped are an error, as is a
/// trailing lone backslash.
pub fn unescape(raw: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&byte) = bytes.next() {
        match byte {
            b'\\' => match bytes.next() {
                Some(b'\\') => out.push(b'\\'),
                Some(b'_') => out.push(b' '),
                Some(b'0') => out.push(0x00),
                Some(b'n') => out.push(b'\n'),
                Some(b'r') => out.push(b'\r'),
                Some(b'e') => out.push(0x1B),
                Some(b't') => out.push(b'\t'),
                // The empty-argument marker decodes to nothing
                Some(b'@') => {}
                Some(&code) => return Err(Error::UnknownEscape(code as char)),
                None => return Err(Error::DanglingEscape),
            },
            0x00 | b'\n' | b'\r' | 0x1B => return Err(Error::UnescapedSpecial(byte)),
            _ => out.push(byte),
        }
    }
    Ok(out)
}

fn kind(input: &[u8]) -> IResult<&[u8], Kind> {
    map_res(take(1usize), |prefix: &[u8]| {
        Kind::from_prefix(prefix[0]).ok_or(Error::ParseMatch)
    })(input)
}

fn name(input: &[u8]) -> IResult<&[u8], &str> {
    map_res(
        verify(take_while1(is_name_char), |word: &[u8]| {
            word[0].is_ascii_alphabetic()
        }),
        std::str::from_utf8,
    )(input)
}

fn argument(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|byte| !is_separator(byte))(input)
}

fn separator(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_separator)(input)
}

type RawMessage<'a> = (Kind, &'a str, Vec<&'a [u8]>);

fn message(input: &[u8]) -> IResult<&[u8], RawMessage> {
    let (remaining, kind) = kind(input)?;
    let (remaining, name) = name(remaining)?;
    let (remaining, raw_args) = many0(preceded(separator, argument))(remaining)?;
    // Trailing whitespace before the terminator is legal
    let (remaining, _) = opt(separator)(remaining)?;
    Ok((remaining, (kind, name, raw_args)))
}

impl Message {
    /// Build a request message from a name and raw (unescaped) arguments
    #[must_use]
    pub fn request(name: &str, arguments: &[&[u8]]) -> Self {
        Self {
            kind: Kind::Request,
            name: name.to_string(),
            arguments: arguments.iter().map(|a| a.to_vec()).collect(),
        }
    }

    /// Parse one message from a line with the terminator already stripped
    /// # Errors
    /// Returns an error when the line doesn't match the grammar or contains
    /// malformed escapes
    pub fn parse(line: &[u8]) -> Result<Self, Error> {
        if line.is_empty() {
            return Err(Error::Empty);
        }
        if Kind::from_prefix(line[0]).is_none() {
            return Err(Error::BadKind(line[0]));
        }
        let (remaining, (kind, name, raw_args)) =
            message(line).map_err(|_| Error::ParseMatch)?;
        if !remaining.is_empty() {
            return Err(Error::ParseMatch);
        }
        let arguments = raw_args
            .into_iter()
            .map(unescape)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            kind,
            name: name.to_string(),
            arguments,
        })
    }

    /// Serialize to a wire line, including the newline terminator
    #[must_use]
    pub fn unparse(&self) -> Vec<u8> {
        let mut bytes = vec![self.kind.prefix()];
        bytes.extend_from_slice(self.name.as_bytes());
        for argument in &self.arguments {
            bytes.push(b' ');
            bytes.extend_from_slice(&escape(argument));
        }
        bytes.push(b'\n');
        bytes
    }

    /// The argument at `idx`, if present
    #[must_use]
    pub fn arg(&self, idx: usize) -> Option<&[u8]> {
        self.arguments.get(idx).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_specials() {
        assert_eq!(escape(b"a b"), b"a\\_b".to_vec());
        assert_eq!(
            escape(&[b'\\', 0x00, b'\n', b'\r', 0x1B, b'\t']),
            b"\\\\\\0\\n\\r\\e\\t".to_vec()
        );
    }

    #[test]
    fn test_escape_empty() {
        assert_eq!(escape(b""), b"\\@".to_vec());
    }

    #[test]
    fn test_unescape_roundtrip() {
        let nasty = [b'a', b' ', 0x00, b'\n', b'\r', 0x1B, b'\t', b'\\', 0xFF];
        assert_eq!(unescape(&escape(&nasty)).unwrap(), nasty.to_vec());
    }

    #[test]
    fn test_unescape_dangling() {
        assert_eq!(unescape(b"abc\\"), Err(Error::DanglingEscape));
    }

    #[test]
    fn test_unescape_unknown_code() {
        assert_eq!(unescape(b"\\q"), Err(Error::UnknownEscape('q')));
    }

    #[test]
    fn test_unescape_raw_special() {
        assert_eq!(unescape(&[b'a', 0x0D]), Err(Error::UnescapedSpecial(0x0D)));
    }

    #[test]
    fn test_parse_request() {
        let msg = Message::parse(b"?progdev spoco12.bof").unwrap();
        assert_eq!(msg.kind, Kind::Request);
        assert_eq!(msg.name, "progdev");
        assert_eq!(msg.arguments, vec![b"spoco12.bof".to_vec()]);
    }

    #[test]
    fn test_parse_reply() {
        let msg = Message::parse(b"!wordread ok 0xdeadbeef").unwrap();
        assert_eq!(msg.kind, Kind::Reply);
        assert_eq!(msg.name, "wordread");
        assert_eq!(msg.arg(0), Some(&b"ok"[..]));
        assert_eq!(msg.arg(1), Some(&b"0xdeadbeef"[..]));
    }

    #[test]
    fn test_parse_inform_no_args() {
        let msg = Message::parse(b"#listdev-done").unwrap();
        assert_eq!(msg.kind, Kind::Inform);
        assert_eq!(msg.name, "listdev-done");
        assert!(msg.arguments.is_empty());
    }

    #[test]
    fn test_parse_multiple_separators() {
        let msg = Message::parse(b"!read \tok  \\@").unwrap();
        assert_eq!(msg.arguments, vec![b"ok".to_vec(), vec![]]);
    }

    #[test]
    fn test_parse_trailing_whitespace() {
        let msg = Message::parse(b"!watchdog ok ").unwrap();
        assert_eq!(msg.arguments, vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Message::parse(b""), Err(Error::Empty));
    }

    #[test]
    fn test_parse_bad_kind() {
        assert_eq!(Message::parse(b"progdev"), Err(Error::BadKind(b'p')));
    }

    #[test]
    fn test_parse_bad_name() {
        assert_eq!(Message::parse(b"?1progdev"), Err(Error::ParseMatch));
    }

    #[test]
    fn test_unparse_request() {
        let msg = Message::request("wordwrite", &[b"acc_length", b"0", b"0x200"]);
        assert_eq!(msg.unparse(), b"?wordwrite acc_length 0 0x200\n".to_vec());
    }

    #[test]
    fn test_unparse_escapes_binary() {
        let msg = Message::request("write", &[b"eq_0_1_coeffs", b"0", &[0x00, b' ', 0xAB]]);
        assert_eq!(
            msg.unparse(),
            b"?write eq_0_1_coeffs 0 \\0\\_\xAB\n".to_vec()
        );
    }

    #[test]
    fn test_unparse_empty_argument() {
        let msg = Message::request("log", &[b""]);
        assert_eq!(msg.unparse(), b"?log \\@\n".to_vec());
    }

    #[test]
    fn test_roundtrip_binary_argument() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let msg = Message::request("write", &[b"dev", b"0", &payload]);
        let line = msg.unparse();
        let parsed = Message::parse(&line[..line.len() - 1]).unwrap();
        assert_eq!(parsed, msg);
    }
}
