//! SMTP reply parsing (RFC 5321 section 4.2).

use super::TransportError;
use crate::Reply;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

/// One line of a reply: the code, whether more lines follow, and the text.
#[derive(Debug, PartialEq, Eq)]
struct ResponseLine<'a> {
    code: u16,
    is_last: bool,
    text: &'a str,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All text lines joined with a space.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    fn parse_line(line: &str) -> Result<ResponseLine<'_>, TransportError> {
        let code = line
            .get(..3)
            .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| TransportError::Protocol(format!("Invalid reply line: '{line}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(&other) => {
                return Err(TransportError::Protocol(format!(
                    "Invalid separator character: '{}'",
                    char::from(other)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            text: line.get(4..).unwrap_or_default(),
        })
    }

    /// Parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` if
    /// the buffer does not yet hold the final line. Lines may end in CRLF or
    /// a bare LF.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] if the reply is malformed.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, TransportError> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(std::str::from_utf8(raw)?)?;
            match code {
                Some(expected) if expected != line.code => {
                    return Err(TransportError::Protocol(format!(
                        "Status code mismatch in multi-line reply: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.text.to_string());

            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::new(response.code, response.message())
    }
}
