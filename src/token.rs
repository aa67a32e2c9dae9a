use memchr::memchr2;
use memchr::memmem::Finder;
use smallvec::SmallVec;
use std::fmt;

/// Prefix that introduces an error code inside a log line.
pub const MARKER: &[u8] = b"Error: ";

/// Longest error code kept; anything past this is cut off.
pub const MAX_TOKEN_LEN: usize = 49;

/// An error code, stored inline. Always at most `MAX_TOKEN_LEN` bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(SmallVec<[u8; MAX_TOKEN_LEN]>);

impl Token {
    /// Build a token from raw bytes, truncating to `MAX_TOKEN_LEN`.
    pub fn new(bytes: &[u8]) -> Self {
        let keep = bytes.len().min(MAX_TOKEN_LEN);
        Token(SmallVec::from_slice(&bytes[..keep]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::new(s.as_bytes())
    }
}

impl From<&[u8]> for Token {
    fn from(bytes: &[u8]) -> Self {
        Token::new(bytes)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Pulls the error code out of a single line.
///
/// The code starts right after the first `MARKER` and runs until a `"`, a
/// newline, the end of the line, or `MAX_TOKEN_LEN` bytes. Lines without the
/// marker yield nothing. A marker followed directly by a terminator yields an
/// empty token, which is counted like any other.
pub struct TokenExtractor {
    finder: Finder<'static>,
}

impl TokenExtractor {
    pub fn new() -> Self {
        TokenExtractor {
            finder: Finder::new(MARKER),
        }
    }

    pub fn extract(&self, line: &[u8]) -> Option<Token> {
        let at = self.finder.find(line)?;
        let rest = &line[at + MARKER.len()..];
        let end = memchr2(b'"', b'\n', rest).unwrap_or(rest.len());
        Some(Token::new(&rest[..end]))
    }
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self::new()
    }
}
