//! `lbry://` address parsing and normalization.
//!
//! Grammar:
//!
//! ```text
//! address  := "lbry://" path ["?" query]
//! path     := "@" segment ["/" segment] | segment
//! segment  := name [modifier]
//! modifier := ":" hex+ | ("*" | "$") digit+
//! query    := param ("&" param)*
//! param    := name ["=" name]
//! ```
//!
//! Addresses are normalized (NFD, then lowercase) before they are parsed, so
//! visually identical addresses always produce the same [`LbryUrl`] and, in
//! turn, the same local repository identity. Parsing never touches the
//! network.

use std::fmt;

use unicode_normalization::UnicodeNormalization;

use crate::error::{GlbryError, Result};

/// URL scheme prefix for every address.
pub const SCHEME: &str = "lbry://";

const DELIMITERS: &[char] = &['=', '&', '#', ':', '*', '$', '@', '%', '?', '/'];

/// Normalize an address: Unicode NFD decomposition, then lowercase.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    // Lowercasing can yield characters with canonical decompositions, so
    // decompose once more afterwards.
    raw.nfd().collect::<String>().to_lowercase().nfd().collect()
}

/// Returns true if a path segment carries a claim-id (`:`), sequence (`*`)
/// or amount-order (`$`) modifier.
///
/// ```
/// use glbry_core::url::has_modifiers;
/// assert!(has_modifiers("@channel:2345/stream"));
/// assert!(has_modifiers("stream$2"));
/// assert!(!has_modifiers("@channel/stream"));
/// ```
pub fn has_modifiers(segment: &str) -> bool {
    segment.contains([':', '*', '$'])
}

/// Prefix `lbry://` onto user input that omits it.
pub fn with_scheme(raw: &str) -> String {
    if raw.starts_with(SCHEME) {
        raw.to_string()
    } else {
        format!("{SCHEME}{raw}")
    }
}

/// Turn `name`, `@name` or `lbry://@name` into a full channel address.
pub fn channel_with_scheme(raw: &str) -> String {
    if raw.starts_with("lbry://@") {
        raw.to_string()
    } else if raw.starts_with('@') {
        format!("{SCHEME}{raw}")
    } else {
        format!("{SCHEME}@{raw}")
    }
}

/// Disambiguating suffix on a channel or content name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// `:<hex>`, a claim id or a prefix of one.
    ClaimId(String),
    /// `*<digits>`, the n-th claim for the name by time.
    Sequence(String),
    /// `$<digits>`, the n-th claim for the name by bid amount.
    AmountOrder(String),
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::ClaimId(hex) => write!(f, ":{hex}"),
            Modifier::Sequence(n) => write!(f, "*{n}"),
            Modifier::AmountOrder(n) => write!(f, "${n}"),
        }
    }
}

/// A name plus optional modifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// The bare name.
    pub name: String,
    /// The modifier, if any.
    pub modifier: Option<Modifier>,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(modifier) = &self.modifier {
            write!(f, "{modifier}")?;
        }
        Ok(())
    }
}

/// Which of the three address shapes a [`LbryUrl`] has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// `lbry://@channel`
    Channel,
    /// `lbry://content`
    Content,
    /// `lbry://@channel/content`
    ContentInChannel,
}

/// A validated, normalized `lbry://` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LbryUrl {
    normalized: String,
    channel: Option<Segment>,
    content: Option<Segment>,
}

impl LbryUrl {
    /// Normalize and parse a full `lbry://` address.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize(raw);
        let (channel, content) = parse_address(&normalized)
            .ok_or_else(|| GlbryError::InvalidAddress(raw.to_string()))?;
        Ok(Self {
            normalized,
            channel,
            content,
        })
    }

    /// Like [`LbryUrl::parse`], but tolerates a missing `lbry://` prefix.
    pub fn parse_lenient(raw: &str) -> Result<Self> {
        Self::parse(&with_scheme(raw))
    }

    /// The normalized address text.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// The shape of this address.
    pub fn kind(&self) -> AddressKind {
        match (&self.channel, &self.content) {
            (Some(_), Some(_)) => AddressKind::ContentInChannel,
            (Some(_), None) => AddressKind::Channel,
            (None, _) => AddressKind::Content,
        }
    }

    /// True for `Content` and `ContentInChannel` addresses.
    pub fn is_content(&self) -> bool {
        self.content.is_some()
    }

    /// The channel segment, if present.
    pub fn channel(&self) -> Option<&Segment> {
        self.channel.as_ref()
    }

    /// The content segment, if present.
    pub fn content(&self) -> Option<&Segment> {
        self.content.as_ref()
    }

    /// Channel name without `@` or modifiers.
    pub fn channel_name(&self) -> Option<&str> {
        self.channel.as_ref().map(|s| s.name.as_str())
    }

    /// Channel name with its modifier, e.g. `channel:23452`.
    pub fn channel_with_modifiers(&self) -> Option<String> {
        self.channel.as_ref().map(Segment::to_string)
    }

    /// Content (stream) name without modifiers or query.
    pub fn content_name(&self) -> Option<&str> {
        self.content.as_ref().map(|s| s.name.as_str())
    }

    /// Content name with its modifier, e.g. `stream$2`.
    pub fn content_with_modifiers(&self) -> Option<String> {
        self.content.as_ref().map(Segment::to_string)
    }

    /// The `lbry://@channel[modifier]` address of this address's channel.
    pub fn channel_url(&self) -> Option<String> {
        self.channel
            .as_ref()
            .map(|segment| format!("{SCHEME}@{segment}"))
    }
}

impl fmt::Display for LbryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl std::str::FromStr for LbryUrl {
    type Err = GlbryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// True if `raw` normalizes to a valid address.
pub fn is_valid(raw: &str) -> bool {
    parse_address(&normalize(raw)).is_some()
}

// ---------------------------------------------------------------------------
// Recursive descent over the normalized text
// ---------------------------------------------------------------------------

type Parsed = (Option<Segment>, Option<Segment>);

fn parse_address(x: &str) -> Option<Parsed> {
    let rest = x.strip_prefix(SCHEME)?;
    let (parsed, rest) = parse_path(rest)?;
    let rest = parse_optional_query(rest)?;
    rest.is_empty().then_some(parsed)
}

fn parse_path(x: &str) -> Option<(Parsed, &str)> {
    match x.strip_prefix('@') {
        Some(rest) => {
            let (channel, rest) = parse_segment(rest)?;
            match rest.strip_prefix('/') {
                Some(rest) => {
                    let (content, rest) = parse_segment(rest)?;
                    Some(((Some(channel), Some(content)), rest))
                }
                None => Some(((Some(channel), None), rest)),
            }
        }
        None => {
            let (content, rest) = parse_segment(x)?;
            Some(((None, Some(content)), rest))
        }
    }
}

fn parse_segment(x: &str) -> Option<(Segment, &str)> {
    let (name, rest) = take_nonempty(x, is_name_char)?;
    let (modifier, rest) = parse_optional_modifier(rest)?;
    Some((
        Segment {
            name: name.to_string(),
            modifier,
        },
        rest,
    ))
}

fn parse_optional_modifier(x: &str) -> Option<(Option<Modifier>, &str)> {
    if let Some(rest) = x.strip_prefix(':') {
        let (hex, rest) = take_nonempty(rest, |c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())?;
        Some((Some(Modifier::ClaimId(hex.to_string())), rest))
    } else if let Some(rest) = x.strip_prefix('*') {
        let (digits, rest) = take_nonempty(rest, |c| c.is_ascii_digit())?;
        Some((Some(Modifier::Sequence(digits.to_string())), rest))
    } else if let Some(rest) = x.strip_prefix('$') {
        let (digits, rest) = take_nonempty(rest, |c| c.is_ascii_digit())?;
        Some((Some(Modifier::AmountOrder(digits.to_string())), rest))
    } else {
        Some((None, x))
    }
}

fn parse_optional_query(x: &str) -> Option<&str> {
    let Some(mut rest) = x.strip_prefix('?') else {
        return Some(x);
    };
    loop {
        rest = parse_query_param(rest)?;
        match rest.strip_prefix('&') {
            Some(next) => rest = next,
            None => return Some(rest),
        }
    }
}

fn parse_query_param(x: &str) -> Option<&str> {
    let (_, rest) = take_nonempty(x, is_name_char)?;
    match rest.strip_prefix('=') {
        Some(value) => take_nonempty(value, is_name_char).map(|(_, rest)| rest),
        None => Some(rest),
    }
}

/// Split off the longest non-empty prefix whose chars satisfy `pred`.
fn take_nonempty(x: &str, pred: impl Fn(char) -> bool) -> Option<(&str, &str)> {
    let end = x
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(x.len(), |(i, _)| i);
    (end > 0).then(|| x.split_at(end))
}

/// XML `Char` minus the delimiters.
fn is_name_char(c: char) -> bool {
    if DELIMITERS.contains(&c) {
        return false;
    }
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}
