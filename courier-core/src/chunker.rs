//! Outbound message chunking
//!
//! Splits a reply into consecutive pieces that each fit the transport's
//! message-size limit. A chunk never splits a character, and concatenating
//! the chunks always yields the input.

/// Default per-message limit for outbound transport sends
pub const DEFAULT_CHUNK_LIMIT: usize = 4000;

/// How a transport measures message length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    /// Unicode scalar values
    #[default]
    Chars,
    /// UTF-16 code units; characters outside the BMP count twice
    Utf16,
}

impl LengthUnit {
    fn width(self, c: char) -> usize {
        match self {
            LengthUnit::Chars => 1,
            LengthUnit::Utf16 => c.len_utf16(),
        }
    }

    /// Length of `text` in this unit
    pub fn measure(self, text: &str) -> usize {
        match self {
            LengthUnit::Chars => text.chars().count(),
            LengthUnit::Utf16 => text.encode_utf16().count(),
        }
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Empty input yields no chunks. A cut is placed right after the last
/// newline inside the window when that newline lies past the window's
/// midpoint; otherwise the window is cut at exactly `limit` characters.
/// A `limit` of zero is treated as one.
pub fn chunk(text: &str, limit: usize) -> Vec<String> {
    chunk_by(text, limit, LengthUnit::Chars)
}

/// Like [`chunk`], with `limit` counted in `unit`.
///
/// A single character wider than `limit` still gets a chunk of its own.
pub fn chunk_by(text: &str, limit: usize, unit: LengthUnit) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let cut = cut_point(remaining, limit, unit);
        let (head, tail) = remaining.split_at(cut);
        chunks.push(head.to_string());
        remaining = tail;
    }

    chunks
}

/// Byte offset of the end of the next chunk in `text`
fn cut_point(text: &str, limit: usize, unit: LengthUnit) -> usize {
    let mut used = 0;
    let mut midpoint = None;
    let mut window_end = None;

    for (offset, c) in text.char_indices() {
        if midpoint.is_none() && used >= limit / 2 {
            midpoint = Some(offset);
        }
        let width = unit.width(c);
        if used + width > limit {
            window_end = Some(if offset == 0 { c.len_utf8() } else { offset });
            break;
        }
        used += width;
    }

    let Some(window_end) = window_end else {
        return text.len();
    };
    let midpoint = midpoint.unwrap_or(window_end);

    match text[..window_end].rfind('\n') {
        Some(newline) if newline >= midpoint => newline + 1,
        _ => window_end,
    }
}
