use std::time::Duration;

use super::{SettleContext, Settled, Settler};

/// Finalizes everything once `elapsed >= after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    after: Duration,
}

#[must_use]
pub fn timeout(ms: u64) -> Timeout {
    Timeout {
        after: Duration::from_millis(ms),
    }
}

impl Settler for Timeout {
    fn settle(&mut self, pending: &str, ctx: SettleContext) -> Vec<Settled> {
        if pending.is_empty() || ctx.elapsed < self.after {
            return Vec::new();
        }
        vec![Settled::plain(pending)]
    }
}

/// Finalizes up to and including each blank-line separator (`\n\n`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paragraph;

#[must_use]
pub fn paragraph() -> Paragraph {
    Paragraph
}

impl Settler for Paragraph {
    fn settle(&mut self, pending: &str, _ctx: SettleContext) -> Vec<Settled> {
        split_after(pending, "\n\n")
    }
}

/// Finalizes at each `\n`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Line;

#[must_use]
pub fn line() -> Line {
    Line
}

impl Settler for Line {
    fn settle(&mut self, pending: &str, _ctx: SettleContext) -> Vec<Settled> {
        split_after(pending, "\n")
    }
}

/// Finalizes at each `.`, `?` or `!` followed by whitespace or the end of the text.
///
/// The single whitespace character after the terminator belongs to the sentence it
/// ends, so the next sentence starts on its first visible character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sentence;

#[must_use]
pub fn sentence() -> Sentence {
    Sentence
}

impl Settler for Sentence {
    fn settle(&mut self, pending: &str, _ctx: SettleContext) -> Vec<Settled> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut chars = pending.char_indices().peekable();

        while let Some((index, ch)) = chars.next() {
            if !matches!(ch, '.' | '?' | '!') {
                continue;
            }

            let end = match chars.peek() {
                None => index + ch.len_utf8(),
                Some(&(next_index, next)) if next.is_whitespace() => {
                    chars.next();
                    next_index + next.len_utf8()
                }
                Some(_) => continue,
            };

            out.push(Settled::plain(&pending[start..end]));
            start = end;
        }

        out
    }
}

/// Finalizes everything once the pending text holds at least `limit` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxSize {
    limit: usize,
}

#[must_use]
pub fn max_size(limit: usize) -> MaxSize {
    MaxSize { limit }
}

impl Settler for MaxSize {
    fn settle(&mut self, pending: &str, _ctx: SettleContext) -> Vec<Settled> {
        if pending.is_empty() || pending.chars().count() < self.limit {
            return Vec::new();
        }
        vec![Settled::plain(pending)]
    }
}

fn split_after(pending: &str, separator: &str) -> Vec<Settled> {
    let mut out = Vec::new();
    let mut start = 0;

    while let Some(offset) = pending[start..].find(separator) {
        let end = start + offset + separator.len();
        out.push(Settled::plain(&pending[start..end]));
        start = end;
    }

    out
}
