//! Line and UTF-16 column indexing.
//!
//! Stylesheet positions are reported as 1-based lines and 1-based columns measured in
//! **UTF-16 code units**, the convention shared by JavaScript tooling and source map
//! consumers. Everything else in the crate works on byte offsets; [`LineIndex`] converts
//! between the two.
//!
//! Lines end before `\n`. A `\r` immediately preceding the `\n` is still counted as part of
//! the line, because the tokenizer reports tokens that start on it.

use std::cmp::Ordering;

/// Number of characters between two column checkpoints on one line.
const CHECKPOINT_STRIDE: usize = 64;

/// A precomputed index of line starts with sparse UTF-16 column checkpoints.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    /// Per line: `(byte offset, utf16 column)` pairs, sorted by byte offset.
    checkpoints: Vec<Vec<(usize, usize)>>,
    len: usize,
}

impl LineIndex {
    pub fn new(s: &str) -> Self {
        let line_starts = compute_line_starts(s);
        let mut checkpoints = Vec::with_capacity(line_starts.len());

        for (i, &start) in line_starts.iter().enumerate() {
            let end = line_starts
                .get(i + 1)
                .map(|next| next.saturating_sub(1))
                .unwrap_or(s.len());

            let mut marks = vec![(start, 0usize)];
            let mut col = 0usize;
            for (n, (rel, ch)) in s[start..end].char_indices().enumerate() {
                col += ch.len_utf16();
                if (n + 1) % CHECKPOINT_STRIDE == 0 {
                    marks.push((start + rel + ch.len_utf8(), col));
                }
            }
            checkpoints.push(marks);
        }

        Self {
            line_starts,
            checkpoints,
            len: s.len(),
        }
    }

    /// Number of lines (an empty string has one).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 0-based line containing `offset`; offsets past the end land on the final line.
    fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search_by(|&probe| {
            if probe <= offset {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    /// Convert a byte offset into a 1-based `(line, utf16 column)` pair.
    ///
    /// Offsets inside a multi-byte character clamp to the start of that character.
    pub fn position(&self, s: &str, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.len);
        let line = self.line_of(offset);
        let marks = &self.checkpoints[line];
        let idx = match marks.binary_search_by(|&(b, _)| b.cmp(&offset)) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        let (mut byte, mut col) = marks[idx];
        for ch in s[byte..].chars() {
            let next = byte + ch.len_utf8();
            if next > offset {
                break;
            }
            byte = next;
            col += ch.len_utf16();
        }
        ((line + 1) as u32, (col + 1) as u32)
    }

    /// Convert a 1-based `(line, utf16 column)` pair into a byte offset.
    ///
    /// Out-of-range lines return `None`; columns past the line end clamp to it.
    pub fn offset(&self, s: &str, line: u32, column: u32) -> Option<usize> {
        let line = (line as usize).checked_sub(1)?;
        self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next.saturating_sub(1))
            .unwrap_or(self.len);
        let target = (column as usize).saturating_sub(1);

        let marks = &self.checkpoints[line];
        let idx = match marks.binary_search_by(|&(_, c)| c.cmp(&target)) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        let (mut byte, mut col) = marks[idx];
        for ch in s[byte..end].chars() {
            if col + ch.len_utf16() > target {
                break;
            }
            col += ch.len_utf16();
            byte += ch.len_utf8();
        }
        Some(byte)
    }
}

/// Byte offsets where each line starts; always includes `0`.
pub fn compute_line_starts(s: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in s.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Length of `s` in UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_starts_with_and_without_trailing_newline() {
        assert_eq!(compute_line_starts("a\nbc\nd\n"), vec![0, 2, 5, 7]);
        assert_eq!(compute_line_starts("a\nb"), vec![0, 2]);
    }

    #[test]
    fn positions_are_one_based() {
        let s = "a {\n  color: red\n}";
        let index = LineIndex::new(s);
        assert_eq!(index.position(s, 0), (1, 1));
        assert_eq!(index.position(s, 2), (1, 3));
        assert_eq!(index.position(s, 4), (2, 1));
        assert_eq!(index.position(s, 6), (2, 3));
        assert_eq!(index.position(s, s.len() - 1), (3, 1));
    }

    #[test]
    fn columns_count_utf16_units() {
        let s = "あ🙂{x}";
        let index = LineIndex::new(s);
        let brace = s.find('{').unwrap();
        // "あ" is one unit, "🙂" is a surrogate pair.
        assert_eq!(index.position(s, brace), (1, 4));
        assert_eq!(index.offset(s, 1, 4), Some(brace));
    }

    #[test]
    fn offset_round_trips_across_checkpoints() {
        let line = "x".repeat(200);
        let s = format!("{line}\n{line}");
        let index = LineIndex::new(&s);
        for offset in [0, 63, 64, 65, 150, 199, 201, 330, 400] {
            let (l, c) = index.position(&s, offset);
            assert_eq!(index.offset(&s, l, c), Some(offset), "offset {offset}");
        }
    }

    #[test]
    fn offset_rejects_missing_line() {
        let s = "a\n";
        let index = LineIndex::new(s);
        assert_eq!(index.offset(s, 3, 1), None);
        assert_eq!(index.offset(s, 0, 1), None);
    }
}
