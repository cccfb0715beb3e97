// SPDX-License-Identifier: Apache-2.0

/// Returns the 1-based line number of byte `offset` in `text`.
pub fn line_at(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Returns the leading whitespace of the line containing byte `offset`.
pub fn indent_at(text: &str, offset: usize) -> &str {
    let end = offset.min(text.len());
    let line_start = text[..end].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let rest = &text[line_start..];
    let indent_len = rest
        .find(|c| c != ' ' && c != '\t')
        .unwrap_or(rest.len());
    &rest[..indent_len]
}

/// Returns the last non-whitespace character strictly before `offset`.
pub fn last_nonblank_before(text: &str, offset: usize) -> Option<char> {
    text[..offset.min(text.len())]
        .chars()
        .rev()
        .find(|c| !c.is_whitespace())
}

/// Returns the byte offset of the start of the line containing `offset`.
pub fn line_start_at(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text[..end].rfind('\n').map(|p| p + 1).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_numbers() {
        let text = "a\nb\nc\n";
        assert_eq!(line_at(text, 0), 1);
        assert_eq!(line_at(text, 2), 2);
        assert_eq!(line_at(text, 4), 3);
        assert_eq!(line_at(text, 100), 4);
    }

    #[test]
    fn indentation() {
        let text = "top\n    mid\n\tdeep\n";
        assert_eq!(indent_at(text, 1), "");
        assert_eq!(indent_at(text, 8), "    ");
        assert_eq!(indent_at(text, 13), "\t");
    }

    #[test]
    fn last_nonblank() {
        let text = ".clk(clk),  \n  ";
        assert_eq!(last_nonblank_before(text, text.len()), Some(','));
        assert_eq!(last_nonblank_before("   ", 3), None);
    }

    #[test]
    fn line_starts() {
        let text = "ab\ncd";
        assert_eq!(line_start_at(text, 1), 0);
        assert_eq!(line_start_at(text, 4), 3);
    }
}
