pub mod calibrate;
pub mod notes;
pub mod search;
pub mod serve;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Single-line preview that fits `max_width` terminal columns
pub fn fit_width(text: &str, max_width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.width() <= max_width {
        return flat;
    }

    let budget = max_width.saturating_sub(3);
    let mut out = String::new();
    let mut width = 0;
    for ch in flat.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(ch);
    }
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_width_ascii() {
        assert_eq!(fit_width("short", 10), "short");
        assert_eq!(fit_width("line one\nline two", 40), "line one line two");
        assert_eq!(fit_width("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_fit_width_counts_wide_chars() {
        // each of these takes two columns
        let out = fit_width("메모메모메모", 7);
        assert_eq!(out, "메모...");
        assert!(out.width() <= 7);
    }
}
