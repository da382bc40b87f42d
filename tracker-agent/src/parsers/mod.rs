//! Turning file names and raw log lines into entry fields.

pub mod filename;
pub mod line;

pub use filename::{entity_from_path, Entity};
pub use line::{LineParser, ParsedLine, TimestampZone, NO_TIMESTAMP_MARKER};

pub const LINE_PREVIEW_LIMIT: usize = 256;

/// Creates a preview string from a byte slice, truncating at [`LINE_PREVIEW_LIMIT`] characters.
/// Used for logging and error messages without overwhelming the output.
pub(crate) fn line_preview(line: &[u8]) -> String {
    let text = String::from_utf8_lossy(line);
    let mut preview = String::new();
    for (idx, ch) in text.chars().enumerate() {
        if idx >= LINE_PREVIEW_LIMIT {
            preview.push('…');
            return preview;
        }
        preview.push(ch);
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_lines() {
        let long = "x".repeat(LINE_PREVIEW_LIMIT + 10);
        let preview = line_preview(long.as_bytes());
        assert_eq!(preview.chars().count(), LINE_PREVIEW_LIMIT + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn preview_keeps_short_lines() {
        assert_eq!(line_preview(b"Orc hits"), "Orc hits");
    }
}
