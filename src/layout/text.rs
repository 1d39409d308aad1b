use super::PageLayout;

/// One line per recognized text line, transcription only, each newline-terminated.
pub fn to_plain_text(layout: &PageLayout) -> String {
    let mut text = String::new();
    for line in layout.lines() {
        text.push_str(&line.transcription);
        text.push('\n');
    }
    text
}
