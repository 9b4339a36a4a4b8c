//! Terminal styling for diagnostics. Helpers are named after the part of
//! a diagnostic they paint — the error head, the note head, the excerpt
//! gutter, the caret underline — so the renderer reads as layout rather
//! than as raw colors. Every painted fragment resets itself.

const RESET: &str = "\x1b[0m";

pub struct Style;

impl Style {
    /// The head of a diagnostic, e.g. `error[P0001]`.
    pub fn error_label(text: &str) -> String {
        paint("1;31", text)
    }

    /// The head of an attached note.
    pub fn note_label(text: &str) -> String {
        paint("36", text)
    }

    /// The line-number column and `|` rail of a source excerpt.
    pub fn gutter(text: &str) -> String {
        paint("34", text)
    }

    /// The `^^^` underline pointing into an excerpt.
    pub fn caret(text: &str) -> String {
        paint("31", text)
    }

    /// Inline emphasis, e.g. a quoted identifier inside a message.
    pub fn emphasis(text: &str) -> String {
        paint("1", text)
    }
}

fn paint(sgr: &str, text: &str) -> String {
    format!("\x1b[{sgr}m{text}{RESET}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fragment_resets_itself() {
        for painted in [
            Style::error_label("error[P0001]"),
            Style::note_label("note:"),
            Style::gutter("  12 |"),
            Style::caret("^^^"),
            Style::emphasis("fib"),
        ] {
            assert!(painted.starts_with("\x1b["), "{painted:?}");
            assert!(painted.ends_with(RESET), "{painted:?}");
        }
    }

    #[test]
    fn error_label_is_bold_red() {
        assert_eq!(Style::error_label("e"), "\x1b[1;31me\x1b[0m");
    }

    #[test]
    fn gutter_and_caret_paint_differently() {
        assert_ne!(Style::gutter("|"), Style::caret("|"));
    }

    #[test]
    fn text_survives_painting() {
        let painted = Style::note_label("note: previously declared here");
        assert!(painted.contains("previously declared here"));
    }
}
