/// Long-lived emulated screen for one session, used to hand attaching
/// clients the current picture instead of replaying raw history.
pub struct TerminalScreen {
    parser: vt100::Parser,
    size: (u16, u16),
}

impl TerminalScreen {
    pub fn new(cols: u16, rows: u16) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            parser: vt100::Parser::new(rows, cols, 0),
            size: (cols, rows),
        }
    }

    pub fn process(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if (cols, rows) == self.size || cols == 0 || rows == 0 {
            return;
        }
        self.size = (cols, rows);
        self.parser.screen_mut().set_size(rows, cols);
    }

    /// Escape-sequence rendition of the visible screen, ready to write to a
    /// freshly attached terminal.
    pub fn snapshot(&self) -> Vec<u8> {
        self.parser.screen().contents_formatted()
    }

    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }

    /// Last `tail` non-blank rows of the rendered screen, trailing
    /// whitespace trimmed. In-place redraws show up here merged with what
    /// was already on screen.
    pub fn tail_lines(&self, tail: usize) -> Vec<String> {
        let (cols, _) = self.size;
        let mut lines: Vec<String> = self
            .parser
            .screen()
            .rows(0, cols)
            .map(|row| row.trim_end().to_string())
            .filter(|row| !row.is_empty())
            .collect();
        let start = lines.len().saturating_sub(tail);
        lines.drain(..start);
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_cursor_movement_instead_of_raw_escapes() {
        let mut screen = TerminalScreen::new(80, 24);
        screen.process(b"Working\r\x1b[KDone\r\n\x1b[1mProceed? [y/n]\x1b[0m");
        assert_eq!(
            screen.tail_lines(10),
            vec!["Done".to_string(), "Proceed? [y/n]".to_string()]
        );
    }

    #[test]
    fn keeps_only_the_tail() {
        let mut screen = TerminalScreen::new(80, 24);
        let batch: Vec<u8> = (0..30).flat_map(|i| format!("line {i}\r\n").into_bytes()).collect();
        screen.process(&batch);
        let lines = screen.tail_lines(5);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines.first().map(String::as_str), Some("line 25"));
        assert_eq!(lines.last().map(String::as_str), Some("line 29"));
    }

    #[test]
    fn partial_redraw_merges_with_existing_rows() {
        let mut screen = TerminalScreen::new(80, 24);
        screen.process(b"\x1b[1;1H* Thinking (3s) esc to interrupt");
        screen.process(b"\x1b[1;14H4");
        assert_eq!(
            screen.tail_lines(20),
            vec!["* Thinking (34) esc to interrupt".to_string()]
        );
    }

    #[test]
    fn blank_screen_has_no_tail() {
        let mut screen = TerminalScreen::new(80, 24);
        screen.process(b"\x1b[5;5H");
        assert!(screen.tail_lines(20).is_empty());
    }

    #[test]
    fn screen_snapshot_reflects_latest_output() {
        let mut screen = TerminalScreen::new(40, 5);
        screen.process(b"hello\r\nworld");
        assert!(screen.contents().contains("world"));
        assert!(!screen.snapshot().is_empty());
        screen.resize(60, 10);
        assert!(screen.contents().contains("hello"));
    }
}
