/// Sequences agents emit on startup to wipe the screen. Forwarding them would
/// erase whatever the attached client was showing.
const STARTUP_CLEAR_SEQUENCES: &[&[u8]] = &[
    b"\x1bc",
    b"\x1b[2J",
    b"\x1b[3J",
    b"\x1b[H",
    b"\x1b[1;1H",
    b"\x1b[0;0H",
];

/// Removes a leading run of screen-clear sequences. Anything after the first
/// non-clear byte is left untouched.
pub fn strip_startup_clear(chunk: &[u8]) -> &[u8] {
    let mut rest = chunk;
    'outer: loop {
        for seq in STARTUP_CLEAR_SEQUENCES {
            if let Some(stripped) = rest.strip_prefix(*seq) {
                rest = stripped;
                continue 'outer;
            }
        }
        return rest;
    }
}

/// Applies [`strip_startup_clear`] to the first non-empty chunk of a session only.
#[derive(Debug, Default)]
pub struct StartupClearFilter {
    seen_output: bool,
}

impl StartupClearFilter {
    pub fn filter(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        if self.seen_output || chunk.is_empty() {
            return chunk;
        }
        self.seen_output = true;
        let stripped = strip_startup_clear(&chunk);
        if stripped.len() == chunk.len() {
            chunk
        } else {
            log::debug!("Stripped {} bytes of startup screen clear", chunk.len() - stripped.len());
            stripped.to_vec()
        }
    }
}
