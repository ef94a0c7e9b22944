use bytes::{Buf, BytesMut};

/// One event the command processor hands to a [`crate::router::Router`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A regular line, to be appended to whichever storage is currently active.
    Push(String),
    /// The outermost `{` of a (possibly nested) dynamic block.
    BlockStart,
    /// The innermost `}` that closes the outermost block, or a stray `}`.
    BlockEnd,
    /// Emitted once, at end of stream, iff no block is left open.
    Flush,
}

/// Tokenizes a raw byte stream into lines and tracks brace nesting.
///
/// `residue` never contains `\n` between calls to [`Self::process`] — any
/// trailing partial line is held until the next chunk completes it, or is
/// silently discarded if the stream ends without a terminating newline.
#[derive(Debug, Default)]
pub struct CommandProcessor {
    residue: BytesMut,
    open_braces: u64,
    processed_lines: u64,
}

impl CommandProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed_lines(&self) -> u64 {
        self.processed_lines
    }

    /// Feed a chunk of bytes (possibly spanning many or partial lines).
    ///
    /// Set `is_final` on the last chunk of a stream (EOF, or connection
    /// teardown) so a trailing `Flush` can be emitted when no block is open.
    pub fn process(&mut self, data: &[u8], is_final: bool) -> Vec<Event> {
        self.residue.extend_from_slice(data);

        let mut events = Vec::new();
        while let Some(pos) = self.residue.iter().position(|&b| b == b'\n') {
            let line = self.residue.split_to(pos);
            self.residue.advance(1);
            let line = String::from_utf8_lossy(&line).into_owned();
            self.processed_lines += 1;

            match line.as_str() {
                "{" => {
                    let was_closed = self.open_braces == 0;
                    self.open_braces += 1;
                    if was_closed {
                        events.push(Event::BlockStart);
                    }
                }
                "}" => {
                    if self.open_braces == 0 {
                        events.push(Event::BlockEnd);
                    } else {
                        self.open_braces -= 1;
                        if self.open_braces == 0 {
                            events.push(Event::BlockEnd);
                        }
                    }
                }
                _ => events.push(Event::Push(line)),
            }
        }

        if is_final && self.open_braces == 0 {
            events.push(Event::Flush);
        }

        events
    }
}
