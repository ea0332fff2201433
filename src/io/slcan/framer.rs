// src/io/slcan/framer.rs
//
// Splits the adapter byte stream into slcan lines on the \r terminator.

use super::codec::SLCAN_TERMINATOR;

/// Default bound on an unterminated line
pub const DEFAULT_MAX_LINE_LEN: usize = 512;

/// Item yielded by [`Lines`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// Bytes preceding a terminator (terminator removed, may be empty)
    Line(Vec<u8>),
    /// The pending line exceeded the bound. Its bytes were dropped and input is
    /// skipped up to the next terminator.
    Overflow { discarded: usize },
}

/// Accumulates chunks and hands out complete lines.
///
/// Produces the same sequence of events for a stream regardless of how the
/// stream is split into chunks.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_len: usize,
    /// Discarding the tail of an overflowed line
    resync: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_line_len: usize) -> Self {
        LineFramer {
            buffer: Vec::with_capacity(64),
            max_line_len: max_line_len.max(1),
            resync: false,
        }
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Append a chunk and iterate the lines it completes.
    ///
    /// Lines are extracted lazily. Anything not pulled from the iterator stays
    /// buffered and is returned by the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(bytes);
        Lines { framer: self }
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.resync = false;
    }

    fn next_event(&mut self) -> Option<FramerEvent> {
        loop {
            let terminator = self.buffer.iter().position(|&b| b == SLCAN_TERMINATOR);

            if self.resync {
                match terminator {
                    Some(pos) => {
                        self.buffer.drain(..=pos);
                        self.resync = false;
                        continue;
                    }
                    None => {
                        self.buffer.clear();
                        return None;
                    }
                }
            }

            return match terminator {
                Some(pos) if pos <= self.max_line_len => {
                    let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                    line.pop();
                    Some(FramerEvent::Line(line))
                }
                Some(pos) => {
                    // Oversized line already fully buffered
                    self.buffer.drain(..=pos);
                    Some(FramerEvent::Overflow { discarded: pos })
                }
                None if self.buffer.len() > self.max_line_len => {
                    let discarded = self.buffer.len();
                    self.buffer.clear();
                    self.resync = true;
                    Some(FramerEvent::Overflow { discarded })
                }
                None => None,
            };
        }
    }
}

/// Lazy iterator over the lines completed by one [`LineFramer::feed`] call
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = FramerEvent;

    fn next(&mut self) -> Option<FramerEvent> {
        self.framer.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(framer: &mut LineFramer, chunk: &[u8]) -> Vec<FramerEvent> {
        framer.feed(chunk).collect()
    }

    fn line(s: &[u8]) -> FramerEvent {
        FramerEvent::Line(s.to_vec())
    }

    #[test]
    fn test_split_lines() {
        let mut framer = LineFramer::default();
        let events = collect(&mut framer, b"z\rT01CAABB\r");
        assert_eq!(events, vec![line(b"z"), line(b"T01CAABB")]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut framer = LineFramer::default();
        assert!(collect(&mut framer, b"T01C01").is_empty());
        assert_eq!(framer.pending(), 6);

        let events = collect(&mut framer, b"02\rT0");
        assert_eq!(events, vec![line(b"T01C0102")]);
        assert_eq!(framer.pending(), 2);
    }

    #[test]
    fn test_back_to_back_terminators_yield_empty_lines() {
        let mut framer = LineFramer::default();
        let events = collect(&mut framer, b"\r\rO\r");
        assert_eq!(events, vec![line(b""), line(b""), line(b"O")]);
    }

    #[test]
    fn test_lazy_iteration_restarts_on_next_feed() {
        let mut framer = LineFramer::default();
        let first = framer.feed(b"a\rb\rc\r").next();
        assert_eq!(first, Some(line(b"a")));

        // Unpulled lines come out ahead of new input
        let events = collect(&mut framer, b"d\r");
        assert_eq!(events, vec![line(b"b"), line(b"c"), line(b"d")]);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let stream: &[u8] = b"T01C0100000010500000\rz\r\rR008\rT0AA12\rT01CFFFFFFFFFFFFFFFF\rtail";

        let mut whole = LineFramer::default();
        let expected = collect(&mut whole, stream);
        assert_eq!(expected.len(), 6);

        for split in 0..=stream.len() {
            let mut framer = LineFramer::default();
            let mut events = collect(&mut framer, &stream[..split]);
            events.extend(collect(&mut framer, &stream[split..]));
            assert_eq!(events, expected, "split at {}", split);
            assert_eq!(framer.pending(), 4);
        }

        let mut bytewise = LineFramer::default();
        let events: Vec<FramerEvent> = stream
            .iter()
            .flat_map(|b| collect(&mut bytewise, std::slice::from_ref(b)))
            .collect();
        assert_eq!(events, expected);
    }

    #[test]
    fn test_overflow_reports_once_and_resyncs() {
        let mut framer = LineFramer::new(16);

        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(collect(&mut framer, b"0123456789"));
        }
        assert_eq!(events, vec![FramerEvent::Overflow { discarded: 20 }]);

        // Tail of the oversized line is skipped, then framing resumes
        let events = collect(&mut framer, b"ABC\rT01CAA\r");
        assert_eq!(events, vec![line(b"T01CAA")]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_overflow_in_single_chunk() {
        let mut framer = LineFramer::new(8);
        let events = collect(&mut framer, b"0123456789ABCDEF\rz\r");
        assert_eq!(
            events,
            vec![FramerEvent::Overflow { discarded: 16 }, line(b"z")]
        );
    }

    #[test]
    fn test_overflow_chunking_is_consistent() {
        let stream: &[u8] = b"z\r0123456789ABCDEFGHIJ\rT01CAA\r";

        let mut whole = LineFramer::new(8);
        let expected: Vec<bool> = collect(&mut whole, stream)
            .iter()
            .map(|e| matches!(e, FramerEvent::Overflow { .. }))
            .collect();
        assert_eq!(expected, vec![false, true, false]);

        for split in 0..=stream.len() {
            let mut framer = LineFramer::new(8);
            let mut events = collect(&mut framer, &stream[..split]);
            events.extend(collect(&mut framer, &stream[split..]));
            let kinds: Vec<bool> = events
                .iter()
                .map(|e| matches!(e, FramerEvent::Overflow { .. }))
                .collect();
            assert_eq!(kinds, expected, "split at {}", split);
            assert_eq!(events.last(), Some(&line(b"T01CAA")));
        }
    }

    #[test]
    fn test_line_at_bound_is_accepted() {
        let mut framer = LineFramer::new(4);
        let events = collect(&mut framer, b"ABCD\r");
        assert_eq!(events, vec![line(b"ABCD")]);
    }

    #[test]
    fn test_reset_drops_partial_line() {
        let mut framer = LineFramer::default();
        assert!(collect(&mut framer, b"T01C").is_empty());
        framer.reset();
        assert_eq!(framer.pending(), 0);
        assert_eq!(collect(&mut framer, b"z\r"), vec![line(b"z")]);
    }
}
