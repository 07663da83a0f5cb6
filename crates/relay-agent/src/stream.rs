use crate::types::GenerateEvent;
use tracing::debug;

/// Incremental parser for newline-delimited JSON streams.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct NdjsonStreamParser {
    buffer: Vec<u8>,
}

impl NdjsonStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<GenerateEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Parse whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<GenerateEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<GenerateEvent> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<GenerateEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Skipping undecodable stream line: {}", e);
            None
        }
    }
}

/// Concatenates streamed fragments until the `done` flag arrives.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    done: bool,
}

impl StreamAccumulator {
    /// Add one event; returns `true` once the stream reported completion.
    pub fn push(&mut self, event: GenerateEvent) -> bool {
        if self.done {
            return true;
        }
        if let Some(fragment) = event.response {
            self.text.push_str(&fragment);
        }
        self.done = event.done;
        self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The collected text, or an empty string if `done` never arrived.
    pub fn finish(self) -> String {
        if self.done {
            self.text
        } else {
            String::new()
        }
    }
}

/// Collect the text of a complete NDJSON body in one shot.
pub fn collect_text(body: &str) -> String {
    let mut parser = NdjsonStreamParser::default();
    let mut acc = StreamAccumulator::default();
    for event in parser.feed(body.as_bytes()).into_iter().chain(parser.finish()) {
        if acc.push(event) {
            break;
        }
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut parser = NdjsonStreamParser::default();
        assert!(parser.feed(b"{\"response\":\"Hel").is_empty());

        let events = parser.feed(b"lo\",\"done\":false}\n{\"response\":\" world\"}\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].response.as_deref(), Some("Hello"));
        assert_eq!(events[1].response.as_deref(), Some(" world"));
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "{\"response\":\"på\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut parser = NdjsonStreamParser::default();
        assert!(parser.feed(&line[..split]).is_empty());
        let events = parser.feed(&line[split..]);
        assert_eq!(events[0].response.as_deref(), Some("på"));
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let mut parser = NdjsonStreamParser::default();
        let events = parser.feed(b"not json\n\n{\"done\":true}\n");
        assert_eq!(events, vec![GenerateEvent { response: None, done: true }]);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut parser = NdjsonStreamParser::default();
        assert!(parser.feed(b"{\"response\":\"x\",\"done\":true}").is_empty());
        assert!(parser.finish().unwrap().done);
    }

    #[test]
    fn test_collect_stops_at_done() {
        let body = concat!(
            "{\"response\":\"[{\\\"program\\\":\",\"done\":false}\n",
            "{\"response\":\"\\\"a.urp\\\"}]\",\"done\":true}\n",
            "{\"response\":\"ignored\",\"done\":false}\n",
        );
        assert_eq!(collect_text(body), "[{\"program\":\"a.urp\"}]");
    }

    #[test]
    fn test_collect_without_done_is_empty() {
        let body = "{\"response\":\"[]\",\"done\":false}\n";
        assert_eq!(collect_text(body), "");
    }
}
