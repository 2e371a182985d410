use nexryde_logic::{FeedEvent, prelude::*};

/// Incremental decoder for the store's server-sent-events stream. Network
/// chunks can split an event anywhere, so input is buffered until the blank
/// line terminating the event arrives.
#[derive(Debug, Default)]
pub struct FeedDecoder {
    buffer: String,
}

impl FeedDecoder {
    /// Consume one chunk of bytes, returning every event it completed
    pub fn consume(&mut self, chunk: &[u8]) -> Result<Vec<FeedEvent>> {
        let text = std::str::from_utf8(chunk).context("Feed chunk is not UTF-8")?;
        self.buffer.push_str(text);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let raw = self.buffer[..end].to_string();
            self.buffer.drain(..end + 2);
            if let Some(event) = Self::parse_event(&raw)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn parse_event(raw: &str) -> Result<Option<FeedEvent>> {
        let mut data = String::new();
        for line in raw.lines() {
            if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.trim_start());
            }
            // Anything else is a comment or a field we don't use
        }

        if data.is_empty() {
            return Ok(None);
        }

        let event = serde_json::from_str(&data).context("Failed to decode feed event")?;
        Ok(Some(event))
    }
}
