//! Server-sent-event framing for the chat stream.
//!
//! Bytes arrive in arbitrary chunks. The decoder buffers text until a blank
//! line closes a block, so blocks and multi-byte characters split across
//! chunk boundaries are reassembled before parsing.

use serde::Deserialize;

/// One blank-line-delimited block of the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseBlock {
    /// Value of the `event:` line, if any.
    pub event: Option<String>,
    /// Value of the `data:` lines, joined with `\n`.
    pub data: Option<String>,
}

impl SseBlock {
    /// Only `message` events carry chat deltas.
    pub fn is_message(&self) -> bool {
        self.event.as_deref() == Some("message")
    }
}

/// Incremental decoder from raw bytes to [`SseBlock`]s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Decoded text not yet closed by a blank line.
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every block it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseBlock> {
        self.decode(chunk);
        if self.text.contains('\r') {
            self.text = self.text.replace("\r\n", "\n");
        }

        let mut blocks = Vec::new();
        while let Some(end) = self.text.find("\n\n") {
            let raw: String = self.text.drain(..end + 2).collect();
            if let Some(block) = parse_block(&raw[..end]) {
                blocks.push(block);
            }
        }
        blocks
    }

    /// Flush whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<SseBlock> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.text.push_str(&tail);
            self.pending.clear();
        }
        let rest = std::mem::take(&mut self.text).replace("\r\n", "\n");
        parse_block(&rest)
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(s) => {
                    self.text.push_str(s);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    self.text
                        .push_str(std::str::from_utf8(&self.pending[start..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }
}

fn parse_block(text: &str) -> Option<SseBlock> {
    let text = text.trim_matches('\n');
    if text.trim().is_empty() {
        return None;
    }

    let mut block = SseBlock::default();
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            block.event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.trim();
            match block.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => block.data = Some(value.to_string()),
            }
        }
    }

    if block.event.is_none() && block.data.is_none() {
        return None;
    }
    Some(block)
}

/// What a block means for the message being streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSignal {
    /// Text to append.
    Delta(String),
    /// The message is complete.
    Stop,
    /// Nothing to do (other event type, empty delta, no choices).
    Ignore,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Interpret a block's JSON payload.
///
/// Errors only when a `message` block carries data that is not valid JSON of
/// the chunk shape.
pub fn interpret(block: &SseBlock) -> Result<ChatSignal, serde_json::Error> {
    let data = match (&block.data, block.is_message()) {
        (Some(data), true) if !data.is_empty() => data,
        _ => return Ok(ChatSignal::Ignore),
    };

    let chunk: ChatChunk = serde_json::from_str(data)?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(ChatSignal::Ignore);
    };

    if choice.finish_reason.as_deref() == Some("stop") {
        return Ok(ChatSignal::Stop);
    }

    match choice.delta.and_then(|d| d.content) {
        Some(content) if !content.is_empty() => Ok(ChatSignal::Delta(content)),
        _ => Ok(ChatSignal::Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(data: &str) -> String {
        format!("event: message\ndata: {data}\n\n")
    }

    #[test]
    fn test_blocks_split_across_chunks() {
        let wire = message(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#);
        let (a, b) = wire.split_at(17);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(a.as_bytes()).is_empty());
        let blocks = decoder.push(b.as_bytes());

        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_message());
        assert_eq!(
            interpret(&blocks[0]).unwrap(),
            ChatSignal::Delta("Hel".to_string())
        );
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let wire = message(r#"{"choices":[{"delta":{"content":"你好"}}]}"#);
        let bytes = wire.as_bytes();
        let cut = wire.find('你').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        let blocks = decoder.push(&bytes[cut..]);
        assert_eq!(
            interpret(&blocks[0]).unwrap(),
            ChatSignal::Delta("你好".to_string())
        );
    }

    #[test]
    fn test_several_blocks_in_one_chunk_and_crlf() {
        let wire = "event: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\r\n\r\n\
                    event: message\r\ndata: {\"choices\":[{\"finish_reason\":\"stop\"}]}\r\n\r\n";
        let mut decoder = SseDecoder::new();
        let blocks = decoder.push(wire.as_bytes());
        assert_eq!(blocks.len(), 2);
        assert_eq!(interpret(&blocks[1]).unwrap(), ChatSignal::Stop);
    }

    #[test]
    fn test_other_events_and_comments_ignored() {
        let wire = ": keep-alive\n\nevent: ping\ndata: {}\n\ndata: {\"choices\":[]}\n\n";
        let mut decoder = SseDecoder::new();
        let blocks = decoder.push(wire.as_bytes());
        assert_eq!(blocks.len(), 2);
        for block in &blocks {
            assert_eq!(interpret(block).unwrap(), ChatSignal::Ignore);
        }
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut decoder = SseDecoder::new();
        let blocks = decoder.push(message("{not json").as_bytes());
        assert!(interpret(&blocks[0]).is_err());
    }

    #[test]
    fn test_non_stop_finish_reason_with_delta() {
        let block = SseBlock {
            event: Some("message".into()),
            data: Some(r#"{"choices":[{"delta":{"content":"x"},"finish_reason":null}]}"#.into()),
        };
        assert_eq!(interpret(&block).unwrap(), ChatSignal::Delta("x".into()));

        let empty = SseBlock {
            event: Some("message".into()),
            data: Some(r#"{"choices":[{"delta":{"content":""},"finish_reason":"length"}]}"#.into()),
        };
        assert_eq!(interpret(&empty).unwrap(), ChatSignal::Ignore);
    }

    #[test]
    fn test_multiple_data_lines_joined() {
        let mut decoder = SseDecoder::new();
        let blocks = decoder.push(b"event: message\ndata: {\"choices\":\ndata: []}\n\n");
        assert_eq!(blocks[0].data.as_deref(), Some("{\"choices\":\n[]}"));
        assert_eq!(interpret(&blocks[0]).unwrap(), ChatSignal::Ignore);
    }

    #[test]
    fn test_finish_flushes_unterminated_block() {
        let mut decoder = SseDecoder::new();
        let wire = "event: message\ndata: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n";
        assert!(decoder.push(wire.as_bytes()).is_empty());
        let block = decoder.finish().unwrap();
        assert_eq!(interpret(&block).unwrap(), ChatSignal::Delta("tail".into()));
        assert!(decoder.finish().is_none());
    }
}
