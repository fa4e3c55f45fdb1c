//! llm/sse.rs
//!
//! Server-sent-events reader yielding text fragments as they arrive.
//!
//! Events are separated by a blank line; each `data: ` payload is a JSON
//! object from which `extract` pulls the text, if any. Payloads without text
//! (finish markers, usage records) are skipped.

use std::collections::VecDeque;
use std::io::Read;

use serde_json::Value;

use crate::llm::client::LlmError;

pub type Extractor = fn(&Value) -> Option<String>;

pub struct SseFragments<R> {
    reader: R,
    pending: Vec<u8>,
    ready: VecDeque<Result<String, LlmError>>,
    extract: Extractor,
    done: bool,
}

impl<R: Read> SseFragments<R> {
    pub fn new(reader: R, extract: Extractor) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            ready: VecDeque::new(),
            extract,
            done: false,
        }
    }

    fn fill(&mut self) {
        let mut buf = [0u8; 8192];
        match self.reader.read(&mut buf) {
            Ok(0) => {
                self.done = true;
                // trailing event without the final blank line
                let rest = std::mem::take(&mut self.pending);
                self.push_event(&rest);
            }
            Ok(n) => {
                self.pending
                    .extend(buf[..n].iter().copied().filter(|b| *b != b'\r'));
                while let Some(idx) = find_blank_line(&self.pending) {
                    let event: Vec<u8> = self.pending.drain(..idx + 2).collect();
                    self.push_event(&event[..idx]);
                    if self.done {
                        break;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                self.done = true;
                self.ready.push_back(Err(LlmError::Stream(e.to_string())));
            }
        }
    }

    fn push_event(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let data: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .map(|l| l.strip_prefix(' ').unwrap_or(l))
            .collect();

        if data.is_empty() {
            return;
        }

        let data = data.join("\n");
        if data.trim() == "[DONE]" {
            self.done = true;
            self.pending.clear();
            return;
        }

        let event: Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                self.ready.push_back(Err(LlmError::Decode(e)));
                return;
            }
        };

        if let Some(msg) = event.pointer("/error/message").and_then(Value::as_str) {
            self.done = true;
            self.ready.push_back(Err(LlmError::Stream(msg.to_string())));
            return;
        }

        if let Some(fragment) = (self.extract)(&event) {
            self.ready.push_back(Ok(fragment));
        }
    }
}

impl<R: Read> Iterator for SseFragments<R> {
    type Item = Result<String, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            self.fill();
        }
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
