//! crates/chat_core/src/transcript.rs
//!
//! The conversation view's data flow, kept free of any rendering concerns:
//! a transcript accumulates streamed answer fragments into the last visible
//! message, and finished text is segmented into prose and fenced code blocks.

use regex::Regex;

use crate::domain::{ChatRole, ChatTurn};

/// The apology text shown in place of an answer when a turn fails.
pub const REQUEST_APOLOGY: &str = "Sorry, I couldn't process your request.";

/// The in-band apology a server relays when the completion provider fails
/// mid-stream. Provider error detail never reaches the client.
pub const GATEWAY_APOLOGY: &str = "An error occurred while processing your request.";

//=========================================================================================
// Transcript State Machine
//=========================================================================================

/// The lifecycle of one in-flight question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptPhase {
    /// No question in flight.
    Idle,
    /// The question has been submitted; no answer fragment has arrived yet.
    Sending,
    /// Answer fragments are arriving and appending to the last message.
    StreamingAnswer,
}

/// One rendered message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Accumulates a conversation as questions are asked and answers stream in.
///
/// Submitting a new question while an answer is still streaming is allowed;
/// the previous answer is kept as-is and a new exchange begins.
#[derive(Debug, Default)]
pub struct TranscriptBuilder {
    messages: Vec<TranscriptMessage>,
    phase: TranscriptPhase,
}

impl Default for TranscriptPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TranscriptPhase {
        self.phase
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    /// Records the user's question and moves to `Sending`.
    pub fn begin_question(&mut self, question: &str) {
        self.messages.push(TranscriptMessage {
            role: ChatRole::User,
            content: question.to_string(),
        });
        self.phase = TranscriptPhase::Sending;
    }

    /// Appends one arriving answer fragment. The first fragment creates the
    /// assistant placeholder message and moves to `StreamingAnswer`; later
    /// fragments append to it.
    pub fn push_fragment(&mut self, fragment: &str) {
        if self.phase != TranscriptPhase::StreamingAnswer {
            self.messages.push(TranscriptMessage {
                role: ChatRole::Assistant,
                content: String::new(),
            });
            self.phase = TranscriptPhase::StreamingAnswer;
        }
        if let Some(last) = self.messages.last_mut() {
            last.content.push_str(fragment);
        }
    }

    /// Ends the in-flight question successfully.
    pub fn finish_answer(&mut self) {
        self.phase = TranscriptPhase::Idle;
    }

    /// Ends the in-flight question with a failure: the apology text replaces
    /// whatever partial answer had accumulated (or becomes the whole answer).
    pub fn fail_answer(&mut self) {
        match self.phase {
            TranscriptPhase::StreamingAnswer => {
                if let Some(last) = self.messages.last_mut() {
                    last.content = REQUEST_APOLOGY.to_string();
                }
            }
            TranscriptPhase::Sending => {
                self.messages.push(TranscriptMessage {
                    role: ChatRole::Assistant,
                    content: REQUEST_APOLOGY.to_string(),
                });
            }
            TranscriptPhase::Idle => {}
        }
        self.phase = TranscriptPhase::Idle;
    }

    /// The transcript as persistable turns, for flushing to the history store.
    pub fn to_turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn::new(m.role, m.content.clone()))
            .collect()
    }
}

//=========================================================================================
// Fenced Code Block Segmentation
//=========================================================================================

/// A run of transcript text: either prose or one fenced code region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose { text: String },
    Code { language: Option<String>, text: String },
}

/// Splits answer text into prose and fenced code segments, preserving order.
/// A fence is a "```" delimiter with an optional language tag, a body, and a
/// closing "```". Unterminated fences render as prose.
pub fn segment_markdown(text: &str) -> Vec<Segment> {
    let fence = Regex::new(r"```(\w+)?\n([\s\S]*?)```").unwrap();

    let mut segments = Vec::new();
    let mut last_index = 0;

    for caps in fence.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        if whole.start() > last_index {
            segments.push(Segment::Prose {
                text: text[last_index..whole.start()].to_string(),
            });
        }
        segments.push(Segment::Code {
            language: caps.get(1).map(|m| m.as_str().to_string()),
            text: caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string(),
        });
        last_index = whole.end();
    }

    if last_index < text.len() {
        segments.push(Segment::Prose {
            text: text[last_index..].to_string(),
        });
    }

    segments
}
