//! Change detection between two polls of the store.
//!
//! [`diff`] is a pure function of the previous [`Snapshot`] and the records
//! fetched this cycle. It hands back the events to render, the snapshot to
//! carry into the next cycle, and any anomalies it saw along the way.
//!
//! Rules, applied per key in fetch order:
//! - unparsable record: skipped, snapshot untouched, anomaly reported;
//! - unseen key: `NewConversation` if it has messages, otherwise tracked at 0;
//! - grown key: `Appended` with exactly the messages past the old count;
//! - same or smaller count: `NoChange`, and a smaller count is an anomaly;
//! - keys missing from the fetch keep their previous count.

use crate::record::{ConversationRecord, Message, ParseError};
use crate::snapshot::{Observation, Snapshot};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    NewConversation {
        key: String,
        record: ConversationRecord,
    },
    Appended {
        key: String,
        conversation_id: String,
        /// Count previously observed; `messages` starts at this index.
        from: usize,
        messages: Vec<Message>,
    },
    NoChange {
        key: String,
    },
}

impl ChangeEvent {
    pub fn key(&self) -> &str {
        match self {
            ChangeEvent::NewConversation { key, .. }
            | ChangeEvent::Appended { key, .. }
            | ChangeEvent::NoChange { key } => key,
        }
    }

    /// Whether the event produces transcript output.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ChangeEvent::NoChange { .. })
    }

    /// Messages this event introduces, in order.
    pub fn new_messages(&self) -> &[Message] {
        match self {
            ChangeEvent::NewConversation { record, .. } => record.messages.as_slice(),
            ChangeEvent::Appended { messages, .. } => messages.as_slice(),
            ChangeEvent::NoChange { .. } => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anomaly {
    Malformed {
        key: String,
        error: ParseError,
    },
    /// The store reported fewer messages than were already seen.
    Shrunk {
        key: String,
        observed: usize,
        expected: usize,
    },
}

#[derive(Debug, Default)]
pub struct Diff {
    pub events: Vec<ChangeEvent>,
    pub snapshot: Snapshot,
    pub anomalies: Vec<Anomaly>,
}

impl Diff {
    pub fn reportable(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter().filter(|e| e.is_reportable())
    }
}

pub fn diff<I>(previous: Snapshot, current: I) -> Diff
where
    I: IntoIterator<Item = (String, Result<ConversationRecord, ParseError>)>,
{
    let mut next = previous;
    let mut events = Vec::new();
    let mut anomalies = Vec::new();

    for (key, parsed) in current {
        let mut record = match parsed {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(%key, %error, "skipping malformed record");
                anomalies.push(Anomaly::Malformed { key, error });
                continue;
            }
        };

        let count = record.message_count();
        match next.observe(&key, count) {
            Observation::New if count > 0 => {
                events.push(ChangeEvent::NewConversation { key, record });
            }
            Observation::New => {
                tracing::debug!(%key, "tracking empty conversation");
                events.push(ChangeEvent::NoChange { key });
            }
            Observation::Grew { from } => {
                let messages = record.messages.split_off(from);
                events.push(ChangeEvent::Appended {
                    key,
                    conversation_id: record.id,
                    from,
                    messages,
                });
            }
            Observation::Unchanged => events.push(ChangeEvent::NoChange { key }),
            Observation::Shrunk { expected } => {
                tracing::warn!(
                    %key,
                    observed = count,
                    expected,
                    "message count went down; keeping previous high-water mark"
                );
                anomalies.push(Anomaly::Shrunk {
                    key: key.clone(),
                    observed: count,
                    expected,
                });
                events.push(ChangeEvent::NoChange { key });
            }
        }
    }

    Diff {
        events,
        snapshot: next,
        anomalies,
    }
}
