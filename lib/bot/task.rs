/// One update as returned by the event transport.
///
/// Transport-neutral: the Telegram client maps its wire format into this shape, and
/// tests build it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Source-assigned sequence number, used for cursor advancement.
    pub update_id: i64,
    /// Chat the reply goes to. `None` for updates that aren't messages.
    pub chat_id: Option<i64>,
    pub payload: Option<Payload>,
}

/// Where the bytes to classify come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes shipped with the event itself.
    Embedded(Vec<u8>),
    /// A reference the payload fetcher can resolve (a Bot API `file_id`).
    Remote(String),
}

/// Immutable unit of work handed from the fetch loop to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTask {
    pub update_id: i64,
    pub reply_to: Option<i64>,
    pub payload: Option<Payload>,
}

impl UpdateTask {
    /// Returns the reply target and payload when the task has something to classify.
    pub fn actionable(&self) -> Option<(i64, &Payload)> {
        match (self.reply_to, self.payload.as_ref()) {
            (Some(chat_id), Some(payload)) => Some((chat_id, payload)),
            _ => None,
        }
    }
}

impl From<InboundEvent> for UpdateTask {
    fn from(event: InboundEvent) -> Self {
        Self {
            update_id: event.update_id,
            reply_to: event.chat_id,
            payload: event.payload,
        }
    }
}
