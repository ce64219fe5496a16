use serde::{Deserialize, Serialize};

use crate::bot::task::{InboundEvent, Payload};

/// Envelope every Bot API method answers with.
#[derive(Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
    pub file_size: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct File {
    pub file_id: String,
    pub file_path: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

impl From<Update> for InboundEvent {
    fn from(update: Update) -> Self {
        let chat_id = update.message.as_ref().map(|message| message.chat.id);
        // Telegram sends several resolutions of the same photo; classify the largest.
        let payload = update
            .message
            .and_then(|message| message.photo)
            .and_then(|sizes| {
                sizes
                    .into_iter()
                    .max_by_key(|size| size.width.saturating_mul(size.height))
            })
            .map(|size| Payload::Remote(size.file_id));

        InboundEvent {
            update_id: update.update_id,
            chat_id,
            payload,
        }
    }
}
