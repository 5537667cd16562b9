use serde_json::Value;

use crate::bot::{ChatEvent, WorkspaceMember};

/// Ids the bot posts under, used to drop its own messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnIdentity {
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
}

impl OwnIdentity {
    pub fn is_own(&self, sender_user_id: Option<&str>, sender_bot_id: Option<&str>) -> bool {
        sender_user_id.is_some_and(|id| self.user_id.as_deref() == Some(id))
            || sender_bot_id.is_some_and(|id| self.bot_id.as_deref() == Some(id))
    }
}

/// What a single Socket Mode frame means for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Event(ChatEvent),
    Ignored,
}

pub fn envelope_id(payload: &Value) -> Option<&str> {
    payload.get("envelope_id").and_then(Value::as_str)
}

pub fn parse_socket_payload(payload: &Value, identity: &OwnIdentity) -> SocketFrame {
    match payload.get("type").and_then(Value::as_str) {
        Some("hello") => return SocketFrame::Hello,
        Some("disconnect") => {
            return SocketFrame::Disconnect {
                reason: payload
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            };
        }
        Some("events_api") => {}
        _ => return SocketFrame::Ignored,
    }

    let Some(event) = payload.pointer("/payload/event") else {
        return SocketFrame::Ignored;
    };
    parse_event(event, identity)
        .map(SocketFrame::Event)
        .unwrap_or(SocketFrame::Ignored)
}

fn parse_event(event: &Value, identity: &OwnIdentity) -> Option<ChatEvent> {
    match event.get("type").and_then(Value::as_str)? {
        "message" => parse_message_event(event, identity),
        "user_change" | "team_join" => Some(ChatEvent::MemberListChanged),
        _ => None,
    }
}

fn parse_message_event(event: &Value, identity: &OwnIdentity) -> Option<ChatEvent> {
    let channel = event.get("channel").and_then(Value::as_str)?.to_string();

    match event.get("subtype").and_then(Value::as_str) {
        None => {
            if is_from_bot(event, identity) {
                return None;
            }
            Some(ChatEvent::MessagePosted {
                channel,
                user: event.get("user").and_then(Value::as_str)?.to_string(),
                text: message_text(event),
                message_ref: event.get("ts").and_then(Value::as_str)?.to_string(),
            })
        }
        Some("message_changed") => {
            let message = event.get("message")?;
            if is_from_bot(message, identity) {
                return None;
            }
            Some(ChatEvent::MessageEdited {
                channel,
                original_ref: message.get("ts").and_then(Value::as_str)?.to_string(),
                new_text: message_text(message),
            })
        }
        Some(_) => None,
    }
}

fn is_from_bot(message: &Value, identity: &OwnIdentity) -> bool {
    let user = message.get("user").and_then(Value::as_str);
    let bot_id = message.get("bot_id").and_then(Value::as_str);
    bot_id.is_some() || identity.is_own(user, bot_id)
}

fn message_text(message: &Value) -> String {
    decode_entities(
        message
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    )
}

/// Slack escapes these three characters in message text.
fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// One entry of a `users.list` response.
pub fn parse_member(user: &Value) -> Option<WorkspaceMember> {
    let flag = |key: &str| user.get(key).and_then(Value::as_bool).unwrap_or(false);
    Some(WorkspaceMember {
        id: user.get("id").and_then(Value::as_str)?.to_string(),
        name: user.get("name").and_then(Value::as_str)?.to_string(),
        is_bot: flag("is_bot"),
        deleted: flag("deleted"),
        is_admin: flag("is_admin"),
        is_owner: flag("is_owner"),
        is_primary_owner: flag("is_primary_owner"),
    })
}
