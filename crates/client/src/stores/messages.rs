//! Chat store: conversation sidebar, the open chat window and typing state.

use dioxus::prelude::*;
use forumsync_shared::UserId;

use crate::sync::{ChatMessage, Thread};

/// Conversation sidebar, most recent first.
pub static THREADS: GlobalSignal<Vec<Thread>> = Signal::global(Vec::new);

/// Messages of the open chat window, oldest first.
pub static CHAT: GlobalSignal<Vec<ChatMessage>> = Signal::global(Vec::new);

/// Partner whose typing indicator is showing.
pub static TYPING: GlobalSignal<Option<UserId>> = Signal::global(|| None);

pub static UNREAD_MESSAGES: GlobalSignal<u64> = Signal::global(|| 0);

/// Put `thread` first, replacing any older row for the same partner.
pub fn move_thread_to_top(thread: Thread) {
    let mut threads = THREADS.write();
    threads.retain(|t| t.partner_id != thread.partner_id);
    threads.insert(0, thread);
}

pub fn push_chat_message(message: ChatMessage) {
    CHAT.write().push(message);
}

/// Older messages go above what is already shown.
pub fn prepend_history(messages: &[ChatMessage]) {
    CHAT.write().splice(0..0, messages.iter().cloned());
}

pub fn set_typing(partner_id: UserId, typing: bool) {
    let mut current = TYPING.write();
    if typing {
        *current = Some(partner_id);
    } else if *current == Some(partner_id) {
        *current = None;
    }
}

pub fn clear_chat_state() {
    THREADS.write().clear();
    CHAT.write().clear();
    *TYPING.write() = None;
    *UNREAD_MESSAGES.write() = 0;
}
