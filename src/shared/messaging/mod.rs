//! Messaging domain types: direct conversations, group conversations and
//! their messages.

pub mod conversation;
pub mod group;
pub mod message;

pub use conversation::{Conversation, ConversationSummary, LastMessage};
pub use group::{Group, GroupMessage, GroupMessageView, GroupSummary, GroupView};
pub use message::{Attachment, DirectMessage, DirectMessageView};
