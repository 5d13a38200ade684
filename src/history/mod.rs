//! Conversation history: sliding window plus summarization of older turns

pub mod summarizer;
pub mod window;

pub use summarizer::{extractive_summary, ChatSummarizer, Summarizer, SummarizerError};
pub use window::{ChatMessage, ConversationWindow, HistoryManager, Role};
