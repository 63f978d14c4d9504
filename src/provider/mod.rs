pub mod llm;
pub mod openai_chat;
pub mod parser;
pub mod scripted;
