pub mod config;
pub mod docx;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod template;
