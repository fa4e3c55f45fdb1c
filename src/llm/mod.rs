pub mod client;
pub mod prompt;
pub mod sse;
