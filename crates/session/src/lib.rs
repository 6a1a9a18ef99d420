mod chat;
mod decoder;
mod notifications;
mod upload;

#[cfg(test)]
mod testing;

pub use chat::{ChatPhase, ChatSession, ChatState, SendOutcome};
pub use decoder::{LineDecoder, parse_frame};
pub use notifications::NotificationCenter;
pub use upload::{UploadSession, UploadState};
