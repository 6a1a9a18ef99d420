use std::path::Path;

use core_types::{Message, MessageId, Notification, NotificationKind};
use i18n::I18n;
use session::{ChatState, UploadState};

const PROGRESS_WIDTH: usize = 20;
const ASSISTANT_PREFIX: &str = "assistant> ";
/// Carriage return plus ANSI erase-line, so a status line can be replaced.
const CLEAR_LINE: &str = "\r\x1b[2K";

pub fn render_message(message: &Message, i18n: &I18n) -> String {
    let speaker = if message.is_user { "you" } else { "assistant" };
    let mut out = format!("{speaker}> {}", message.text);
    if let Some(sources) = render_sources(message, i18n) {
        out.push('\n');
        out.push_str(&sources);
    }
    out
}

/// The whole conversation, one message after another.
pub fn render_history(messages: &[Message], i18n: &I18n) -> String {
    if messages.is_empty() {
        return i18n.t("cli.history_empty").to_string();
    }
    messages
        .iter()
        .map(|message| render_message(message, i18n))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_sources(message: &Message, i18n: &I18n) -> Option<String> {
    let sources = message.sources.as_ref().filter(|sources| !sources.is_empty())?;
    Some(format!("  {}: {}", i18n.t("chat.sources"), sources.join(", ")))
}

pub fn render_notification(notification: &Notification) -> String {
    let tag = match notification.kind {
        NotificationKind::Success => "ok",
        NotificationKind::Error => "error",
        NotificationKind::Info => "info",
    };
    format!("[{tag}] {}", notification.message)
}

pub fn render_progress(state: UploadState) -> String {
    let progress = usize::from(state.progress.min(100));
    let filled = progress * PROGRESS_WIDTH / 100;
    format!(
        "[{}{}] {progress:>3}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_WIDTH - filled)
    )
}

/// Best-effort MIME type from the file extension, mirroring what a browser
/// reports for a dropped file.
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Turns successive chat snapshots into the text to append to the terminal,
/// so a streamed answer is printed once, as it grows. While the answer is
/// still empty a "thinking" line stands in for it and is erased by the
/// first token.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    current: Option<MessageId>,
    printed: usize,
    thinking: bool,
}

impl StreamPrinter {
    pub fn update(&mut self, state: &ChatState, i18n: &I18n) -> String {
        let Some(last) = state.messages.last().filter(|message| !message.is_user) else {
            return String::new();
        };

        let mut out = String::new();
        if self.current != Some(last.id) {
            if self.thinking {
                out.push_str(CLEAR_LINE);
                self.thinking = false;
            } else if self.current.is_some() {
                out.push('\n');
            }
            self.current = Some(last.id);
            self.printed = 0;
            out.push_str(ASSISTANT_PREFIX);
        }

        if last.text.is_empty() {
            if state.is_loading() && !self.thinking {
                out.push_str(i18n.t("chat.thinking"));
                self.thinking = true;
            }
            return out;
        }
        if self.thinking {
            out.push_str(CLEAR_LINE);
            out.push_str(ASSISTANT_PREFIX);
            self.thinking = false;
        }
        if let Some(delta) = last.text.get(self.printed..) {
            out.push_str(delta);
            self.printed = last.text.len();
        }
        out
    }

    /// Prints whatever is left, then the sources of the final answer.
    pub fn finish(&mut self, state: &ChatState, i18n: &I18n) -> String {
        let mut out = self.update(state, i18n);
        if self.thinking {
            out.push_str(CLEAR_LINE);
            out.push_str(ASSISTANT_PREFIX);
            self.thinking = false;
        }
        if self.current.is_some() {
            out.push('\n');
        }
        let answer = state
            .messages
            .iter()
            .rev()
            .take_while(|message| !message.is_user)
            .find(|message| message.sources.is_some());
        if let Some(sources) = answer.and_then(|message| render_sources(message, i18n)) {
            out.push_str(&sources);
            out.push('\n');
        }
        self.current = None;
        self.printed = 0;
        out
    }
}
