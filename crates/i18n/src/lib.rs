use std::collections::BTreeMap;

use core_types::UiLanguage;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    zh_cn: BTreeMap<&'static str, &'static str>,
    en_us: BTreeMap<&'static str, &'static str>,
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            zh_cn: zh_cn_map(),
            en_us: en_us_map(),
        }
    }

    pub fn set_language(&mut self, lang: UiLanguage) {
        self.lang = lang;
    }

    pub fn language(&self) -> UiLanguage {
        self.lang
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        match self.lang {
            UiLanguage::ZhCn => self
                .zh_cn
                .get(key)
                .copied()
                .or_else(|| self.en_us.get(key).copied())
                .unwrap_or(key),
            UiLanguage::EnUs => self
                .en_us
                .get(key)
                .copied()
                .or_else(|| self.zh_cn.get(key).copied())
                .unwrap_or(key),
        }
    }
}

fn zh_cn_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "RAG 文档问答"),
        ("app.subtitle", "上传文档，然后就文档内容提问"),
        ("chat.welcome", "欢迎使用 RAG 问答，可以就已上传的文档提出任何问题！"),
        ("chat.thinking", "思考中..."),
        ("chat.sources", "来源"),
        ("chat.error", "抱歉，处理请求时出错，请重试。"),
        ("chat.cleared", "会话已清空"),
        ("upload.invalid_type", "请上传 PDF、TXT、DOC/DOCX 或 CSV 文件。"),
        ("upload.too_large", "文件大小必须小于 10MB。"),
        ("upload.failed", "文件上传失败，请重试。"),
        ("upload.busy", "已有文件正在上传。"),
        ("upload.read_failed", "无法读取文件"),
        ("cli.help", "命令：/upload <路径>、/stats、/health、/history、/clear、/dismiss [all]、/help、/quit"),
        ("cli.history_empty", "暂无消息"),
        ("cli.backend_down", "后端不可用"),
    ])
}

fn en_us_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "RAG Chatbot"),
        (
            "app.subtitle",
            "Upload your documents and engage in intelligent conversations with AI",
        ),
        (
            "chat.welcome",
            "Welcome to RAG Chatbot. Ask me anything about your documents!",
        ),
        ("chat.thinking", "Thinking..."),
        ("chat.sources", "Sources"),
        (
            "chat.error",
            "Sorry, I encountered an error. Please try again.",
        ),
        ("chat.cleared", "Conversation cleared"),
        (
            "upload.invalid_type",
            "Please upload a PDF, TXT, DOC/DOCX, or CSV file.",
        ),
        ("upload.too_large", "File size must be less than 10MB."),
        ("upload.failed", "Failed to upload file. Please try again."),
        ("upload.busy", "Another upload is still in progress."),
        ("upload.read_failed", "Could not read file"),
        (
            "cli.help",
            "Commands: /upload <path>, /stats, /health, /history, /clear, /dismiss [all], /help, /quit",
        ),
        ("cli.history_empty", "No messages yet"),
        ("cli.backend_down", "Backend unavailable"),
    ])
}
