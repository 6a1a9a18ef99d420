mod commands;
mod render;

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use commands::Command;
use config::{AppConfig, ConfigStore};
use core_types::{NotificationId, NotificationKind, RagTransport, TransportError, UploadFile};
use i18n::I18n;
use render::{
    StreamPrinter, mime_for_path, render_history, render_notification, render_progress,
};
use session::{ChatSession, NotificationCenter, UploadSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use transport_http::HttpTransport;

struct App {
    i18n: I18n,
    transport: Arc<dyn RagTransport>,
    notifications: Arc<NotificationCenter>,
    chat: ChatSession,
    upload: UploadSession,
}

impl App {
    fn new(config: &AppConfig, transport: Arc<dyn RagTransport>) -> Self {
        let i18n = I18n::new(config.language);
        let notifications = Arc::new(NotificationCenter::new(config.notifications.ttl()));
        let chat = ChatSession::new(transport.clone(), i18n.clone());
        let upload = UploadSession::new(
            transport.clone(),
            notifications.clone(),
            i18n.clone(),
            config.upload.clone(),
        );
        Self {
            i18n,
            transport,
            notifications,
            chat,
            upload,
        }
    }

    async fn run(&self) -> Result<()> {
        println!("{}", self.i18n.t("app.title"));
        println!("{}", self.i18n.t("app.subtitle"));
        println!();
        println!("{}", self.i18n.t("chat.welcome"));
        println!("{}", self.i18n.t("cli.help"));

        if let Err(err) = self.transport.health().await {
            warn!(error = %err, "backend health check failed");
            self.notifications.add(
                format!("{}: {err}", self.i18n.t("cli.backend_down")),
                NotificationKind::Error,
            );
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt()?;
            let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
                break;
            };
            match Command::parse(&line) {
                Command::Empty => {}
                Command::Ask(question) => self.ask(&question).await?,
                Command::Upload(path) => self.upload_path(&path).await?,
                Command::Stats => self.print_json(self.transport.stats().await),
                Command::Health => self.print_json(self.transport.health().await),
                Command::History => {
                    println!("{}", render_history(&self.chat.snapshot().messages, &self.i18n));
                }
                Command::Clear => {
                    self.chat.clear_messages();
                    self.notifications.add_info(self.i18n.t("chat.cleared"));
                }
                Command::Dismiss { all: true } => self.notifications.clear(),
                Command::Dismiss { all: false } => {
                    if let Some(id) = self.notifications.dismiss_latest() {
                        debug!(notification_id = %id, "notification dismissed");
                    }
                }
                Command::Help => println!("{}", self.i18n.t("cli.help")),
                Command::Quit => break,
                Command::Unknown(raw) => {
                    println!("? {raw}");
                    println!("{}", self.i18n.t("cli.help"));
                }
            }
        }
        Ok(())
    }

    async fn ask(&self, question: &str) -> Result<()> {
        let mut updates = self.chat.subscribe();
        let mut printer = StreamPrinter::default();
        let mut stdout = io::stdout();

        let send = self.chat.send_message(question);
        tokio::pin!(send);
        let outcome = loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                Ok(()) = updates.changed() => {
                    let state = updates.borrow_and_update().clone();
                    write!(stdout, "{}", printer.update(&state, &self.i18n))?;
                    stdout.flush()?;
                }
            }
        };

        let state = self.chat.snapshot();
        write!(stdout, "{}", printer.finish(&state, &self.i18n))?;
        stdout.flush()?;
        info!(?outcome, messages = state.messages.len(), "question handled");
        Ok(())
    }

    async fn upload_path(&self, path: &Path) -> Result<()> {
        let path = expand_home(path);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read upload candidate");
                self.notifications.add(
                    format!("{}: {}", self.i18n.t("upload.read_failed"), path.display()),
                    NotificationKind::Error,
                );
                return Ok(());
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let file = UploadFile::new(file_name, mime_for_path(&path), bytes);

        let mut updates = self.upload.subscribe();
        let mut stdout = io::stdout();
        let upload = self.upload.upload_and_notify(file);
        tokio::pin!(upload);
        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                Ok(()) = updates.changed() => {
                    let state = *updates.borrow_and_update();
                    write!(stdout, "\r{}", render_progress(state))?;
                    stdout.flush()?;
                }
            }
        };
        if result.is_ok() {
            writeln!(stdout, "\r{}", render_progress(self.upload.snapshot()))?;
        } else {
            writeln!(stdout)?;
        }
        Ok(())
    }

    fn print_json(&self, result: Result<serde_json::Value, TransportError>) {
        match result {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(err) => error!(error = %err, "failed to format backend json"),
            },
            Err(err) => {
                self.notifications
                    .add(err.to_string(), NotificationKind::Error);
            }
        }
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Prints each notification once as it appears.
fn spawn_notification_printer(notifications: &NotificationCenter) -> JoinHandle<()> {
    let mut updates = notifications.subscribe();
    tokio::spawn(async move {
        let mut seen = HashSet::<NotificationId>::new();
        while updates.changed().await.is_ok() {
            let current = updates.borrow_and_update().clone();
            for notification in &current {
                if seen.insert(notification.id) {
                    println!("\n{}", render_notification(notification));
                }
            }
            seen.retain(|id| current.iter().any(|notification| notification.id == *id));
        }
    })
}

fn main() {
    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.push("docchat");
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let mut config = match ConfigStore::from_default_location().and_then(|store| store.load_or_init())
    {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err:#}");
            AppConfig::default()
        }
    };
    config.apply_env_overrides();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to create tokio runtime: {err}");
            return;
        }
    };

    let result = runtime.block_on(async {
        let transport = Arc::new(HttpTransport::from_config(&config.backend)?);
        info!(base_url = %transport.base_url(), "docchat starting");
        let app = App::new(&config, transport);
        let printer = spawn_notification_printer(&app.notifications);
        let result = app.run().await;
        printer.abort();
        result
    });
    if let Err(err) = result {
        error!("docchat exited with error: {err:#}");
        eprintln!("{err:#}");
    }
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "docchat.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,app_cli=debug,session=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
