pub mod app;
pub mod event;
pub mod filter;
pub mod layout;

use std::collections::HashMap;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::{AppContext, Result, TankobonError};
use crate::converter::{Converter, ConverterOptions};
use crate::domain::Chapter;
use crate::downloader::{BatchId, DownloadCanceller, DownloadEvent};
use crate::provider::Provider;
use crate::store::HistoryStore;

use self::app::{AppSettings, Command, Msg, TuiApp};
use self::event::{AppEvent, EventHandler};

type Tui = Terminal<CrosstermBackend<Stdout>>;

pub async fn run(ctx: Arc<AppContext>, open_history: bool) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, ctx, open_history).await;
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(terminal: &mut Tui, ctx: Arc<AppContext>, open_history: bool) -> Result<()> {
    let settings = AppSettings {
        providers: ctx.providers.list(),
        format: ctx.config.formats.format.clone(),
        converter_options: ConverterOptions::from_config(&ctx.config.formats),
        naming: ctx.naming(),
        reader: ctx.config.reader.clone(),
        save_on_read: ctx.config.history.save_on_read,
        default_source: ctx.config.downloader.default_source().map(String::from),
        open_history,
    };
    let (mut tui_app, commands) = TuiApp::new(settings);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runtime = Runtime {
        ctx: ctx.clone(),
        tx,
        downloads: HashMap::new(),
    };
    runtime.execute_all(&mut tui_app, commands);

    let event_handler = EventHandler::new(Duration::from_millis(100));

    loop {
        terminal.draw(|frame| layout::render(frame, &tui_app, &ctx.config.colors))?;

        if let AppEvent::Key(key) = event_handler.next()? {
            let msg = tui_app.key_msg(&key, &ctx.config.keybindings);
            let commands = tui_app.update(msg);
            runtime.execute_all(&mut tui_app, commands);
        }

        // Answers from background tasks
        while let Ok(msg) = rx.try_recv() {
            runtime.observe(&msg);
            let commands = tui_app.update(msg);
            runtime.execute_all(&mut tui_app, commands);
        }

        if tui_app.should_quit {
            break;
        }
    }

    // Running downloads are dropped with the runtime.
    Ok(())
}

/// Executes commands and feeds their outcome back as messages.
struct Runtime {
    ctx: Arc<AppContext>,
    tx: mpsc::UnboundedSender<Msg>,
    downloads: HashMap<BatchId, DownloadCanceller>,
}

impl Runtime {
    fn execute_all(&mut self, app: &mut TuiApp, commands: Vec<Command>) {
        for command in commands {
            self.execute(app, command);
        }
    }

    fn execute(&mut self, app: &mut TuiApp, command: Command) {
        match command {
            Command::Search {
                request,
                provider,
                query,
            } => {
                let Some(provider) = self.provider(&provider) else {
                    return;
                };
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    info!("Searching {} for {:?}", provider.id(), query);
                    let result = provider.search(&query).await;
                    let _ = tx.send(Msg::SearchResults { request, result });
                });
            }
            Command::LoadChapters { request, manga } => {
                let Some(provider) = self.provider(&manga.provider) else {
                    return;
                };
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = provider.chapters(&manga).await;
                    let _ = tx.send(Msg::ChaptersLoaded {
                        request,
                        manga,
                        result,
                    });
                });
            }
            Command::LoadHistory => {
                let _ = self.tx.send(Msg::HistoryLoaded(self.ctx.history.list()));
            }
            Command::RemoveHistory(id) => {
                if let Err(e) = self.ctx.history.remove(&id) {
                    app.set_status(format!("Failed to remove history entry: {}", e));
                }
            }
            Command::StartDownload {
                provider,
                batch,
                converter,
            } => {
                let orchestrator = match self.ctx.orchestrator(&provider, converter) {
                    Ok(orchestrator) => orchestrator,
                    Err(e) => {
                        let _ = self.tx.send(Msg::Fatal(e));
                        return;
                    }
                };
                let mut handle = orchestrator.start(batch);
                self.downloads.insert(handle.batch, handle.canceller());

                let tx = self.tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = handle.next_event().await {
                        if tx.send(Msg::Download(event)).is_err() {
                            break;
                        }
                    }
                });
            }
            Command::CancelDownload(batch) => {
                if let Some(canceller) = self.downloads.remove(&batch) {
                    info!("Cancelling batch {:?}", batch);
                    canceller.cancel();
                }
            }
            Command::Read {
                request,
                chapter,
                converter,
            } => {
                let Some(provider) = self.provider(&chapter.provider) else {
                    return;
                };
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = prepare_for_reading(provider, converter, &chapter).await;
                    let _ = tx.send(Msg::ReadReady {
                        request,
                        chapter,
                        result,
                    });
                });
            }
            Command::OpenUrl(url) => {
                if let Err(e) = open::that(&url) {
                    app.set_status(format!("Failed to open browser: {}", e));
                }
            }
            Command::OpenPath { path, reader } => {
                let opened = match reader {
                    Some(reader) => {
                        info!("Opening {} with {}", path.display(), reader);
                        open::with(&path, reader)
                    }
                    None => open::that(&path),
                };
                if let Err(e) = opened {
                    app.set_status(format!("Failed to open {}: {}", path.display(), e));
                }
            }
            Command::SaveHistory(chapter) => self.record(&chapter),
        }
    }

    /// Provider for a command, or a fatal message when it is gone.
    fn provider(&self, id: &str) -> Option<Arc<dyn Provider>> {
        match self.ctx.providers.get(id) {
            Ok(provider) => Some(provider),
            Err(e) => {
                let _ = self.tx.send(Msg::Fatal(e));
                None
            }
        }
    }

    /// Side effects of background answers that do not depend on the current screen.
    fn observe(&mut self, msg: &Msg) {
        if let Msg::Download(DownloadEvent::Finished { batch }) = msg {
            self.downloads.remove(&batch.id);
            if self.ctx.config.history.save_on_download {
                if let Some(job) = batch.succeeded_jobs().last() {
                    self.record(&job.chapter);
                }
            }
        }
    }

    fn record(&self, chapter: &Chapter) {
        if let Err(e) = self.ctx.record_history(chapter, None) {
            warn!("Failed to save history: {}", e);
        }
    }
}

/// Fetches one chapter and converts it into the staging directory.
async fn prepare_for_reading(
    provider: Arc<dyn Provider>,
    converter: Arc<dyn Converter>,
    chapter: &Chapter,
) -> Result<PathBuf> {
    let content = provider.content(chapter).await?;
    tokio::task::spawn_blocking(move || converter.save_temp(&content))
        .await
        .map_err(|e| TankobonError::ConvertFailed(e.to_string()))?
}
