use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use rand::seq::IndexedRandom;

use crate::app::{Result, TankobonError};
use crate::config::{KeybindingConfig, ReaderConfig};
use crate::converter::{Converter, ConverterOptions, ConverterRegistry, Format};
use crate::domain::{Chapter, HistoryEntry, Manga, SelectionSet};
use crate::downloader::{BatchId, DownloadBatch, DownloadEvent, NamingSettings};
use crate::tui::event::Action;
use crate::tui::filter::ListFilter;

pub const PAGE_SIZE: usize = 10;

const PLOTS: &[&str] = &[
    "The scanlators took a day off.",
    "Somebody spilled ink on the last page.",
    "The volume fell behind the bookshelf.",
    "This arc ends on a cliffhanger.",
    "The protagonist lost the power of friendship.",
    "The next chapter is on hiatus.",
    "A filler episode got in the way.",
];

fn random_plot() -> &'static str {
    PLOTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("Something went wrong.")
}

/// Identifies one search, chapter listing or read request so that late answers are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenKind {
    ScrapersInstall,
    SourceSelect,
    History,
    Search,
    Loading,
    MangaList,
    ChapterList,
    Confirm,
    Downloading,
    Reading,
    DownloadSummary,
    Error,
}

#[derive(Debug, Clone)]
pub enum Screen {
    /// No provider is enabled.
    ScrapersInstall,
    SourceSelect {
        cursor: usize,
        filter: ListFilter,
    },
    History {
        entries: Vec<HistoryEntry>,
        cursor: usize,
        filter: ListFilter,
    },
    Search {
        provider: String,
        input: String,
    },
    Loading {
        request: RequestId,
        message: String,
    },
    MangaList {
        provider: String,
        mangas: Vec<Manga>,
        cursor: usize,
        filter: ListFilter,
    },
    ChapterList {
        manga: Manga,
        cursor: usize,
        selection: SelectionSet,
        filter: ListFilter,
    },
    Confirm {
        manga: Manga,
        selection: SelectionSet,
    },
    Downloading {
        batch: BatchId,
        manga_name: String,
        current: Option<String>,
        succeeded: usize,
        failed: usize,
        total: usize,
    },
    Reading {
        request: RequestId,
        chapter: Chapter,
        format: Format,
    },
    DownloadSummary {
        batch: DownloadBatch,
        cursor: usize,
    },
    Error {
        message: String,
        plot: &'static str,
    },
}

impl Screen {
    pub fn kind(&self) -> ScreenKind {
        match self {
            Screen::ScrapersInstall => ScreenKind::ScrapersInstall,
            Screen::SourceSelect { .. } => ScreenKind::SourceSelect,
            Screen::History { .. } => ScreenKind::History,
            Screen::Search { .. } => ScreenKind::Search,
            Screen::Loading { .. } => ScreenKind::Loading,
            Screen::MangaList { .. } => ScreenKind::MangaList,
            Screen::ChapterList { .. } => ScreenKind::ChapterList,
            Screen::Confirm { .. } => ScreenKind::Confirm,
            Screen::Downloading { .. } => ScreenKind::Downloading,
            Screen::Reading { .. } => ScreenKind::Reading,
            Screen::DownloadSummary { .. } => ScreenKind::DownloadSummary,
            Screen::Error { .. } => ScreenKind::Error,
        }
    }

    /// Screens that only wait for a background answer.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Screen::Loading { .. } | Screen::Reading { .. } | Screen::Downloading { .. }
        )
    }

    fn cursor_mut(&mut self) -> Option<&mut usize> {
        match self {
            Screen::SourceSelect { cursor, .. }
            | Screen::History { cursor, .. }
            | Screen::MangaList { cursor, .. }
            | Screen::ChapterList { cursor, .. }
            | Screen::DownloadSummary { cursor, .. } => Some(cursor),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&ListFilter> {
        match self {
            Screen::SourceSelect { filter, .. }
            | Screen::History { filter, .. }
            | Screen::MangaList { filter, .. }
            | Screen::ChapterList { filter, .. } => Some(filter),
            _ => None,
        }
    }

    fn filter_mut(&mut self) -> Option<&mut ListFilter> {
        match self {
            Screen::SourceSelect { filter, .. }
            | Screen::History { filter, .. }
            | Screen::MangaList { filter, .. }
            | Screen::ChapterList { filter, .. } => Some(filter),
            _ => None,
        }
    }
}

/// Messages consumed by [`TuiApp::update`].
#[derive(Debug)]
pub enum Msg {
    Action(Action),
    Char(char),
    DeleteChar,
    SearchResults {
        request: RequestId,
        result: Result<Vec<Manga>>,
    },
    ChaptersLoaded {
        request: RequestId,
        manga: Manga,
        result: Result<Vec<Chapter>>,
    },
    HistoryLoaded(Result<Vec<HistoryEntry>>),
    ReadReady {
        request: RequestId,
        chapter: Chapter,
        result: Result<PathBuf>,
    },
    Download(DownloadEvent),
    Fatal(TankobonError),
}

/// Side effects requested by a transition, executed by the run loop.
pub enum Command {
    Search {
        request: RequestId,
        provider: String,
        query: String,
    },
    LoadChapters {
        request: RequestId,
        manga: Manga,
    },
    LoadHistory,
    RemoveHistory(String),
    /// Record a chapter as the last one read of its manga.
    SaveHistory(Chapter),
    StartDownload {
        provider: String,
        batch: DownloadBatch,
        converter: Arc<dyn Converter>,
    },
    CancelDownload(BatchId),
    Read {
        request: RequestId,
        chapter: Chapter,
        converter: Arc<dyn Converter>,
    },
    OpenUrl(String),
    /// Opens a file or folder, with `reader` when set or the system default otherwise.
    OpenPath {
        path: PathBuf,
        reader: Option<String>,
    },
}

/// What the app needs to know about its environment at start-up.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// (id, display name) of every enabled provider.
    pub providers: Vec<(String, String)>,
    pub format: String,
    pub converter_options: ConverterOptions,
    pub naming: NamingSettings,
    pub reader: ReaderConfig,
    pub save_on_read: bool,
    pub default_source: Option<String>,
    pub open_history: bool,
}

pub struct TuiApp {
    pub stack: Vec<Screen>,
    pub providers: Vec<(String, String)>,
    pub format: String,
    pub naming: NamingSettings,
    pub should_quit: bool,
    pub show_help: bool,
    pub status_message: Option<String>,
    converter_options: ConverterOptions,
    reader: ReaderConfig,
    save_on_read: bool,
    next_request: u64,
    next_batch: u64,
}

impl TuiApp {
    /// Builds the app and returns the commands its first screen needs.
    pub fn new(settings: AppSettings) -> (Self, Vec<Command>) {
        let mut app = Self {
            stack: Vec::new(),
            providers: settings.providers,
            format: settings.format,
            naming: settings.naming,
            should_quit: false,
            show_help: false,
            status_message: None,
            converter_options: settings.converter_options,
            reader: settings.reader,
            save_on_read: settings.save_on_read,
            next_request: 0,
            next_batch: 0,
        };

        if app.providers.is_empty() {
            app.stack.push(Screen::ScrapersInstall);
            return (app, Vec::new());
        }

        app.stack.push(Screen::SourceSelect {
            cursor: 0,
            filter: ListFilter::default(),
        });
        let mut commands = Vec::new();

        if let Some(source) = settings.default_source {
            if app.providers.iter().any(|(id, _)| *id == source) {
                app.stack.push(Screen::Search {
                    provider: source,
                    input: String::new(),
                });
            } else {
                app.raise_error(TankobonError::ProviderUnavailable(format!(
                    "default source {} is not enabled",
                    source
                )));
                return (app, commands);
            }
        }

        if settings.open_history {
            commands.extend(app.open_history());
        }

        (app, commands)
    }

    pub fn screen(&self) -> Option<&Screen> {
        self.stack.last()
    }

    pub fn kind(&self) -> ScreenKind {
        self.screen()
            .map(Screen::kind)
            .unwrap_or(ScreenKind::SourceSelect)
    }

    pub fn set_status(&mut self, message: String) {
        self.status_message = Some(message);
    }

    /// Whether keys are text for the search box or a list filter.
    pub fn is_typing(&self) -> bool {
        match self.screen() {
            Some(Screen::Search { .. }) => true,
            Some(screen) => screen.filter().is_some_and(|f| f.editing),
            None => false,
        }
    }

    /// Translates a key press for the current screen.
    pub fn key_msg(&self, key: &KeyEvent, bindings: &KeybindingConfig) -> Msg {
        if !self.is_typing() {
            return Msg::Action(bindings.get_action(key, self.kind()));
        }

        if bindings.is_force_quit(key) {
            return Msg::Action(Action::ForceQuit);
        }
        match key.code {
            KeyCode::Esc => Msg::Action(Action::Back),
            KeyCode::Enter => Msg::Action(Action::Confirm),
            KeyCode::Backspace => Msg::DeleteChar,
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => Msg::Char(c),
            _ => Msg::Action(Action::None),
        }
    }

    /// The transition function.
    pub fn update(&mut self, msg: Msg) -> Vec<Command> {
        match msg {
            Msg::Action(action) => {
                if action != Action::None {
                    self.status_message = None;
                }
                self.handle_action(action)
            }
            Msg::Char(c) => {
                self.edit_text(|text| text.push(c));
                Vec::new()
            }
            Msg::DeleteChar => {
                self.edit_text(|text| {
                    text.pop();
                });
                Vec::new()
            }
            Msg::SearchResults { request, result } => {
                if !self.awaiting(request) {
                    return Vec::new();
                }
                self.stack.pop();
                match result {
                    Ok(mangas) if mangas.is_empty() => {
                        self.set_status("No manga found".to_string());
                    }
                    Ok(mangas) => {
                        let provider = mangas[0].provider.clone();
                        self.stack.push(Screen::MangaList {
                            provider,
                            mangas,
                            cursor: 0,
                            filter: ListFilter::default(),
                        });
                    }
                    Err(e) => self.raise_error(e),
                }
                Vec::new()
            }
            Msg::ChaptersLoaded {
                request,
                mut manga,
                result,
            } => {
                if !self.awaiting(request) {
                    return Vec::new();
                }
                self.stack.pop();
                match result {
                    Ok(chapters) if chapters.is_empty() => {
                        self.set_status(format!("{} has no chapters", manga.name));
                    }
                    Ok(chapters) => {
                        manga.chapters = chapters;
                        self.stack.push(Screen::ChapterList {
                            manga,
                            cursor: 0,
                            selection: SelectionSet::new(),
                            filter: ListFilter::default(),
                        });
                    }
                    Err(e) => self.raise_error(e),
                }
                Vec::new()
            }
            Msg::HistoryLoaded(result) => {
                match result {
                    Ok(loaded) => {
                        if let Some(Screen::History {
                            entries, cursor, ..
                        }) = self.stack.last_mut()
                        {
                            *entries = loaded;
                            *cursor = 0;
                        }
                    }
                    Err(e) => self.raise_error(e),
                }
                Vec::new()
            }
            Msg::ReadReady {
                request,
                chapter,
                result,
            } => {
                let format = match self.screen() {
                    Some(Screen::Reading {
                        request: r, format, ..
                    }) if *r == request => *format,
                    _ => return Vec::new(),
                };
                self.stack.pop();
                match result {
                    Ok(path) => {
                        self.set_status(format!("Opened {}", chapter.name));
                        let reader = self.reader.app_for(format).map(String::from);
                        let mut commands = vec![Command::OpenPath { path, reader }];
                        if self.save_on_read {
                            commands.push(Command::SaveHistory(chapter));
                        }
                        commands
                    }
                    Err(e) => {
                        self.raise_error(e);
                        Vec::new()
                    }
                }
            }
            Msg::Download(event) => {
                self.handle_download_event(event);
                Vec::new()
            }
            Msg::Fatal(e) => {
                let commands = self.cancel_active_download();
                self.raise_error(e);
                commands
            }
        }
    }

    /// Applies a text edit to the search box or to the filter being typed.
    fn edit_text(&mut self, edit: impl FnOnce(&mut String)) {
        match self.stack.last_mut() {
            Some(Screen::Search { input, .. }) => edit(input),
            Some(screen) => {
                let edited = match screen.filter_mut() {
                    Some(filter) if filter.editing => {
                        edit(&mut filter.query);
                        true
                    }
                    _ => false,
                };
                if let Some(cursor) = screen.cursor_mut().filter(|_| edited) {
                    *cursor = 0;
                }
            }
            None => {}
        }
    }

    fn handle_action(&mut self, action: Action) -> Vec<Command> {
        if action == Action::ForceQuit {
            self.should_quit = true;
            return Vec::new();
        }
        if self.show_help && matches!(action, Action::Help | Action::Back) {
            self.show_help = false;
            return Vec::new();
        }
        if let Some(commands) = self.filter_action(action) {
            return commands;
        }

        match action {
            Action::Quit => {
                self.should_quit = true;
                return self.cancel_active_download();
            }
            Action::Back => return self.back(),
            Action::Help => {
                self.show_help = true;
                return Vec::new();
            }
            Action::MoveUp => self.move_cursor(|c, _| c.saturating_sub(1)),
            Action::MoveDown => self.move_cursor(|c, len| (c + 1).min(len.saturating_sub(1))),
            Action::PrevPage => self.move_cursor(|c, _| c.saturating_sub(PAGE_SIZE)),
            Action::NextPage => {
                self.move_cursor(|c, len| (c + PAGE_SIZE).min(len.saturating_sub(1)))
            }
            Action::Top => self.move_cursor(|_, _| 0),
            Action::Bottom => self.move_cursor(|_, len| len.saturating_sub(1)),
            _ => {}
        }

        let Some(screen) = self.stack.last() else {
            return Vec::new();
        };

        match (screen.kind(), action) {
            (ScreenKind::SourceSelect, Action::Confirm) => self.select_source(),
            (ScreenKind::SourceSelect, Action::History) => self.open_history(),
            (ScreenKind::History, Action::Confirm) => self.continue_from_history(),
            (ScreenKind::History, Action::Remove) => self.remove_history_entry(),
            (ScreenKind::Search, Action::Confirm) => self.submit_search(),
            (ScreenKind::MangaList, Action::Confirm) => self.open_manga(),
            (ScreenKind::MangaList, Action::OpenUrl) => self.open_manga_url(),
            (ScreenKind::ChapterList, Action::SelectOne) => {
                self.edit_selection(|selection, visible, cursor| {
                    if let Some(chapter) = visible.get(cursor) {
                        selection.toggle(chapter);
                    }
                })
            }
            (ScreenKind::ChapterList, Action::SelectAll) => {
                self.edit_selection(|selection, visible, _| {
                    selection.select_all(visible.iter().copied())
                })
            }
            (ScreenKind::ChapterList, Action::ClearSelection) => {
                self.edit_selection(|selection, _, _| selection.clear())
            }
            (ScreenKind::ChapterList, Action::Confirm) => self.review_selection(),
            (ScreenKind::ChapterList, Action::Read) => self.read_chapter(),
            (ScreenKind::ChapterList, Action::OpenUrl) => self.open_chapter_url(),
            (ScreenKind::Confirm, Action::Confirm) => self.start_download(),
            (ScreenKind::DownloadSummary, Action::RedownloadFailed) => self.redownload_failed(),
            (ScreenKind::DownloadSummary, Action::OpenFolder) => self.open_download_folder(),
            (ScreenKind::DownloadSummary, Action::Confirm)
            | (ScreenKind::Error, Action::Confirm) => self.back(),
            _ => Vec::new(),
        }
    }

    /// Filter keys of list screens. `None` when the action is not for the filter.
    ///
    /// While the query is typed every action ends here. Back discards the query, confirm
    /// keeps it. Back on a filtered list clears the filter before it leaves the screen.
    fn filter_action(&mut self, action: Action) -> Option<Vec<Command>> {
        let screen = self.stack.last_mut()?;
        let filter = screen.filter_mut()?;

        let cleared = match action {
            Action::Back if filter.editing || filter.is_active() => {
                filter.clear();
                true
            }
            Action::Confirm if filter.editing => {
                filter.editing = false;
                false
            }
            Action::Filter => {
                filter.editing = true;
                false
            }
            _ if filter.editing => false,
            _ => return None,
        };

        if let Some(cursor) = screen.cursor_mut().filter(|_| cleared) {
            *cursor = 0;
        }
        Some(Vec::new())
    }

    fn back(&mut self) -> Vec<Command> {
        let Some(screen) = self.stack.last() else {
            self.should_quit = true;
            return Vec::new();
        };

        let commands = match screen {
            Screen::SourceSelect { .. } | Screen::ScrapersInstall => {
                self.should_quit = true;
                return Vec::new();
            }
            Screen::Downloading { batch, .. } => vec![Command::CancelDownload(*batch)],
            _ => Vec::new(),
        };

        self.stack.pop();
        if self.stack.is_empty() {
            self.should_quit = true;
        }
        commands
    }

    fn move_cursor(&mut self, step: impl FnOnce(usize, usize) -> usize) {
        let len = self.list_len();
        if let Some(cursor) = self.stack.last_mut().and_then(Screen::cursor_mut) {
            *cursor = step(*cursor, len);
        }
    }

    /// Number of rows the cursor can move over.
    fn list_len(&self) -> usize {
        match self.screen() {
            Some(Screen::SourceSelect { filter, .. }) => filter.visible(&self.providers).len(),
            Some(Screen::History {
                entries, filter, ..
            }) => filter.visible(entries).len(),
            Some(Screen::MangaList { mangas, filter, .. }) => filter.visible(mangas).len(),
            Some(Screen::ChapterList { manga, filter, .. }) => {
                filter.visible(&manga.chapters).len()
            }
            Some(Screen::DownloadSummary { batch, .. }) => batch.total(),
            _ => 0,
        }
    }

    fn request(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn batch_id(&mut self) -> BatchId {
        self.next_batch += 1;
        BatchId(self.next_batch)
    }

    fn awaiting(&self, request: RequestId) -> bool {
        matches!(self.screen(), Some(Screen::Loading { request: r, .. }) if *r == request)
    }

    fn raise_error(&mut self, error: TankobonError) {
        tracing::error!("{}", error);
        while self.stack.last().is_some_and(Screen::is_transient) {
            self.stack.pop();
        }
        self.stack.push(Screen::Error {
            message: error.to_string(),
            plot: random_plot(),
        });
    }

    fn cancel_active_download(&mut self) -> Vec<Command> {
        match self.screen() {
            Some(Screen::Downloading { batch, .. }) => vec![Command::CancelDownload(*batch)],
            _ => Vec::new(),
        }
    }

    fn converter(&self, format: &str) -> Result<Arc<dyn Converter>> {
        ConverterRegistry::get(format, self.converter_options)
    }

    fn select_source(&mut self) -> Vec<Command> {
        let Some(Screen::SourceSelect { cursor, filter }) = self.screen() else {
            return Vec::new();
        };
        if let Some((_, (id, _))) = filter.nth(&self.providers, *cursor) {
            let provider = id.clone();
            self.stack.push(Screen::Search {
                provider,
                input: String::new(),
            });
        }
        Vec::new()
    }

    fn open_history(&mut self) -> Vec<Command> {
        self.stack.push(Screen::History {
            entries: Vec::new(),
            cursor: 0,
            filter: ListFilter::default(),
        });
        vec![Command::LoadHistory]
    }

    fn continue_from_history(&mut self) -> Vec<Command> {
        let Some(Screen::History {
            entries,
            cursor,
            filter,
        }) = self.screen()
        else {
            return Vec::new();
        };
        let Some((_, entry)) = filter.nth(entries, *cursor) else {
            return Vec::new();
        };
        if !self.providers.iter().any(|(id, _)| *id == entry.provider) {
            let provider = entry.provider.clone();
            self.raise_error(TankobonError::ProviderUnavailable(format!(
                "provider {} is not enabled",
                provider
            )));
            return Vec::new();
        }
        let manga = entry.manga();
        self.load_chapters(manga)
    }

    fn remove_history_entry(&mut self) -> Vec<Command> {
        let Some(Screen::History {
            entries,
            cursor,
            filter,
        }) = self.stack.last_mut()
        else {
            return Vec::new();
        };
        let Some((index, _)) = filter.nth(entries, *cursor) else {
            return Vec::new();
        };
        let entry = entries.remove(index);
        let remaining = filter.visible(entries).len();
        *cursor = (*cursor).min(remaining.saturating_sub(1));
        self.set_status(format!("Removed {} from history", entry.manga_name));
        vec![Command::RemoveHistory(entry.id)]
    }

    fn submit_search(&mut self) -> Vec<Command> {
        let Some(Screen::Search { provider, input }) = self.screen() else {
            return Vec::new();
        };
        let query = input.trim().to_string();
        if query.is_empty() {
            return Vec::new();
        }
        let provider = provider.clone();
        let request = self.request();
        self.stack.push(Screen::Loading {
            request,
            message: format!("Searching for \"{}\"", query),
        });
        vec![Command::Search {
            request,
            provider,
            query,
        }]
    }

    fn open_manga(&mut self) -> Vec<Command> {
        let Some(Screen::MangaList {
            mangas,
            cursor,
            filter,
            ..
        }) = self.screen()
        else {
            return Vec::new();
        };
        match filter.nth(mangas, *cursor) {
            Some((_, manga)) => {
                let manga = manga.clone();
                self.load_chapters(manga)
            }
            None => Vec::new(),
        }
    }

    fn load_chapters(&mut self, manga: Manga) -> Vec<Command> {
        let request = self.request();
        self.stack.push(Screen::Loading {
            request,
            message: format!("Loading chapters of {}", manga.name),
        });
        vec![Command::LoadChapters { request, manga }]
    }

    fn open_manga_url(&mut self) -> Vec<Command> {
        let url = match self.screen() {
            Some(Screen::MangaList {
                mangas,
                cursor,
                filter,
                ..
            }) => filter
                .nth(mangas, *cursor)
                .and_then(|(_, m)| m.url.clone()),
            _ => None,
        };
        self.open_url(url)
    }

    fn open_chapter_url(&mut self) -> Vec<Command> {
        let url = match self.screen() {
            Some(Screen::ChapterList {
                manga,
                cursor,
                filter,
                ..
            }) => filter
                .nth(&manga.chapters, *cursor)
                .and_then(|(_, c)| c.url.clone())
                .or_else(|| manga.url.clone()),
            _ => None,
        };
        self.open_url(url)
    }

    fn open_url(&mut self, url: Option<String>) -> Vec<Command> {
        match url {
            Some(url) => vec![Command::OpenUrl(url)],
            None => {
                self.set_status("No URL to open".to_string());
                Vec::new()
            }
        }
    }

    /// Runs `edit` against the chapters the filter lets through.
    fn edit_selection(
        &mut self,
        edit: impl FnOnce(&mut SelectionSet, &[&Chapter], usize),
    ) -> Vec<Command> {
        if let Some(Screen::ChapterList {
            manga,
            cursor,
            selection,
            filter,
        }) = self.stack.last_mut()
        {
            let visible = filter.visible(&manga.chapters);
            edit(selection, &visible, *cursor);
        }
        Vec::new()
    }

    fn review_selection(&mut self) -> Vec<Command> {
        let Some(Screen::ChapterList {
            manga, selection, ..
        }) = self.screen()
        else {
            return Vec::new();
        };
        if selection.is_empty() {
            self.set_status(TankobonError::EmptySelection.to_string());
            return Vec::new();
        }
        let screen = Screen::Confirm {
            manga: manga.clone(),
            selection: selection.clone(),
        };
        self.stack.push(screen);
        Vec::new()
    }

    fn start_download(&mut self) -> Vec<Command> {
        let Some(Screen::Confirm { manga, selection }) = self.screen() else {
            return Vec::new();
        };
        let (manga, selection) = (manga.clone(), selection.clone());

        let converter = match self.converter(&self.format) {
            Ok(converter) => converter,
            Err(e) => {
                self.raise_error(e);
                return Vec::new();
            }
        };

        let id = self.batch_id();
        let batch = DownloadBatch::new(id, &selection, converter.format(), &self.naming);
        self.stack.pop();
        self.stack.push(Screen::Downloading {
            batch: id,
            manga_name: manga.name.clone(),
            current: None,
            succeeded: 0,
            failed: 0,
            total: batch.total(),
        });

        vec![Command::StartDownload {
            provider: manga.provider,
            batch,
            converter,
        }]
    }

    fn handle_download_event(&mut self, event: DownloadEvent) {
        let Some(Screen::Downloading {
            batch: active,
            manga_name,
            current,
            succeeded: done_ok,
            failed: done_err,
            total: done_total,
        }) = self.stack.last_mut()
        else {
            return;
        };
        if event.batch_id() != *active {
            return;
        }

        match event {
            DownloadEvent::Started { chapter, .. } => *current = Some(chapter.name),
            DownloadEvent::Progress {
                succeeded,
                failed,
                total,
                ..
            } => {
                *done_ok = succeeded;
                *done_err = failed;
                *done_total = total;
            }
            DownloadEvent::Finished { batch } => {
                let name = manga_name.clone();
                self.stack.pop();
                self.set_status(format!(
                    "{}: {} downloaded, {} failed",
                    name, batch.succeeded, batch.failed
                ));
                self.stack
                    .push(Screen::DownloadSummary { batch, cursor: 0 });
            }
        }
    }

    fn redownload_failed(&mut self) -> Vec<Command> {
        let Some(Screen::DownloadSummary { batch, .. }) = self.screen() else {
            return Vec::new();
        };
        let next_id = BatchId(self.next_batch + 1);
        let Some(retry) = batch.retry_failed(next_id) else {
            self.set_status("Nothing to redownload".to_string());
            return Vec::new();
        };
        self.next_batch = next_id.0;

        let first = &retry.jobs[0];
        let provider = first.chapter.provider.clone();
        let manga_name = first.chapter.manga_name.clone();
        let converter = ConverterRegistry::for_format(first.format, self.converter_options);

        self.stack.pop();
        self.stack.push(Screen::Downloading {
            batch: retry.id,
            manga_name,
            current: None,
            succeeded: 0,
            failed: 0,
            total: retry.total(),
        });

        vec![Command::StartDownload {
            provider,
            batch: retry,
            converter,
        }]
    }

    fn open_download_folder(&mut self) -> Vec<Command> {
        let Some(Screen::DownloadSummary { batch, cursor }) = self.screen() else {
            return Vec::new();
        };
        let folder = batch
            .jobs
            .get(*cursor)
            .and_then(|job| job.output_path.parent())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.naming.downloads_dir.clone());
        vec![Command::OpenPath {
            path: folder,
            reader: None,
        }]
    }

    fn read_chapter(&mut self) -> Vec<Command> {
        let Some(Screen::ChapterList {
            manga,
            cursor,
            filter,
            ..
        }) = self.screen()
        else {
            return Vec::new();
        };
        let Some((_, chapter)) = filter.nth(&manga.chapters, *cursor) else {
            return Vec::new();
        };
        let chapter = chapter.clone();

        if self.reader.read_in_browser {
            let url = chapter.url.clone().or_else(|| manga.url.clone());
            let mut commands = self.open_url(url);
            if !commands.is_empty() && self.save_on_read {
                commands.push(Command::SaveHistory(chapter));
            }
            return commands;
        }

        let converter = match self.converter(&self.format) {
            Ok(converter) => converter,
            Err(e) => {
                self.raise_error(e);
                return Vec::new();
            }
        };

        let request = self.request();
        self.stack.push(Screen::Reading {
            request,
            chapter: chapter.clone(),
            format: converter.format(),
        });
        vec![Command::Read {
            request,
            chapter,
            converter,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{JobId, JobStatus};

    fn settings() -> AppSettings {
        AppSettings {
            providers: vec![("mangadex".into(), "MangaDex".into())],
            format: "zip".into(),
            converter_options: ConverterOptions::default(),
            naming: NamingSettings {
                downloads_dir: PathBuf::from("/downloads"),
                create_manga_dir: true,
                template: "[{padded-index}] {chapter}".into(),
            },
            reader: ReaderConfig::default(),
            save_on_read: false,
            default_source: None,
            open_history: false,
        }
    }

    fn app() -> TuiApp {
        TuiApp::new(settings()).0
    }

    fn manga(chapters: usize) -> Manga {
        let mut manga = Manga::new("mangadex", "m1", "Berserk");
        manga.url = Some("https://example.com/m1".into());
        manga.chapters = (0..chapters)
            .map(|i| Chapter::new(&manga, format!("c{}", i + 1), format!("Chapter {}", i + 1), i))
            .collect();
        manga
    }

    fn act(app: &mut TuiApp, action: Action) -> Vec<Command> {
        app.update(Msg::Action(action))
    }

    /// Drives the app from the source list to the chapter list of a manga.
    fn chapter_list(app: &mut TuiApp, chapters: usize) {
        act(app, Action::Confirm);
        for c in "berserk".chars() {
            app.update(Msg::Char(c));
        }
        let request = match act(app, Action::Confirm).pop() {
            Some(Command::Search { request, query, .. }) => {
                assert_eq!(query, "berserk");
                request
            }
            _ => panic!("expected search command"),
        };
        let found = manga(chapters);
        app.update(Msg::SearchResults {
            request,
            result: Ok(vec![Manga {
                chapters: Vec::new(),
                ..found.clone()
            }]),
        });
        assert_eq!(app.kind(), ScreenKind::MangaList);

        let (request, listed) = match act(app, Action::Confirm).pop() {
            Some(Command::LoadChapters { request, manga }) => (request, manga),
            _ => panic!("expected chapter listing"),
        };
        app.update(Msg::ChaptersLoaded {
            request,
            manga: listed,
            result: Ok(found.chapters),
        });
        assert_eq!(app.kind(), ScreenKind::ChapterList);
    }

    fn start(app: &mut TuiApp) -> DownloadBatch {
        act(app, Action::Confirm);
        assert_eq!(app.kind(), ScreenKind::Confirm);
        match act(app, Action::Confirm).pop() {
            Some(Command::StartDownload { batch, .. }) => batch,
            _ => panic!("expected download to start"),
        }
    }

    fn finished(mut batch: DownloadBatch, failed: &[usize]) -> DownloadBatch {
        for job in batch.jobs.iter_mut() {
            if failed.contains(&job.id.0) {
                job.status = JobStatus::Failed("boom".into());
                batch.failed += 1;
            } else {
                job.status = JobStatus::Succeeded;
                batch.succeeded += 1;
            }
        }
        batch
    }

    #[test]
    fn test_starts_on_scrapers_install_without_providers() {
        let mut settings = settings();
        settings.providers.clear();
        let (mut app, commands) = TuiApp::new(settings);
        assert!(commands.is_empty());
        assert_eq!(app.kind(), ScreenKind::ScrapersInstall);

        act(&mut app, Action::Back);
        assert!(app.should_quit);
    }

    #[test]
    fn test_back_on_source_select_quits() {
        let mut app = app();
        act(&mut app, Action::Back);
        assert!(app.should_quit);
    }

    #[test]
    fn test_default_source_opens_search() {
        let mut settings = settings();
        settings.default_source = Some("mangadex".into());
        let (app, _) = TuiApp::new(settings);
        assert_eq!(app.kind(), ScreenKind::Search);

        let mut settings = self::settings();
        settings.default_source = Some("nowhere".into());
        let (app, _) = TuiApp::new(settings);
        match app.screen() {
            Some(Screen::Error { message, .. }) => assert!(message.contains("nowhere")),
            _ => panic!("expected error screen"),
        }
    }

    #[test]
    fn test_continue_opens_history() {
        let mut settings = settings();
        settings.open_history = true;
        let (mut app, commands) = TuiApp::new(settings);
        assert!(matches!(commands.as_slice(), [Command::LoadHistory]));

        let entry = HistoryEntry::from_chapter(&manga(3).chapters[1], None);
        app.update(Msg::HistoryLoaded(Ok(vec![entry.clone()])));

        match act(&mut app, Action::Remove).pop() {
            Some(Command::RemoveHistory(id)) => assert_eq!(id, entry.id),
            _ => panic!("expected removal"),
        }
        assert!(matches!(app.screen(), Some(Screen::History { entries, .. }) if entries.is_empty()));
    }

    #[test]
    fn test_history_entry_loads_chapters() {
        let (mut app, _) = TuiApp::new(settings());
        act(&mut app, Action::History);
        let entry = HistoryEntry::from_chapter(&manga(3).chapters[1], None);
        app.update(Msg::HistoryLoaded(Ok(vec![entry])));

        match act(&mut app, Action::Confirm).pop() {
            Some(Command::LoadChapters { manga, .. }) => assert_eq!(manga.id, "m1"),
            _ => panic!("expected chapter listing"),
        }
        assert_eq!(app.kind(), ScreenKind::Loading);
    }

    #[test]
    fn test_search_text_is_not_a_keybinding() {
        let mut app = app();
        act(&mut app, Action::Confirm);
        let bindings = KeybindingConfig::default();

        let q = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        let msg = app.key_msg(&q, &bindings);
        assert!(matches!(msg, Msg::Char('q')));
        app.update(msg);
        assert!(!app.should_quit);
        assert!(matches!(app.screen(), Some(Screen::Search { input, .. }) if input == "q"));

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(
            app.key_msg(&ctrl_c, &bindings),
            Msg::Action(Action::ForceQuit)
        ));
    }

    #[test]
    fn test_empty_search_results_return_to_search() {
        let mut app = app();
        act(&mut app, Action::Confirm);
        app.update(Msg::Char('x'));
        let request = match act(&mut app, Action::Confirm).pop() {
            Some(Command::Search { request, .. }) => request,
            _ => panic!("expected search"),
        };
        app.update(Msg::SearchResults {
            request,
            result: Ok(Vec::new()),
        });
        assert_eq!(app.kind(), ScreenKind::Search);
        assert!(app.status_message.is_some());
    }

    #[test]
    fn test_stale_search_results_are_dropped() {
        let mut app = app();
        act(&mut app, Action::Confirm);
        app.update(Msg::Char('x'));
        act(&mut app, Action::Confirm);
        act(&mut app, Action::Back);
        assert_eq!(app.kind(), ScreenKind::Search);

        app.update(Msg::SearchResults {
            request: RequestId(1),
            result: Ok(vec![manga(1)]),
        });
        assert_eq!(app.kind(), ScreenKind::Search);
    }

    #[test]
    fn test_empty_confirm_stays_in_chapter_list() {
        let mut app = app();
        chapter_list(&mut app, 3);

        let commands = act(&mut app, Action::Confirm);
        assert!(commands.is_empty());
        assert_eq!(app.kind(), ScreenKind::ChapterList);
        assert_eq!(app.status_message.as_deref(), Some("No chapters selected"));
    }

    #[test]
    fn test_selection_order_drives_batch_numbering() {
        let mut app = app();
        chapter_list(&mut app, 12);

        act(&mut app, Action::Bottom);
        act(&mut app, Action::SelectOne);
        act(&mut app, Action::Top);
        act(&mut app, Action::SelectOne);

        let batch = start(&mut app);
        assert_eq!(app.kind(), ScreenKind::Downloading);
        assert_eq!(batch.total(), 2);
        assert_eq!(batch.jobs[0].chapter.id, "c12");
        assert_eq!(batch.jobs[1].chapter.id, "c1");
        assert_eq!(batch.jobs[0].ordinal, 1);
    }

    #[test]
    fn test_select_all_then_clear() {
        let mut app = app();
        chapter_list(&mut app, 4);
        act(&mut app, Action::SelectAll);
        assert!(
            matches!(app.screen(), Some(Screen::ChapterList { selection, .. }) if selection.len() == 4)
        );
        act(&mut app, Action::ClearSelection);
        assert!(
            matches!(app.screen(), Some(Screen::ChapterList { selection, .. }) if selection.is_empty())
        );
    }

    #[test]
    fn test_unknown_format_raises_error() {
        let mut settings = settings();
        settings.format = "epub".into();
        let (mut app, _) = TuiApp::new(settings);
        chapter_list(&mut app, 2);
        act(&mut app, Action::SelectAll);
        act(&mut app, Action::Confirm);

        let commands = act(&mut app, Action::Confirm);
        assert!(commands.is_empty());
        match app.screen() {
            Some(Screen::Error { message, plot }) => {
                assert!(message.contains("\"epub\""));
                assert!(PLOTS.contains(plot));
            }
            _ => panic!("expected error screen"),
        }

        act(&mut app, Action::Back);
        assert_eq!(app.kind(), ScreenKind::Confirm);
    }

    #[test]
    fn test_download_events_update_progress() {
        let mut app = app();
        chapter_list(&mut app, 3);
        act(&mut app, Action::SelectAll);
        let batch = start(&mut app);

        app.update(Msg::Download(DownloadEvent::Started {
            batch: batch.id,
            job: JobId(0),
            chapter: batch.jobs[0].chapter.clone(),
        }));
        app.update(Msg::Download(DownloadEvent::Progress {
            batch: batch.id,
            job: JobId(0),
            status: JobStatus::Succeeded,
            succeeded: 1,
            failed: 0,
            total: 3,
        }));

        match app.screen() {
            Some(Screen::Downloading {
                current,
                succeeded,
                total,
                ..
            }) => {
                assert_eq!(current.as_deref(), Some("Chapter 1"));
                assert_eq!(*succeeded, 1);
                assert_eq!(*total, 3);
            }
            _ => panic!("expected downloading screen"),
        }

        app.update(Msg::Download(DownloadEvent::Finished {
            batch: finished(batch, &[]),
        }));
        assert_eq!(app.kind(), ScreenKind::DownloadSummary);
    }

    #[test]
    fn test_events_of_other_batches_are_ignored() {
        let mut app = app();
        chapter_list(&mut app, 2);
        act(&mut app, Action::SelectAll);
        let batch = start(&mut app);

        let mut other = batch.clone();
        other.id = BatchId(99);
        app.update(Msg::Download(DownloadEvent::Finished { batch: other }));
        assert_eq!(app.kind(), ScreenKind::Downloading);
    }

    #[test]
    fn test_redownload_failed_builds_retry_batch() {
        let mut app = app();
        chapter_list(&mut app, 5);
        act(&mut app, Action::SelectAll);
        let batch = start(&mut app);
        let first_id = batch.id;

        app.update(Msg::Download(DownloadEvent::Finished {
            batch: finished(batch, &[2]),
        }));

        let retry = match act(&mut app, Action::RedownloadFailed).pop() {
            Some(Command::StartDownload { batch, .. }) => batch,
            _ => panic!("expected retry"),
        };
        assert_ne!(retry.id, first_id);
        assert_eq!(retry.total(), 1);
        assert_eq!(retry.jobs[0].chapter.id, "c3");
        assert_eq!(retry.jobs[0].ordinal, 3);
        assert_eq!(app.kind(), ScreenKind::Downloading);
    }

    #[test]
    fn test_redownload_without_failures_is_rejected() {
        let mut app = app();
        chapter_list(&mut app, 2);
        act(&mut app, Action::SelectAll);
        let batch = start(&mut app);
        app.update(Msg::Download(DownloadEvent::Finished {
            batch: finished(batch, &[]),
        }));

        assert!(act(&mut app, Action::RedownloadFailed).is_empty());
        assert_eq!(app.kind(), ScreenKind::DownloadSummary);
    }

    #[test]
    fn test_back_while_downloading_cancels() {
        let mut app = app();
        chapter_list(&mut app, 2);
        act(&mut app, Action::SelectAll);
        let batch = start(&mut app);

        match act(&mut app, Action::Back).pop() {
            Some(Command::CancelDownload(id)) => assert_eq!(id, batch.id),
            _ => panic!("expected cancel"),
        }
        assert_eq!(app.kind(), ScreenKind::ChapterList);

        // Late events from the cancelled batch change nothing.
        app.update(Msg::Download(DownloadEvent::Finished {
            batch: finished(batch, &[]),
        }));
        assert_eq!(app.kind(), ScreenKind::ChapterList);
    }

    #[test]
    fn test_fatal_error_replaces_loading() {
        let mut app = app();
        act(&mut app, Action::Confirm);
        app.update(Msg::Char('x'));
        act(&mut app, Action::Confirm);
        assert_eq!(app.kind(), ScreenKind::Loading);

        app.update(Msg::Fatal(TankobonError::ProviderUnavailable(
            "mangadex is down".into(),
        )));
        assert_eq!(app.kind(), ScreenKind::Error);
        act(&mut app, Action::Back);
        assert_eq!(app.kind(), ScreenKind::Search);
    }

    #[test]
    fn test_read_opens_converted_chapter() {
        let mut app = app();
        chapter_list(&mut app, 2);
        act(&mut app, Action::MoveDown);

        let (request, chapter) = match act(&mut app, Action::Read).pop() {
            Some(Command::Read {
                request, chapter, ..
            }) => (request, chapter),
            _ => panic!("expected read"),
        };
        assert_eq!(chapter.id, "c2");
        assert_eq!(app.kind(), ScreenKind::Reading);

        let commands = app.update(Msg::ReadReady {
            request,
            chapter,
            result: Ok(PathBuf::from("/tmp/c2.zip")),
        });
        assert!(matches!(
            commands.as_slice(),
            [Command::OpenPath { path, reader: None }] if path == &PathBuf::from("/tmp/c2.zip")
        ));
        assert_eq!(app.kind(), ScreenKind::ChapterList);
    }

    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut app = app();
        chapter_list(&mut app, 3);
        act(&mut app, Action::NextPage);
        assert!(matches!(app.screen(), Some(Screen::ChapterList { cursor: 2, .. })));
        act(&mut app, Action::MoveDown);
        assert!(matches!(app.screen(), Some(Screen::ChapterList { cursor: 2, .. })));
        act(&mut app, Action::PrevPage);
        assert!(matches!(app.screen(), Some(Screen::ChapterList { cursor: 0, .. })));
    }

    #[test]
    fn test_open_folder_uses_job_directory() {
        let mut app = app();
        chapter_list(&mut app, 1);
        act(&mut app, Action::SelectAll);
        let batch = start(&mut app);
        let expected = batch.jobs[0].output_path.parent().unwrap().to_path_buf();
        app.update(Msg::Download(DownloadEvent::Finished {
            batch: finished(batch, &[]),
        }));

        match act(&mut app, Action::OpenFolder).pop() {
            Some(Command::OpenPath { path, reader }) => {
                assert_eq!(path, expected);
                assert!(reader.is_none());
            }
            _ => panic!("expected open"),
        }
    }

    fn type_filter(app: &mut TuiApp, query: &str) {
        act(app, Action::Filter);
        assert!(app.is_typing());
        for c in query.chars() {
            app.update(Msg::Char(c));
        }
        act(app, Action::Confirm);
        assert!(!app.is_typing());
    }

    fn read_request(app: &mut TuiApp) -> (RequestId, Chapter) {
        match act(app, Action::Read).pop() {
            Some(Command::Read {
                request, chapter, ..
            }) => (request, chapter),
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_select_all_under_filter_marks_only_visible() {
        let mut app = app();
        chapter_list(&mut app, 12);
        type_filter(&mut app, "chapter 1");

        act(&mut app, Action::SelectAll);
        let selected: Vec<String> = match app.screen() {
            Some(Screen::ChapterList { selection, .. }) => {
                selection.ordered().iter().map(|c| c.id.clone()).collect()
            }
            _ => panic!("expected chapter list"),
        };
        assert_eq!(selected, vec!["c1", "c10", "c11", "c12"]);
    }

    #[test]
    fn test_filter_keys_are_text_while_editing() {
        let mut app = app();
        chapter_list(&mut app, 3);
        act(&mut app, Action::Filter);
        let bindings = KeybindingConfig::default();

        let q = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert!(matches!(app.key_msg(&q, &bindings), Msg::Char('q')));
        assert!(act(&mut app, Action::Quit).is_empty());
        assert!(!app.should_quit);
    }

    #[test]
    fn test_back_clears_filter_before_leaving() {
        let mut app = app();
        chapter_list(&mut app, 3);
        type_filter(&mut app, "3");
        assert!(matches!(
            app.screen().and_then(Screen::filter),
            Some(f) if f.query == "3"
        ));

        act(&mut app, Action::Back);
        assert_eq!(app.kind(), ScreenKind::ChapterList);
        assert!(matches!(app.screen().and_then(Screen::filter), Some(f) if !f.is_active()));

        act(&mut app, Action::Back);
        assert_eq!(app.kind(), ScreenKind::MangaList);
    }

    #[test]
    fn test_cursor_follows_filtered_rows() {
        let mut app = app();
        chapter_list(&mut app, 12);
        type_filter(&mut app, "chapter 1");
        act(&mut app, Action::Bottom);
        assert!(matches!(app.screen(), Some(Screen::ChapterList { cursor: 3, .. })));

        let (_, chapter) = read_request(&mut app);
        assert_eq!(chapter.id, "c12");
    }

    #[test]
    fn test_filtered_history_removes_matching_entry() {
        let (mut app, _) = TuiApp::new(settings());
        act(&mut app, Action::History);
        let mut other = Manga::new("mangadex", "m2", "Vagabond");
        other.chapters = vec![Chapter::new(&other, "v1", "Chapter 1", 0)];
        let entries = vec![
            HistoryEntry::from_chapter(&manga(1).chapters[0], None),
            HistoryEntry::from_chapter(&other.chapters[0], None),
        ];
        app.update(Msg::HistoryLoaded(Ok(entries.clone())));
        type_filter(&mut app, "vaga");

        match act(&mut app, Action::Remove).pop() {
            Some(Command::RemoveHistory(id)) => assert_eq!(id, entries[1].id),
            _ => panic!("expected removal"),
        }
    }

    #[test]
    fn test_help_toggles() {
        let mut app = app();
        act(&mut app, Action::Help);
        assert!(app.show_help);

        act(&mut app, Action::Back);
        assert!(!app.show_help);
        assert!(!app.should_quit);

        act(&mut app, Action::Help);
        act(&mut app, Action::Help);
        assert!(!app.show_help);
    }

    #[test]
    fn test_read_records_history_when_enabled() {
        let mut settings = settings();
        settings.save_on_read = true;
        settings.reader.zip = "mcomix".into();
        let (mut app, _) = TuiApp::new(settings);
        chapter_list(&mut app, 2);

        let (request, chapter) = read_request(&mut app);
        let commands = app.update(Msg::ReadReady {
            request,
            chapter,
            result: Ok(PathBuf::from("/tmp/c1.zip")),
        });
        match commands.as_slice() {
            [Command::OpenPath { reader, .. }, Command::SaveHistory(saved)] => {
                assert_eq!(reader.as_deref(), Some("mcomix"));
                assert_eq!(saved.id, "c1");
            }
            _ => panic!("expected open and history"),
        }
    }

    #[test]
    fn test_stale_read_does_not_record_history() {
        let mut settings = settings();
        settings.save_on_read = true;
        let (mut app, _) = TuiApp::new(settings);
        chapter_list(&mut app, 2);

        let (request, chapter) = read_request(&mut app);
        act(&mut app, Action::Back);
        assert_eq!(app.kind(), ScreenKind::ChapterList);

        let commands = app.update(Msg::ReadReady {
            request,
            chapter,
            result: Ok(PathBuf::from("/tmp/c1.zip")),
        });
        assert!(commands.is_empty());
    }

    #[test]
    fn test_read_in_browser_opens_chapter_url() {
        let mut settings = settings();
        settings.save_on_read = true;
        settings.reader.read_in_browser = true;
        let (mut app, _) = TuiApp::new(settings);
        chapter_list(&mut app, 2);

        match act(&mut app, Action::Read).as_slice() {
            [Command::OpenUrl(url), Command::SaveHistory(saved)] => {
                assert_eq!(url, "https://example.com/m1");
                assert_eq!(saved.id, "c1");
            }
            _ => panic!("expected browser read"),
        }
        assert_eq!(app.kind(), ScreenKind::ChapterList);
    }
}
