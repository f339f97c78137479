use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::config::ColorConfig;
use crate::downloader::JobStatus;
use crate::tui::app::{Screen, ScreenKind, TuiApp};
use crate::tui::filter::ListFilter;

pub fn render(frame: &mut Frame, app: &TuiApp, colors: &ColorConfig) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Screen
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    if let Some(screen) = app.screen() {
        render_screen(frame, app, screen, chunks[0], colors);
    }
    render_status_bar(frame, app, chunks[1], colors);

    if app.show_help {
        render_help(frame, app.kind(), colors);
    }
}

fn render_screen(frame: &mut Frame, app: &TuiApp, screen: &Screen, area: Rect, colors: &ColorConfig) {
    match screen {
        Screen::ScrapersInstall => {
            let text = Text::from(vec![
                Line::from("No manga sources are enabled."),
                Line::from(""),
                Line::from("Enable one in the configuration file, for example:"),
                Line::from(Span::styled("[mangadex]", Style::default().fg(colors.title))),
                Line::from(Span::styled("enabled = true", Style::default().fg(colors.title))),
            ]);
            render_text(frame, area, " Sources ", text, colors);
        }
        Screen::SourceSelect { cursor, filter } => {
            let items = filter
                .visible(&app.providers)
                .into_iter()
                .map(|(id, name)| ListItem::new(format!("{} ({})", name, id)))
                .collect();
            let title = with_filter(" Sources ".to_string(), filter);
            render_list(frame, area, title, items, *cursor, colors);
        }
        Screen::History {
            entries,
            cursor,
            filter,
        } => {
            let items = filter
                .visible(entries)
                .into_iter()
                .map(|entry| {
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            entry.manga_name.clone(),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(format!("  {}", entry.chapter_name)),
                        Span::styled(
                            format!("  {}", entry.updated_at.format("%Y-%m-%d %H:%M")),
                            Style::default().fg(colors.inactive_border),
                        ),
                    ]))
                })
                .collect();
            let title = with_filter(format!(" History ({}) ", entries.len()), filter);
            render_list(frame, area, title, items, *cursor, colors);
        }
        Screen::Search { provider, input } => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(0)])
                .split(area);
            let paragraph = Paragraph::new(format!("{}_", input)).block(
                Block::default()
                    .title(format!(" Search {} ", provider))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(colors.active_border)),
            );
            frame.render_widget(paragraph, chunks[0]);
        }
        Screen::Loading { message, .. } => {
            render_text(frame, area, " Loading ", Text::from(format!("{}...", message)), colors);
        }
        Screen::MangaList {
            provider,
            mangas,
            cursor,
            filter,
        } => {
            let items = filter
                .visible(mangas)
                .into_iter()
                .map(|manga| ListItem::new(manga.name.clone()))
                .collect();
            let title = with_filter(
                format!(" {} results from {} ", mangas.len(), provider),
                filter,
            );
            render_list(frame, area, title, items, *cursor, colors);
        }
        Screen::ChapterList {
            manga,
            cursor,
            selection,
            filter,
        } => {
            let visible = filter.visible(&manga.chapters);
            let title = with_filter(
                format!(
                    " {} [{}/{}] {} selected ",
                    manga.name,
                    cursor + 1,
                    visible.len().max(1),
                    selection.len()
                ),
                filter,
            );
            let items = visible
                .into_iter()
                .map(|chapter| {
                    if selection.contains(&chapter.id) {
                        ListItem::new(format!("[x] {}", chapter.name))
                            .style(Style::default().fg(colors.marked))
                    } else {
                        ListItem::new(format!("[ ] {}", chapter.name))
                    }
                })
                .collect();
            render_list(frame, area, title, items, *cursor, colors);
        }
        Screen::Confirm { manga, selection } => {
            let chapters = selection.ordered();
            let mut lines = vec![
                Line::from(Span::styled(
                    format!(
                        "Download {} chapter(s) of {} as {}?",
                        chapters.len(),
                        manga.name,
                        app.format
                    ),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
            ];
            lines.extend(chapters.iter().map(|c| Line::from(format!("  {}", c.name))));
            render_text(frame, area, " Confirm ", Text::from(lines), colors);
        }
        Screen::Downloading {
            manga_name,
            current,
            succeeded,
            failed,
            total,
            ..
        } => render_progress(
            frame,
            area,
            manga_name,
            current.as_deref(),
            (*succeeded, *failed, *total),
            colors,
        ),
        Screen::Reading { chapter, .. } => {
            let text = Text::from(format!("Preparing {} for reading...", chapter.name));
            render_text(frame, area, " Reading ", text, colors);
        }
        Screen::DownloadSummary { batch, cursor } => {
            let items = batch
                .jobs
                .iter()
                .map(|job| {
                    let (marker, style, reason) = match &job.status {
                        JobStatus::Succeeded => ("✓", Style::default().fg(colors.success), None),
                        JobStatus::Failed(reason) => {
                            ("✗", Style::default().fg(colors.failure), Some(reason))
                        }
                        JobStatus::Pending | JobStatus::InFlight => ("·", Style::default(), None),
                    };
                    let mut spans = vec![
                        Span::styled(format!("{} ", marker), style),
                        Span::raw(job.output_path.display().to_string()),
                    ];
                    if let Some(reason) = reason {
                        spans.push(Span::styled(format!("  {}", reason), style));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect();

            let mut title = format!(
                " Downloaded {}/{}, {} failed ",
                batch.succeeded,
                batch.total(),
                batch.failed
            );
            if batch.aborted {
                title.push_str("(stopped on error) ");
            } else if batch.cancelled {
                title.push_str("(cancelled) ");
            }
            render_list(frame, area, title, items, *cursor, colors);
        }
        Screen::Error { message, plot } => {
            let text = Text::from(vec![
                Line::from(Span::styled(
                    *plot,
                    Style::default().add_modifier(Modifier::ITALIC),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(colors.failure),
                )),
            ]);
            render_text(frame, area, " Error ", text, colors);
        }
    }
}

fn block(title: String, colors: &ColorConfig) -> Block<'static> {
    Block::default()
        .title(Span::styled(title, Style::default().fg(colors.title)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.active_border))
}

fn render_list(
    frame: &mut Frame,
    area: Rect,
    title: String,
    items: Vec<ListItem>,
    cursor: usize,
    colors: &ColorConfig,
) {
    let highlight_style = Style::default()
        .bg(colors.selection_bg)
        .fg(colors.selection_fg)
        .add_modifier(Modifier::BOLD);

    let list = List::new(items)
        .block(block(title, colors))
        .highlight_style(highlight_style)
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(cursor));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_text(frame: &mut Frame, area: Rect, title: &str, text: Text, colors: &ColorConfig) {
    let paragraph = Paragraph::new(text)
        .block(block(title.to_string(), colors))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_progress(
    frame: &mut Frame,
    area: Rect,
    manga_name: &str,
    current: Option<&str>,
    (succeeded, failed, total): (usize, usize, usize),
    colors: &ColorConfig,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let done = succeeded + failed;
    let ratio = if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64).clamp(0.0, 1.0)
    };

    let gauge = Gauge::default()
        .block(block(format!(" Downloading {} ", manga_name), colors))
        .gauge_style(Style::default().fg(colors.progress))
        .ratio(ratio)
        .label(format!("{}/{}", done, total));
    frame.render_widget(gauge, chunks[0]);

    let mut lines = vec![Line::from(format!(
        "Current: {}",
        current.unwrap_or("waiting for a worker")
    ))];
    if failed > 0 {
        lines.push(Line::from(Span::styled(
            format!("{} failed", failed),
            Style::default().fg(colors.failure),
        )));
    }
    frame.render_widget(Paragraph::new(Text::from(lines)), chunks[1]);
}

/// Appends the filter query to a list title. The trailing underscore marks typing.
fn with_filter(mut title: String, filter: &ListFilter) -> String {
    if filter.editing {
        title.push_str(&format!("/{}_ ", filter.query));
    } else if filter.is_active() {
        title.push_str(&format!("/{} ", filter.query));
    }
    title
}

fn help(kind: ScreenKind) -> &'static str {
    match kind {
        ScreenKind::ScrapersInstall => "q:Quit",
        ScreenKind::SourceSelect => "j/k:Nav  Enter:Search  H:History  /:Filter  ?:Help  q:Quit",
        ScreenKind::History => "j/k:Nav  Enter:Continue  d:Remove  /:Filter  ?:Help  Esc:Back",
        ScreenKind::Search => "Enter:Search  Esc:Back  Ctrl+c:Quit",
        ScreenKind::Loading | ScreenKind::Reading => "Esc:Back",
        ScreenKind::MangaList => "j/k:Nav  Enter:Chapters  o:Open  /:Filter  ?:Help  Esc:Back",
        ScreenKind::ChapterList => "Space:Select  Tab:All  Enter:Download  r:Read  /:Filter  ?:Help",
        ScreenKind::Confirm => "Enter:Start  Esc:Back",
        ScreenKind::Downloading => "Esc:Cancel  Ctrl+c:Quit",
        ScreenKind::DownloadSummary => "r:Redownload failed  o:Open folder  Esc:Back  q:Quit",
        ScreenKind::Error => "Esc:Back  q:Quit",
    }
}

/// Every key of a screen, one per line.
fn full_help(kind: ScreenKind) -> Vec<(&'static str, &'static str)> {
    let mut keys = vec![("j/k, ↑/↓", "Move"), ("PgUp/PgDn", "Page"), ("g/G", "Top/bottom")];
    match kind {
        ScreenKind::SourceSelect => keys.extend([("Enter", "Search this source"), ("H", "History")]),
        ScreenKind::History => keys.extend([("Enter", "Continue reading"), ("d", "Remove entry")]),
        ScreenKind::MangaList => keys.extend([("Enter", "List chapters"), ("o", "Open in browser")]),
        ScreenKind::ChapterList => keys.extend([
            ("Space", "Select chapter"),
            ("Tab", "Select all shown"),
            ("Backspace", "Clear selection"),
            ("Enter", "Download selection"),
            ("r", "Read chapter"),
            ("o", "Open in browser"),
        ]),
        ScreenKind::DownloadSummary => {
            keys.extend([("r", "Redownload failed"), ("o", "Open folder")])
        }
        _ => keys.clear(),
    }
    if matches!(
        kind,
        ScreenKind::SourceSelect
            | ScreenKind::History
            | ScreenKind::MangaList
            | ScreenKind::ChapterList
    ) {
        keys.push(("/", "Filter, Esc clears it"));
    }
    keys.extend([("Esc", "Back"), ("?", "Close help"), ("q", "Quit")]);
    keys
}

fn render_help(frame: &mut Frame, kind: ScreenKind, colors: &ColorConfig) {
    let area = centered_rect(60, 70, frame.area());
    frame.render_widget(Clear, area);

    let lines: Vec<Line> = full_help(kind)
        .into_iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{:>12}  ", key), Style::default().fg(colors.title)),
                Span::raw(what),
            ])
        })
        .collect();
    render_text(frame, area, " Help ", Text::from(lines), colors);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn render_status_bar(frame: &mut Frame, app: &TuiApp, area: Rect, colors: &ColorConfig) {
    let status = app
        .status_message
        .clone()
        .unwrap_or_else(|| help(app.kind()).to_string());

    let paragraph =
        Paragraph::new(status).style(Style::default().fg(colors.status_fg).bg(colors.status_bg));

    frame.render_widget(paragraph, area);
}
