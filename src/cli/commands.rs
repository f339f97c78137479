use chrono::Local;

use crate::app::{AppContext, Result, TankobonError};
use crate::cli::{DownloadArgs, WhereArgs};
use crate::config::{paths, Config};
use crate::converter::{ConverterOptions, ConverterRegistry};
use crate::domain::SelectionSet;
use crate::downloader::{BatchId, DownloadBatch, DownloadEvent, JobStatus};
use crate::store::HistoryStore;

pub fn list_sources(ctx: &AppContext) {
    let sources = ctx.providers.list();
    if sources.is_empty() {
        println!("No sources enabled");
        return;
    }

    for (id, name) in sources {
        println!("{} ({})", name, id);
    }
}

pub fn list_formats() {
    for name in ConverterRegistry::available() {
        println!("{}", name);
    }
}

pub fn show_where(args: &WhereArgs, config: &Config) -> Result<()> {
    let all = !(args.config || args.logs || args.history || args.downloads);

    if all || args.config {
        println!("config: {}", paths::config_dir()?.display());
    }
    if all || args.logs {
        println!("logs: {}", paths::logs_dir()?.display());
    }
    if all || args.history {
        println!("history: {}", paths::history_db()?.display());
    }
    if all || args.downloads {
        println!("downloads: {}", config.downloader.downloads_dir().display());
    }
    Ok(())
}

pub fn list_history(ctx: &AppContext) -> Result<()> {
    let entries = ctx.history.list()?;

    if entries.is_empty() {
        println!("No history");
        return Ok(());
    }

    for entry in entries {
        println!(
            "{} {}\n  {} ({})",
            entry.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            entry.manga_name,
            entry.chapter_name,
            entry.provider
        );
    }

    Ok(())
}

pub fn init_config(force: bool) -> Result<()> {
    let path = paths::config_file()?;
    if path.exists() && !force {
        println!("Config already exists: {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    Config::write_default(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Searches, selects chapters and runs one batch, printing progress as it goes.
pub async fn download(ctx: &AppContext, args: DownloadArgs) -> Result<DownloadBatch> {
    let source = match args
        .source
        .as_deref()
        .or(ctx.config.downloader.default_source())
    {
        Some(source) => source.to_string(),
        None => ctx
            .providers
            .list()
            .into_iter()
            .next()
            .map(|(id, _)| id)
            .ok_or_else(|| TankobonError::ProviderUnavailable("no source enabled".into()))?,
    };
    let provider = ctx.providers.get(&source)?;

    let format = args
        .format
        .clone()
        .unwrap_or_else(|| ctx.config.formats.format.clone());
    let converter =
        ConverterRegistry::get(&format, ConverterOptions::from_config(&ctx.config.formats))?;

    let mangas = provider.search(&args.query).await?;
    let manga = args
        .manga
        .checked_sub(1)
        .and_then(|i| mangas.get(i))
        .ok_or_else(|| {
            TankobonError::Other(format!(
                "no result #{} for {:?} ({} found)",
                args.manga,
                args.query,
                mangas.len()
            ))
        })?;
    println!("{} ({})", manga.name, provider.name());

    let chapters = provider.chapters(manga).await?;
    let mut selection = SelectionSet::new();
    for index in parse_chapter_selection(&args.chapters, chapters.len())? {
        selection.toggle(&chapters[index]);
    }

    let batch = DownloadBatch::new(
        BatchId(1),
        &selection,
        converter.format(),
        &ctx.naming(),
    );
    println!("Downloading {} chapters as {}", batch.total(), converter.format());

    let mut handle = ctx.orchestrator(&source, converter)?.start(batch);
    while let Some(event) = handle.next_event().await {
        match event {
            DownloadEvent::Started { .. } => {}
            DownloadEvent::Progress {
                job,
                status,
                succeeded,
                failed,
                total,
                ..
            } => match status {
                JobStatus::Failed(reason) => {
                    eprintln!("  ! [{}/{}] {} {}", succeeded + failed, total, job, reason)
                }
                _ => println!("  + [{}/{}] {}", succeeded + failed, total, job),
            },
            DownloadEvent::Finished { .. } => break,
        }
    }
    let batch = handle.join().await?;

    if ctx.config.history.save_on_download {
        if let Some(job) = batch.succeeded_jobs().last() {
            ctx.record_history(&job.chapter, manga.url.clone())?;
        }
    }

    println!(
        "\nDownload complete: {} succeeded, {} failed",
        batch.succeeded, batch.failed
    );
    for job in batch.succeeded_jobs() {
        println!("  {}", job.output_path.display());
    }

    if batch.has_failures() {
        return Err(TankobonError::Other(format!(
            "{} chapter(s) failed",
            batch.failed
        )));
    }
    Ok(batch)
}

/// Parses a 1-based chapter selection into 0-based indices, in the given order.
///
/// Accepts `all`, single numbers and inclusive ranges separated by commas. Repeated
/// chapters are kept once.
pub fn parse_chapter_selection(selection: &str, count: usize) -> Result<Vec<usize>> {
    let invalid = |part: &str| {
        TankobonError::Other(format!(
            "invalid chapter selection {:?} (there are {} chapters)",
            part, count
        ))
    };
    let number = |s: &str| -> Result<usize> {
        match s.trim().parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
            _ => Err(invalid(s.trim())),
        }
    };

    let selection = selection.trim();
    if selection.eq_ignore_ascii_case("all") {
        return if count == 0 {
            Err(TankobonError::EmptySelection)
        } else {
            Ok((0..count).collect())
        };
    }

    let mut indices = Vec::new();
    for part in selection.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let range = match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(invalid(part));
                }
                start..=end
            }
            None => {
                let n = number(part)?;
                n..=n
            }
        };
        for index in range {
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
    }

    if indices.is_empty() {
        return Err(TankobonError::EmptySelection);
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        assert_eq!(parse_chapter_selection("all", 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_chapter_selection(" ALL ", 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_parse_numbers_and_ranges() {
        assert_eq!(parse_chapter_selection("2", 5).unwrap(), vec![1]);
        assert_eq!(parse_chapter_selection("1-3", 5).unwrap(), vec![0, 1, 2]);
        assert_eq!(
            parse_chapter_selection("5, 1-2, 2", 5).unwrap(),
            vec![4, 0, 1]
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_chapter_selection("0", 5).is_err());
        assert!(parse_chapter_selection("6", 5).is_err());
        assert!(parse_chapter_selection("3-1", 5).is_err());
        assert!(parse_chapter_selection("x", 5).is_err());
        assert!(matches!(
            parse_chapter_selection("", 5),
            Err(TankobonError::EmptySelection)
        ));
        assert!(matches!(
            parse_chapter_selection("all", 0),
            Err(TankobonError::EmptySelection)
        ));
    }
}
