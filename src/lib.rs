//! # Tankobon
//!
//! A terminal manga browser and downloader.
//!
//! ## Architecture
//!
//! ```text
//! Provider → SelectionSet → DownloadBatch → DownloadOrchestrator → Converter → disk
//!                                                   ↓ events
//!                                                  TUI
//! ```
//!
//! - [`provider`]: manga sources (search, chapter listing, page download)
//! - [`downloader`]: batches of chapter downloads run by a bounded worker pool
//! - [`converter`]: output formats (plain, zip, cbz, pdf)
//! - [`tui`]: screen state machine and rendering built with ratatui
//!
//! ## Quick Start
//!
//! ```bash
//! # Launch the TUI
//! tankobon
//!
//! # Continue from history
//! tankobon --continue
//!
//! # Download the first three chapters as cbz
//! tankobon download --query "blame" --chapters 1-3 --format cbz
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together configuration,
/// providers and the history store.
pub mod app;

/// Command-line interface using clap.
///
/// With no subcommand the TUI starts. Subcommands:
/// - `sources`, `formats` - list what is available
/// - `where` - print config, log, history and download locations
/// - `history` - print the reading history
/// - `config init` - write the default configuration
/// - `download` - headless search and download
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/tankobon/config.toml` (or `$TANKOBON_CONFIG_PATH`).
pub mod config;

/// Output formats and the [`ConverterRegistry`](converter::ConverterRegistry).
pub mod converter;

/// Core domain models.
///
/// - [`Manga`](domain::Manga), [`Chapter`](domain::Chapter), [`Page`](domain::Page)
/// - [`SelectionSet`](domain::SelectionSet): chapters marked for download, in order
/// - [`HistoryEntry`](domain::HistoryEntry): last chapter read per manga
pub mod domain;

/// Download batches, jobs, output naming and the concurrent orchestrator.
pub mod downloader;

/// Manga sources behind the async [`Provider`](provider::Provider) trait.
pub mod provider;

/// SQLite persistence for reading history.
pub mod store;

/// Terminal user interface.
pub mod tui;
