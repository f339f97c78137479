use std::fs::{self, File};
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tankobon::app::AppContext;
use tankobon::cli::{commands, Cli, Commands, ConfigAction};
use tankobon::config::{paths, Config, LogsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config {
        action: ConfigAction::Init { force },
    }) = &cli.command
    {
        commands::init_config(*force)?;
        return Ok(());
    }

    let config = Config::load()?;
    init_tracing(&config.logs, cli.command.is_none())?;

    match cli.command {
        None => {
            let ctx = AppContext::new(config, None)?;
            tankobon::tui::run(Arc::new(ctx), cli.continue_reading).await?;
        }
        Some(Commands::Sources) => {
            let ctx = AppContext::new(config, None)?;
            commands::list_sources(&ctx);
        }
        Some(Commands::Formats) => {
            commands::list_formats();
        }
        Some(Commands::Where(args)) => {
            commands::show_where(&args, &config)?;
        }
        Some(Commands::History) => {
            let ctx = AppContext::new(config, None)?;
            commands::list_history(&ctx)?;
        }
        Some(Commands::Download(args)) => {
            let ctx = AppContext::new(config, None)?;
            commands::download(&ctx, args).await?;
        }
        Some(Commands::Config { .. }) => {}
    }

    Ok(())
}

/// The terminal belongs to the TUI, so it only logs to a file and only when asked to.
fn init_tracing(logs: &LogsConfig, tui: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logs.level));

    if !tui {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(());
    }

    if logs.write {
        let dir = paths::logs_dir()?;
        fs::create_dir_all(&dir)?;
        let file = File::create(dir.join(format!(
            "{}.log",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        )))?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .with(filter)
            .init();
    }

    Ok(())
}
