use std::{fs::File, path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};
use log::info;
use wavescope::{
    analyzer::AnalysisMode,
    audio_output::{RodioOutput, list_output_devs},
    builtin_themes, config, tui,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Audio file to open on startup
    input: Option<PathBuf>,
    /// Config file to use instead of the default search path
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Colour theme, see --list-themes
    #[arg(short, long)]
    theme: Option<String>,
    #[arg(short, long, value_enum)]
    mode: Option<AnalysisMode>,
    /// Samples written to the device per iteration
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Output device name, see --list-devices
    #[arg(short, long)]
    device: Option<String>,
    #[arg(long)]
    list_devices: bool,
    #[arg(long)]
    list_themes: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if cli.list_devices {
        for dev in list_output_devs() {
            println!("{dev}");
        }
        return Ok(());
    }
    if cli.list_themes {
        for theme in builtin_themes::list_themes() {
            println!("{theme}");
        }
        return Ok(());
    }

    // the terminal belongs to the UI, so logs go to a file
    let log_path = init_logging()?;
    info!("logging to {}", log_path.display());

    let mut config = config::load(cli.config.as_deref());
    if let Some(theme) = cli.theme {
        config.view.theme = theme;
    }
    if let Some(mode) = cli.mode {
        config.analysis.mode = mode;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.playback.chunk_size = chunk_size;
    }
    if let Some(device) = cli.device {
        config.playback.output_device = Some(device);
    }

    let output = Arc::new(RodioOutput::new(config.playback.output_device.clone()));
    tui::run(output, config, cli.input)
}

fn init_logging() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("wavescope");
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("wavescope.log");
    let file =
        File::create(&path).wrap_err_with(|| format!("failed to create {}", path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(path)
}
