use std::path::PathBuf;

use clap::Parser;
use cyder::config::{ConfigResult, HostConfig, LogLevel};
use cyder::core::Engine;

#[derive(Parser, Debug)]
#[command(name = "cyder")]
#[command(about = "Runs a script-authored frame loop on an embedded JavaScript engine.", long_about = None)]
struct Cli {
    /// Entry script; overrides the configured `entry_script`
    entry: Option<PathBuf>,

    /// Configuration file (.toml or .json); defaults to ./cyder.toml or ./cyder.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many frames (0 runs until killed)
    #[arg(long)]
    frames: Option<u64>,

    #[arg(long)]
    fps: Option<u32>,

    /// trace, debug, info, warn or error
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
}

fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    LogLevel::parse(value).ok_or_else(|| format!("expected trace, debug, info, warn or error, got `{}`", value))
}

impl Cli {
    /// File or default configuration, then environment overrides, then flags.
    fn load_config(&self) -> ConfigResult<HostConfig> {
        let mut config = match &self.config {
            Some(path) => HostConfig::from_file(path)?,
            None => HostConfig::load_or_default(),
        };
        config.apply_env_overrides();

        if let Some(entry) = &self.entry {
            config.entry_script = entry.clone();
        }
        if let Some(frames) = self.frames {
            config.frame.max_frames = frames;
        }
        if let Some(fps) = self.fps {
            config.frame.target_fps = fps;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = Engine::run(config) {
        eprintln!("Host failed to start: {}", e);
        std::process::exit(1);
    }
}
