use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use rope_engine::blocking::BlockingMode;
use rope_engine::runtime::{RunOptions, DEFAULT_FRAME_MS, DEFAULT_MAX_FRAMES};

#[derive(Parser, Debug)]
#[command(
    about = "Runs a maze scenario's programs headlessly and reports where the character ends up",
    version
)]
pub struct Args {
    /// Path to the scenario JSON (maze layers, start cell, programs)
    #[arg(long)]
    pub scenario: PathBuf,

    /// Simulated frame length in milliseconds
    #[arg(long, default_value_t = DEFAULT_FRAME_MS)]
    pub frame_ms: u64,

    /// Give up after this many frames if the run is still active
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
    pub max_frames: u64,

    /// Override the scenario's blocking rule
    #[arg(long, value_enum)]
    pub blocking: Option<BlockingArg>,

    /// Path to write the engine event log (summary plus timed events) as JSON
    #[arg(long)]
    pub event_log_json: Option<PathBuf>,

    /// Path to write the audio cue log as JSON
    #[arg(long)]
    pub audio_log_json: Option<PathBuf>,

    /// Path to write the character body log (animations, motion, tint) as JSON
    #[arg(long)]
    pub body_log_json: Option<PathBuf>,

    /// Print every engine event as it was recorded
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BlockingArg {
    ObstaclesOnly,
    NoRevisit,
}

impl From<BlockingArg> for BlockingMode {
    fn from(arg: BlockingArg) -> Self {
        match arg {
            BlockingArg::ObstaclesOnly => BlockingMode::ObstaclesOnly,
            BlockingArg::NoRevisit => BlockingMode::NoRevisit,
        }
    }
}

pub fn parse() -> Result<RunOptions> {
    let args = Args::parse();
    args.into_options()
}

impl Args {
    fn into_options(self) -> Result<RunOptions> {
        if self.frame_ms == 0 {
            bail!("--frame-ms must be at least 1");
        }
        if self.max_frames == 0 {
            bail!("--max-frames must be at least 1");
        }

        Ok(RunOptions {
            scenario: self.scenario,
            frame_ms: self.frame_ms,
            max_frames: self.max_frames,
            blocking: self.blocking.map(BlockingMode::from),
            event_log_json: self.event_log_json,
            audio_log_json: self.audio_log_json,
            body_log_json: self.body_log_json,
            verbose: self.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(args: &[&str]) -> Result<RunOptions> {
        Args::try_parse_from(std::iter::once("rope_engine").chain(args.iter().copied()))?
            .into_options()
    }

    #[test]
    fn defaults_fill_frame_settings() {
        let options = parse_from(&["--scenario", "maze.json"]).unwrap();
        assert_eq!(options.scenario, PathBuf::from("maze.json"));
        assert_eq!(options.frame_ms, DEFAULT_FRAME_MS);
        assert_eq!(options.max_frames, DEFAULT_MAX_FRAMES);
        assert_eq!(options.blocking, None);
        assert!(!options.verbose);
    }

    #[test]
    fn blocking_override_maps_to_mode() {
        let options =
            parse_from(&["--scenario", "maze.json", "--blocking", "no-revisit"]).unwrap();
        assert_eq!(options.blocking, Some(BlockingMode::NoRevisit));
    }

    #[test]
    fn zero_frame_settings_are_rejected() {
        assert!(parse_from(&["--scenario", "maze.json", "--frame-ms", "0"]).is_err());
        assert!(parse_from(&["--scenario", "maze.json", "--max-frames", "0"]).is_err());
    }
}
