//! CLI Module
//!
//! Command-line control surface: edits the stored snapshot, or runs a
//! simulated page against it.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Audio Expert - effect chain control surface
#[derive(Parser, Debug)]
#[command(name = "audio-expert")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the stored snapshot (overrides the config file)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the stored snapshot
    #[command(name = "show")]
    Show,

    /// Set media volume (0-100)
    #[command(name = "volume")]
    Volume {
        value: f32,
    },

    /// Set a module parameter
    #[command(name = "set")]
    Set {
        /// Module id (gate, eq, compressor, pitchShift, gain, limiter)
        module: String,

        /// Parameter name
        param: String,

        #[arg(allow_negative_numbers = true)]
        value: f32,
    },

    /// Enable or bypass a module ("volume" mutes the media element)
    #[command(name = "toggle")]
    Toggle {
        module: String,

        #[arg(value_enum)]
        state: Switch,
    },

    /// Restore documented defaults
    #[command(name = "reset")]
    Reset,

    /// Run a simulated page with the stored state and print meter readings
    #[command(name = "simulate")]
    Simulate {
        /// Number of meter polls
        #[arg(short, long, default_value_t = 30)]
        ticks: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_negative_value() {
        let cli = Cli::parse_from(["audio-expert", "set", "gate", "threshold", "-40"]);
        match cli.command {
            Commands::Set {
                module,
                param,
                value,
            } => {
                assert_eq!(module, "gate");
                assert_eq!(param, "threshold");
                assert_eq!(value, -40.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_toggle() {
        let cli = Cli::parse_from(["audio-expert", "-v", "toggle", "mono", "on"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Toggle {
                state: Switch::On,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
