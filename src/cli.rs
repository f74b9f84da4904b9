//! Command line
//!
//! finder takes a single optional word. Anything containing `-d` (`-d`,
//! `-daemon`, `--detach`, ...) runs it in the background.

use clap::Parser;
use finder_core::FinderConfig;

#[derive(Parser, Debug)]
#[command(name = "finder")]
#[command(about = "Hold Pause to draw lines converging on the mouse pointer")]
#[command(version)]
pub struct Cli {
    /// Pass `-d` to detach from the terminal and run as a daemon
    #[arg(allow_hyphen_values = true, value_name = "MODE")]
    mode: Option<String>,
}

impl Cli {
    pub fn daemonize(&self) -> bool {
        self.mode.as_deref().is_some_and(|mode| mode.contains("-d"))
    }

    /// Compiled-in defaults plus whatever the command line chose
    pub fn config(&self) -> FinderConfig {
        FinderConfig {
            daemonize: self.daemonize(),
            ..FinderConfig::default()
        }
    }
}
