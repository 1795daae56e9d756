//! Interactive command shell
//!
//! A small prompt in front of the duel and the subprocess supervisor.

mod session;

pub use session::{CommandResult, Shell, ShellCommand, termination_requested};

use eyre::Result;

use crate::config::Config;

/// Run the interactive shell
///
/// `initial` commands run before the first prompt, in order.
pub async fn run_interactive(config: &Config, initial: &[String]) -> Result<()> {
    let mut shell = Shell::new(config.clone());
    shell.run(initial).await
}
