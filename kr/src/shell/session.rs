//! Shell session: prompt loop and command dispatch

use std::io::{self, Write};
use std::process::Stdio;

use colored::Colorize;
use eyre::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

use crate::config::Config;
use crate::duel::{DuelCoordinator, DuelOutcome};
use crate::supervisor::Supervisor;

/// What the prompt loop does after a command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    Quit,
}

/// A parsed shell line
#[derive(Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Duel,
    Run(Vec<String>),
    Help,
    Exit,
    Unknown(String),
}

impl ShellCommand {
    /// Parse one input line. Leading dashes are accepted so CLI-style
    /// arguments (`--duel`) work as commands too.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let head = words.next()?.trim_start_matches('-').to_lowercase();
        let command = match head.as_str() {
            "duel" => Self::Duel,
            "run" => {
                let argv: Vec<String> = words.map(str::to_string).collect();
                if argv.is_empty() {
                    Self::Unknown("run (missing program)".to_string())
                } else {
                    Self::Run(argv)
                }
            }
            "help" | "?" => Self::Help,
            "exit" | "quit" | "q" => Self::Exit,
            _ => Self::Unknown(head),
        };
        Some(command)
    }
}

/// Interactive command shell
pub struct Shell {
    config: Config,
    supervisor: Supervisor,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            supervisor: Supervisor::new(),
        }
    }

    /// Run the prompt loop, executing `initial` commands first
    pub async fn run(&mut self, initial: &[String]) -> Result<()> {
        self.print_welcome();

        for line in initial {
            println!("{} {}", "kreps$".magenta(), line);
            if self.execute_line(line).await == CommandResult::Quit {
                return Ok(());
            }
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            match rl.readline(&format!("{} ", "kreps$".magenta())) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);
                    if self.execute_line(input).await == CommandResult::Quit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        self.shutdown();
        println!("Bye");
        Ok(())
    }

    /// Execute one line; failures are printed, never propagated
    pub async fn execute_line(&mut self, line: &str) -> CommandResult {
        let Some(command) = ShellCommand::parse(line) else {
            return CommandResult::Continue;
        };
        debug!(?command, "Shell::execute_line: dispatching");

        let result = match command {
            ShellCommand::Duel => self.cmd_duel().await,
            ShellCommand::Run(argv) => self.cmd_run(&argv).await,
            ShellCommand::Help => {
                self.print_help();
                Ok(())
            }
            ShellCommand::Exit => {
                self.shutdown();
                return CommandResult::Quit;
            }
            ShellCommand::Unknown(name) => {
                println!("{} Unknown command: {}", "?".yellow(), name);
                println!("Type {} for available commands", "help".yellow());
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "Shell command failed");
            eprintln!("{} {:#}", "error:".red().bold(), e);
        }
        CommandResult::Continue
    }

    async fn cmd_duel(&mut self) -> Result<()> {
        let coordinator = DuelCoordinator::new(self.config.duel.clone())?.with_narration(true);
        let report = coordinator.spawn_duel_until(termination_requested()).await?;
        let line = match report.outcome {
            DuelOutcome::Victor => report.message.green(),
            DuelOutcome::Defeated => report.message.red(),
            DuelOutcome::Aborted => report.message.yellow(),
        };
        println!("{}", line);
        Ok(())
    }

    /// Run a program under supervision until it exits
    ///
    /// Ctrl-C pauses it and asks whether to stop it for good.
    async fn cmd_run(&mut self, argv: &[String]) -> Result<()> {
        let (program, args) = argv.split_first().ok_or_else(|| eyre::eyre!("Nothing to run"))?;
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .context(format!("Failed to start {}", program))?;

        let pid = child.id().ok_or_else(|| eyre::eyre!("{} exited immediately", program))?;
        self.supervisor.attach(pid);
        println!("pid of child is: {}", pid);

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = tokio::signal::ctrl_c() => {
                    self.supervisor.pause()?;
                    println!("{}", "Subprocess paused".dimmed());
                    if ask("Subprocess is running, force stop [y/n]? ")?.eq_ignore_ascii_case("y") {
                        self.supervisor.stop()?;
                    } else {
                        self.supervisor.resume()?;
                        println!("{}", "Subprocess resumed".dimmed());
                    }
                }
            }
        };
        self.supervisor.detach();

        let status = status.context("Failed to wait for subprocess")?;
        println!("{} exited: {}", program, status);
        Ok(())
    }

    /// Stop whatever is still supervised
    fn shutdown(&mut self) {
        if self.supervisor.is_running() {
            if let Err(e) = self.supervisor.stop() {
                warn!(error = %e, "Failed to stop subprocess on exit");
            }
            self.supervisor.detach();
        }
    }

    fn print_welcome(&self) {
        println!("{}", "---------- KREPS ----------".bright_magenta().bold());
        println!("Type {} for help, {} to quit", "help".yellow(), "exit".yellow());
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:14} Fight a duel against a spawned challenger", "duel".yellow());
        println!("  {:14} Run a program under supervision", "run <cmd..>".yellow());
        println!("  {:14} Show this help", "help".yellow());
        println!("  {:14} Exit the shell (also q, Ctrl-D)", "exit".yellow());
        println!();
    }
}

/// Resolves on SIGINT or SIGTERM
pub async fn termination_requested() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to watch SIGTERM, relying on Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => debug!("termination_requested: SIGINT"),
        _ = sigterm.recv() => debug!("termination_requested: SIGTERM"),
    }
}

fn ask(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer).context("Failed to read answer")?;
    Ok(answer.trim().to_string())
}
