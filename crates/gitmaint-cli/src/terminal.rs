//! Interactive operator on the controlling terminal.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::Command;

use gitmaint_core::{Escalation, MaintainError, Operator, SessionExit};
use tracing::warn;

/// Answers prompts from stdin unless a default answer was given, pages logs
/// through `less` and hands conflicts to an interactive `bash`.
pub struct TerminalOperator {
    workdir: PathBuf,
    /// `--yes` / `--no`.
    auto_answer: Option<bool>,
}

impl TerminalOperator {
    pub fn new(workdir: PathBuf, auto_answer: Option<bool>) -> Self {
        Self {
            workdir,
            auto_answer,
        }
    }
}

/// `Some(answer)` for a recognised reply; an empty line means no.
pub fn parse_reply(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" | "" => Some(false),
        _ => None,
    }
}

impl Operator for TerminalOperator {
    fn confirm(&self, question: &str) -> bool {
        println!("{question} ? (y/N): ");
        if let Some(answer) = self.auto_answer {
            let word = if answer { "yes" } else { "no" };
            println!("Auto-replying {word} due to --{word} option");
            return answer;
        }

        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            // EOF or a read error counts as no.
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            if let Some(answer) = parse_reply(&line) {
                return answer;
            }
            println!("{question} ? (y/N): ");
        }
    }

    fn show_range(&self, title: &str, lines: &[String]) {
        println!("# {title}");
        for line in lines {
            println!("{line}");
        }
    }

    fn show_log(&self, log: &str) -> gitmaint_core::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(log.as_bytes())?;
        file.flush()?;
        match Command::new("less").arg("-r").arg(file.path()).status() {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "pager unavailable, printing log");
                print!("{log}");
                Ok(())
            }
        }
    }

    fn report(&self, line: &str) {
        println!("{line}");
    }

    fn escalate(&self, escalation: &Escalation) -> gitmaint_core::Result<SessionExit> {
        println!("{}", escalation.summary());
        println!("Starting bash for manual fixes. Exit shell to continue");
        let status = Command::new("bash")
            .current_dir(&self.workdir)
            .status()
            .map_err(MaintainError::Io)?;
        Ok(if status.success() {
            SessionExit::Resume
        } else {
            SessionExit::Abort
        })
    }
}
