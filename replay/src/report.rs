//! Replay report: per-exchange verdicts grouped by command, a tally of the
//! outcomes the session produced, and the live calibration summary.

use std::collections::BTreeMap;

use colored::Colorize;

use spectro_link::commands::Command;

/// What the session made of one exchange, checked against the capture.
pub struct ExchangeVerdict {
    pub name: String,
    pub command: Command,
    /// `info`, `scan`, a failure kind, or `not issued`
    pub outcome: String,
    /// Why the outcome differs from the capture's expectation
    pub mismatch: Option<String>,
}

impl ExchangeVerdict {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Print the verdict after the exchange name.
    pub fn print_inline(&self) {
        match &self.mismatch {
            None => println!("{} ({})", "PASS".green().bold(), self.outcome),
            Some(mismatch) => {
                println!("{} ({})", "FAIL".red().bold(), self.outcome);
                println!("    {}", mismatch.red());
            }
        }
    }
}

/// Outcomes of live calibration requests.
pub struct CalibrationTally {
    /// Scans handed to the calibration service
    pub dispatched: usize,
    pub calibrated: usize,
    pub failures: Vec<String>,
    /// Spectra held in the history afterwards
    pub history_len: usize,
}

impl CalibrationTally {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.calibrated == self.dispatched
    }
}

/// Everything a replay run produced.
pub struct ReplayReport {
    pub exchanges: Vec<ExchangeVerdict>,
    pub calibration: Option<CalibrationTally>,
}

impl ReplayReport {
    /// Number of failed checks, calibration included.
    pub fn failed(&self) -> usize {
        let exchanges = self.exchanges.iter().filter(|v| !v.passed()).count();
        let calibration = self.calibration.as_ref().is_some_and(|t| !t.passed());
        exchanges + usize::from(calibration)
    }

    /// How often each outcome occurred.
    pub fn outcome_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for verdict in &self.exchanges {
            *counts.entry(verdict.outcome.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn print(&self) {
        println!("\n{}", "=".repeat(60));
        println!("{}", "Replay Summary".bold());
        println!("{}", "=".repeat(60));

        for command in [Command::Scan, Command::Info] {
            let verdicts: Vec<_> = self
                .exchanges
                .iter()
                .filter(|v| v.command == command)
                .collect();
            if verdicts.is_empty() {
                continue;
            }

            let passed = verdicts.iter().filter(|v| v.passed()).count();
            println!("  {} ({}/{} as expected)", command.to_string().bold(), passed, verdicts.len());
            for verdict in verdicts {
                let mark = if verdict.passed() {
                    "[PASS]".green().bold()
                } else {
                    "[FAIL]".red().bold()
                };
                println!("    {} {} -> {}", mark, verdict.name, verdict.outcome);
            }
        }

        let counts: Vec<String> = self
            .outcome_counts()
            .iter()
            .map(|(outcome, n)| format!("{outcome} x{n}"))
            .collect();
        println!("{}", "-".repeat(60));
        println!("  Outcomes: {}", counts.join(", "));

        if let Some(tally) = &self.calibration {
            let line = format!(
                "  Calibration: {}/{} calibrated, {} in history",
                tally.calibrated, tally.dispatched, tally.history_len
            );
            if tally.passed() {
                println!("{}", line.green());
            } else {
                println!("{}", line.red());
                for failure in &tally.failures {
                    println!("    {}", failure.red());
                }
            }
        }

        let failed = self.failed();
        let verdict = if failed == 0 {
            "all checks passed".green().bold()
        } else {
            format!("{failed} checks failed").red().bold()
        };
        println!("  {}", verdict);
        println!("{}", "=".repeat(60));
    }
}
