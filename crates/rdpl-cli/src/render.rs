use std::io::{self, IsTerminal};
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use rdpl_core::{Backup, BackupSet};
use rdpl_service::{InstallOutcome, RemoveOutcome, ServiceState};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

/// Spinner shown while waiting on the service manager. Inert in plain mode.
pub(crate) struct WaitIndicator {
    style: OutputStyle,
    label: String,
    spinner: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_wait(self, label: &str) -> WaitIndicator {
        let spinner = if self.style == OutputStyle::Rich {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}")
            {
                spinner.set_style(style.tick_chars("\\|/- "));
            }
            spinner.set_message(label.to_string());
            spinner.enable_steady_tick(Duration::from_millis(80));
            Some(spinner)
        } else {
            None
        };

        WaitIndicator {
            style: self.style,
            label: label.to_string(),
            spinner,
            started_at: Instant::now(),
        }
    }
}

impl WaitIndicator {
    pub(crate) fn finish_success(mut self) {
        let Some(spinner) = self.spinner.take() else {
            return;
        };
        spinner.finish_and_clear();
        println!(
            "{} complete in {}",
            colorize_for(self.style, label_style(), &self.label),
            format_elapsed(self.started_at.elapsed())
        );
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool, no_color: bool) -> OutputStyle {
    if stdout_is_tty && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty()),
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    match status {
        "ok" => "OK".to_string(),
        "warn" => "WARN".to_string(),
        "error" => "ERR".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

pub(crate) fn format_install_outcome_lines(
    name: &str,
    outcome: &InstallOutcome,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!(
            "installed service {name} ({})",
            outcome.executable.display()
        ),
    )];
    lines.push(render_status_line(
        style,
        "info",
        &format!("backed up {} registry entries", outcome.backups),
    ));
    if outcome.started {
        lines.push(render_status_line(style, "ok", &format!("started service {name}")));
    }
    lines.extend(
        outcome
            .warnings
            .iter()
            .map(|warning| render_status_line(style, "warn", warning)),
    );
    lines
}

pub(crate) fn format_remove_outcome_lines(
    name: &str,
    outcome: &RemoveOutcome,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!("removed service {name}"),
    )];
    lines.extend(
        outcome
            .warnings
            .iter()
            .map(|warning| render_status_line(style, "warn", warning)),
    );
    lines
}

pub(crate) fn format_status_line(name: &str, state: ServiceState, style: OutputStyle) -> String {
    let status = match state {
        ServiceState::Running => "ok",
        ServiceState::NotInstalled | ServiceState::Stopped => "info",
        _ => "warn",
    };
    render_status_line(style, status, &format!("{name}: {state}"))
}

pub(crate) fn format_backup_lines(backups: &BackupSet, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::with_capacity(backups.len() + 1);
    if style == OutputStyle::Rich {
        lines.push(colorize(section_style(), "== Registry backups =="));
    }
    if backups.is_empty() {
        lines.push("no registry entries were backed up".to_string());
        return lines;
    }
    lines.extend(
        backups
            .iter()
            .enumerate()
            .map(|(index, backup)| format_backup_line(index + 1, backup)),
    );
    lines
}

fn format_backup_line(index: usize, backup: &Backup) -> String {
    let value_name = if backup.value_name.is_empty() {
        "(key)"
    } else {
        backup.value_name.as_str()
    };
    let original = backup
        .original_value
        .as_ref()
        .map_or_else(|| "<none>".to_string(), ToString::to_string);
    format!(
        "{index}. {}\\{} {value_name} existed={} original={original} type={}",
        backup.hive, backup.key_path, backup.existed, backup.value_type
    )
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn colorize_for(output: OutputStyle, style: Style, text: &str) -> String {
    match output {
        OutputStyle::Plain => text.to_string(),
        OutputStyle::Rich => colorize(style, text),
    }
}
