use std::cell::Cell;
use std::io::Write;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Controls how step output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinners, log lines cleared on completion.
    Normal,
    /// Like Normal but keeps log lines after step completion.
    Verbose,
    /// Nothing but the final result.
    Quiet,
    /// No ANSI, plain println output (for piped/non-TTY).
    Plain,
}

/// Numbered `[n/N]` steps with spinners and checkmarks.
pub struct StepProgress {
    multi: MultiProgress,
    total_steps: usize,
    current_step: usize,
    mode: OutputMode,
}

/// A step in flight. Call [`Step::finish`] on success; a step dropped
/// unfinished is shown as failed.
pub struct Step {
    bar: ProgressBar,
    multi: MultiProgress,
    prefix: String,
    label: String,
    mode: OutputMode,
    ticks: Cell<u32>,
    finished: bool,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2713} {msg:.green}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2717} {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl StepProgress {
    pub fn new(total_steps: usize, mode: OutputMode) -> Self {
        let multi = match mode {
            OutputMode::Plain | OutputMode::Quiet => {
                MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
            }
            OutputMode::Normal | OutputMode::Verbose => MultiProgress::new(),
        };
        Self {
            multi,
            total_steps,
            current_step: 0,
            mode,
        }
    }

    /// Start the next numbered step.
    pub fn begin(&mut self, label: &str) -> Step {
        self.current_step += 1;
        let prefix = format!("{}/{}", self.current_step, self.total_steps);

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] {label}");
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_prefix(prefix.clone());
        bar.set_message(label.to_string());
        if matches!(self.mode, OutputMode::Normal | OutputMode::Verbose) {
            bar.enable_steady_tick(Duration::from_millis(80));
        }

        Step {
            bar,
            multi: self.multi.clone(),
            prefix,
            label: label.to_string(),
            mode: self.mode,
            ticks: Cell::new(0),
            finished: false,
        }
    }
}

impl Step {
    /// Add a detail line under this step.
    pub fn log(&self, line: &str) {
        match self.mode {
            OutputMode::Quiet => {}
            OutputMode::Plain => println!("        {line}"),
            OutputMode::Normal | OutputMode::Verbose => {
                self.multi.println(format!("        {line}")).ok();
            }
        }
    }

    /// Record one more unsuccessful attempt of a polling step.
    pub fn tick(&self) {
        let ticks = self.ticks.get() + 1;
        self.ticks.set(ticks);
        match self.mode {
            OutputMode::Plain => {
                print!(".");
                std::io::stdout().flush().ok();
            }
            OutputMode::Quiet => {}
            OutputMode::Normal | OutputMode::Verbose => {
                self.bar
                    .set_message(format!("{} ({ticks} attempts)", self.label));
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.ticks.get()
    }

    pub fn finish(mut self, done_label: impl Into<String>) {
        let done_label = done_label.into();
        self.finished = true;

        if self.mode == OutputMode::Plain {
            if self.ticks.get() > 0 {
                println!();
            }
            println!("[{}] \u{2713} {done_label}", self.prefix);
        }

        self.bar.set_style(done_style());
        self.bar.finish_with_message(done_label);
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.mode == OutputMode::Plain {
            if self.ticks.get() > 0 {
                println!();
            }
            println!("[{}] \u{2717} {}", self.prefix, self.label);
        }
        self.bar.set_style(failed_style());
        self.bar.abandon_with_message(self.label.clone());
    }
}
