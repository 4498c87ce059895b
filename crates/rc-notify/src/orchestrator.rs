use std::io::Write;

use crate::message::{Emoji, Request};
use crate::runner::{CommandOutput, CommandRunner, CommandStatus};
use crate::sink::{DeliveryError, Notifier};

/// Process exit codes of the command wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    CommandFailed,
    DeliveryFailed,
    DaemonizeFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::CommandFailed => 1,
            ExitCode::DeliveryFailed => 2,
            ExitCode::DaemonizeFailed => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    /// Don't notify when the command succeeds
    pub skip_successful: bool,
    /// Echo the full output to the console as well
    pub print_console: bool,
    /// Lines of output kept in the notification; zero or negative keeps all
    pub max_lines: i64,
}

#[derive(Debug)]
pub enum Notification {
    Skipped,
    Delivered,
    Failed(DeliveryError),
}

#[derive(Debug)]
pub struct WrapReport {
    pub command: CommandOutput,
    pub notification: Notification,
}

impl WrapReport {
    /// Delivery failures take precedence over the command's own failure.
    pub fn exit_code(&self) -> ExitCode {
        match (&self.notification, self.command.success()) {
            (Notification::Failed(_), _) => ExitCode::DeliveryFailed,
            (_, false) => ExitCode::CommandFailed,
            (_, true) => ExitCode::Success,
        }
    }
}

/// Keep the first `max_lines` lines of `text` (all of them when `max_lines <= 0`).
pub fn truncate_lines(text: &str, max_lines: i64) -> String {
    let limit = if max_lines > 0 {
        usize::try_from(max_lines).unwrap_or(usize::MAX)
    } else {
        usize::MAX
    };
    text.lines()
        .take(limit)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end_matches('\n')
        .to_string()
}

/// Build the notification for a finished command, or `None` when a
/// successful run should stay quiet.
pub fn compose(
    template: &Request,
    argv: &[String],
    result: &CommandOutput,
    opts: &WrapOptions,
) -> Option<Request> {
    let mut body = truncate_lines(&result.output, opts.max_lines);
    let (verdict, emoji) = match &result.status {
        CommandStatus::Success if opts.skip_successful => return None,
        CommandStatus::Success => ("successful", Emoji::Info),
        CommandStatus::Failed(reason) => {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(reason);
            ("failed", Emoji::Warning)
        }
    };

    Some(Request {
        message: format!("Command `{}` {verdict}:\n```{body}```", argv.join(" ")),
        emoji: emoji.into(),
        ..template.clone()
    })
}

/// Run `argv`, echo its output if asked to, and report the outcome.
pub async fn run_wrapped<W: Write>(
    runner: &dyn CommandRunner,
    notifier: &dyn Notifier,
    template: &Request,
    argv: &[String],
    opts: &WrapOptions,
    console: &mut W,
) -> WrapReport {
    let result = runner.run(argv).await;

    if opts.print_console {
        if let Err(err) = echo(console, &result) {
            tracing::warn!(error = %err, "failed to echo command output");
        }
    }

    let notification = match compose(template, argv, &result, opts) {
        None => {
            tracing::debug!("command succeeded, notification skipped");
            Notification::Skipped
        }
        Some(request) => match notifier.notify(request).await {
            Ok(()) => Notification::Delivered,
            Err(err) => Notification::Failed(err),
        },
    };

    WrapReport {
        command: result,
        notification,
    }
}

fn echo<W: Write>(console: &mut W, result: &CommandOutput) -> std::io::Result<()> {
    console.write_all(result.output.as_bytes())?;
    if !result.output.is_empty() && !result.output.ends_with('\n') {
        writeln!(console)?;
    }
    if let CommandStatus::Failed(reason) = &result.status {
        writeln!(console, "{reason}")?;
    }
    console.flush()
}
