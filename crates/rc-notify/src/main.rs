use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tokio::runtime::Runtime;

use rc_notify::cli::{Cli, Commands, Target};
use rc_notify::config::{Config, Profile};
use rc_notify::daemon::{self, Detach};
use rc_notify::logging;
use rc_notify::message::{ApiAuth, FileUploadRequest, Request};
use rc_notify::orchestrator::{run_wrapped, ExitCode, Notification, WrapOptions};
use rc_notify::runner::ShellRunner;
use rc_notify::sink::{RocketChat, Webhook};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Detach before the runtime spawns any threads
    if matches!(cli.command, Commands::Run { background: true, .. }) {
        match daemon::detach() {
            Ok(Detach::Parent) => return Ok(()),
            Ok(Detach::Child) => {}
            Err(err) => exit_with(&err.into(), ExitCode::DaemonizeFailed),
        }
    }

    let rt = match Runtime::new().context("Failed to start async runtime") {
        Ok(rt) => rt,
        Err(err) => exit_with(&err, ExitCode::DeliveryFailed),
    };
    let result = rt.block_on(async {
        let profile = Config::load(cli.config.clone())
            .and_then(|config| config.select(cli.profile.as_deref()));

        match cli.command {
            Commands::Send {
                target,
                channel,
                user,
                alias,
                message,
                emoji,
                code,
            } => {
                let result = async {
                    let profile = profile?;
                    let mut request = Request {
                        channel: channel.or_else(|| profile.channel.clone()).unwrap_or_default(),
                        user: user.or_else(|| profile.user.clone()),
                        alias: alias.or_else(|| profile.alias.clone()),
                        emoji: emoji.or_else(|| profile.emoji.clone()).unwrap_or_default(),
                        message: message.unwrap_or_default(),
                        attachments: Vec::new(),
                    };
                    if code {
                        request = request.wrap_as_code();
                    }

                    let uri = endpoint(&target, &profile)?;
                    client(&target, &profile)?
                        .send(&uri, request)
                        .await
                        .context("Failed to send message")
                }
                .await;
                Ok(outcome(result))
            }
            Commands::Run {
                target,
                channel,
                user,
                background: _,
                skip_successful,
                print_console,
                max_lines,
                command,
            } => {
                let prepared = profile.and_then(|profile| {
                    let template = Request {
                        channel: channel.or_else(|| profile.channel.clone()).unwrap_or_default(),
                        user: user.or_else(|| profile.user.clone()),
                        alias: profile.alias.clone(),
                        ..Default::default()
                    };
                    let webhook = Webhook::new(client(&target, &profile)?, endpoint(&target, &profile)?);
                    Ok((template, webhook))
                });
                let (template, webhook) = match prepared {
                    Ok(prepared) => prepared,
                    Err(err) => exit_with(&err, ExitCode::DeliveryFailed),
                };

                let opts = WrapOptions {
                    skip_successful,
                    print_console,
                    max_lines,
                };
                let report = run_wrapped(
                    &ShellRunner,
                    &webhook,
                    &template,
                    &command,
                    &opts,
                    &mut std::io::stdout(),
                )
                .await;

                let code = report.exit_code();
                if let Notification::Failed(err) = report.notification {
                    let err = anyhow::Error::new(err).context("Failed to send notification");
                    exit_with(&err, code);
                }
                Ok(code)
            }
            Commands::Upload {
                target,
                room,
                file,
                message,
                description,
                user_id,
                token,
            } => {
                let result = async {
                    let profile = profile?;
                    let auth = credentials(user_id, token, &profile)?;
                    let data = tokio::fs::read(&file)
                        .await
                        .with_context(|| format!("Reading upload file {}", file.display()))?;

                    let upload = FileUploadRequest {
                        file_name: file_name(&file),
                        message,
                        description,
                        ..FileUploadRequest::new(room, data)
                    };
                    let uri = endpoint(&target, &profile)?;
                    client(&target, &profile)?
                        .upload_file(&uri, &auth, upload)
                        .await
                        .context("Failed to upload file")
                }
                .await;
                Ok(outcome(result))
            }
            Commands::Version { json } => {
                if json {
                    let info = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "commit": option_env!("GIT_SHA").unwrap_or("unknown"),
                        "build_date": option_env!("BUILD_DATE").unwrap_or("unknown"),
                    });
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    println!(
                        "rc-notify {} (commit: {}, built: {})",
                        env!("CARGO_PKG_VERSION"),
                        option_env!("GIT_SHA").unwrap_or("unknown"),
                        option_env!("BUILD_DATE").unwrap_or("unknown"),
                    );
                }
                Ok::<_, anyhow::Error>(ExitCode::Success)
            }
        }
    });
    let code = match result {
        Ok(code) => code,
        Err(err) => exit_with(&err, ExitCode::DeliveryFailed),
    };

    // Exit code: 0 = ok, 1 = command failed, 2 = delivery failed, 3 = detach failed
    if code != ExitCode::Success {
        std::process::exit(code.code());
    }
    Ok(())
}

fn client(target: &Target, profile: &Profile) -> Result<RocketChat> {
    Ok(RocketChat::new(profile.timeout())?
        .with_protocol(target.protocol.unwrap_or(profile.protocol))
        .with_retry(profile.retry()))
}

fn endpoint(target: &Target, profile: &Profile) -> Result<String> {
    target
        .uri
        .clone()
        .or_else(|| profile.uri.clone())
        .context("No RocketChat URI configured (use --uri, RC_URI or `uri` in a profile)")
}

fn credentials(user_id: Option<String>, token: Option<String>, profile: &Profile) -> Result<ApiAuth> {
    let stored = profile.auth.as_ref();
    Ok(ApiAuth {
        user_id: user_id
            .or_else(|| stored.map(|a| a.user_id.clone()))
            .context("API user id missing (use --user-id, RC_USER_ID or [auth] in a profile)")?,
        token: token
            .or_else(|| stored.map(|a| a.token.clone()))
            .context("API token missing (use --token, RC_AUTH_TOKEN or [auth] in a profile)")?,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string())
}

fn outcome(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::Success,
        Err(err) => exit_with(&err, ExitCode::DeliveryFailed),
    }
}

fn exit_with(err: &anyhow::Error, code: ExitCode) -> ! {
    eprintln!("{} {err:#}", "error:".red().bold());
    std::process::exit(code.code());
}
