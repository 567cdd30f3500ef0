mod core;
mod i18n;
mod plugins;

use crate::core::bootstrap::ManifestBootstrap;
use crate::core::events::LauncherEvent;
use crate::core::launcher::Launcher;
use crate::core::model::{BootStatus, LauncherConfig, LoadPhase, LoadStage};
use crate::i18n::{get_messages, Locale, Messages};
use crate::plugins::registry::{FetchContext, FetchServiceRegistry, LaunchCliConfig, SourceSpec};
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;

fn build_cli(registry: &FetchServiceRegistry) -> Command {
    let launch = Command::new("launch")
        .about("Fetch hot-update bundles and run the bootstrap sequence")
        .arg(
            Arg::new("source")
                .help("Bundle source: base URL or local directory")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Launcher manifest (JSON)")
                .default_value("launcher.json")
                .num_args(1),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("Message locale (en, zh)")
                .default_value("en")
                .num_args(1),
        );

    let launch = registry.augment_launch_command(launch);

    Command::new("hotload")
        .about("Hot-update module launcher - fetch, retry, bootstrap")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(launch)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = FetchServiceRegistry::with_defaults();
    let app = build_cli(&registry);
    let matches = app.get_matches();

    match matches.subcommand() {
        Some(("launch", m)) => {
            let locale = Locale::from_str(m.get_one::<String>("locale").unwrap());
            let msgs = get_messages(locale);

            let config_path = m.get_one::<String>("config").unwrap();
            let raw = tokio::fs::read_to_string(config_path).await?;
            let config = LauncherConfig::from_json(&raw)?;

            let mut cli_cfg = LaunchCliConfig {
                fetch_ctx: FetchContext::default(),
            };
            registry.apply_launch_matches(m, &mut cli_cfg)?;

            let source = SourceSpec::new(m.get_one::<String>("source").unwrap().clone());
            let service = registry
                .best_service(&source)
                .ok_or_else(|| anyhow::anyhow!("no fetch service for source: {}", source.raw))?;

            let launcher = Launcher::new(
                config,
                service,
                source,
                cli_cfg.fetch_ctx,
                Arc::new(ManifestBootstrap),
            );

            let rx = launcher.subscribe();
            let ui_task = tokio::spawn(run_ui(rx, msgs));

            let boot = launcher.boot().await;
            let _ = ui_task.await;

            let report = boot?;
            println!("{}:", msgs.summary_header);
            println!("- {}: {}", msgs.summary_modules, report.modules);
            println!("- {}: {}", msgs.summary_aot_blobs, report.aot_blobs);
            println!("- {}: {}", msgs.summary_entry_points, report.entry_points);
        }
        _ => {}
    }

    Ok(())
}

async fn run_ui(
    mut rx: tokio::sync::broadcast::Receiver<LauncherEvent>,
    msgs: &'static Messages,
) {
    let mp = MultiProgress::new();
    let sty_spinner = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")
        .unwrap()
        .tick_chars("|/-\\ ");
    let sty_bar = ProgressStyle::with_template(
        "{prefix} {bar:40.cyan/blue} {bytes}/{total_bytes} {wide_msg}",
    )
    .unwrap();

    let bar = mp.add(ProgressBar::new_spinner());
    bar.set_style(sty_spinner.clone());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let stage_label = |stage: LoadStage| match stage {
        LoadStage::HotUpdate => msgs.stage_hot_update,
        LoadStage::AotMetadata => msgs.stage_aot_metadata,
    };

    loop {
        let evt = match rx.recv().await {
            Ok(e) => e,
            Err(_) => break,
        };

        match evt {
            LauncherEvent::BootStatusChanged { boot_id, status } => match status {
                BootStatus::Running => {
                    let _ = mp.println(format!("{} ({})", msgs.boot_started, boot_id));
                }
                BootStatus::Completed => {
                    bar.finish_with_message(msgs.boot_completed.to_string());
                    break;
                }
                BootStatus::Failed => {
                    bar.abandon_with_message(msgs.boot_failed.to_string());
                    break;
                }
            },
            LauncherEvent::StageStarted { stage, keys } => {
                bar.set_style(sty_spinner.clone());
                bar.set_prefix(format!("[{}]", stage_label(stage)));
                bar.set_message(format!("{} keys", keys));
            }
            LauncherEvent::Progress { status, .. } => {
                if status.total_bytes > 0 {
                    if bar.length().unwrap_or(0) != status.total_bytes {
                        bar.set_style(sty_bar.clone());
                        bar.set_length(status.total_bytes);
                    }
                    bar.set_position(status.downloaded_bytes);
                }
                let phase = match status.phase {
                    LoadPhase::Loading => msgs.phase_loading,
                    LoadPhase::WaitingRetry => msgs.phase_waiting_retry,
                    _ => "",
                };
                if !phase.is_empty() {
                    bar.set_message(format!(
                        "{} | {} / {}",
                        phase,
                        fmt_bytes(status.downloaded_bytes),
                        if status.total_bytes > 0 {
                            fmt_bytes(status.total_bytes)
                        } else {
                            "?".to_string()
                        }
                    ));
                }
            }
            LauncherEvent::PhaseChanged { .. } => {}
            LauncherEvent::AttemptFailed { stage, attempt, max_attempts, message } => {
                let _ = mp.println(format!(
                    "[{}] {} {}: {} ({}/{})",
                    msgs.error_prefix,
                    stage_label(stage),
                    msgs.attempt_failed,
                    message,
                    attempt,
                    max_attempts,
                ));
            }
            LauncherEvent::StageFinished { .. } => {}
            LauncherEvent::EntryPointInvoked { name } => {
                let _ = mp.println(format!("[{}] {}: {}", msgs.info_prefix, msgs.entry_point, name));
            }
            LauncherEvent::Error { scope, message } => {
                let _ = mp.println(format!("[{}] {}: {}", msgs.error_prefix, scope, message));
            }
            LauncherEvent::Info { scope, message } => {
                let _ = mp.println(format!("[{}] {}: {}", msgs.info_prefix, scope, message));
            }
        }
    }
}

fn fmt_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let f = n as f64;
    if f >= GB {
        format!("{:.2}GiB", f / GB)
    } else if f >= MB {
        format!("{:.2}MiB", f / MB)
    } else if f >= KB {
        format!("{:.2}KiB", f / KB)
    } else {
        format!("{}B", n)
    }
}
