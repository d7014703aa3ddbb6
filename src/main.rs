//! Rightsizer - 云主机规格优化流水线
//!
//! 入口：加载配置与清单，启动流水线，把事件逐行以 JSON 写到 stdout；
//! stdin 每行一个 JSON 命令（re-evaluate / export / quit）。日志写 stderr。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rightsizer::cloud::InventoryCloud;
use rightsizer::config::load_config;
use rightsizer::core::{ShutdownManager, ShutdownReason};
use rightsizer::observability;
use rightsizer::pipeline::{Collaborators, Pipeline, PipelineSettings, PreferenceItem};
use rightsizer::recommendation::create_recommender_from_config;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// stdin 命令
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
enum Command {
    /// 不带 preferences 时沿用资源当前的偏好
    ReEvaluate {
        id: String,
        #[serde(default)]
        preferences: Option<Vec<PreferenceItem>>,
    },
    Export,
    Quit,
}

#[derive(Serialize)]
struct ExportOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a [Vec<String>],
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let line = serde_json::to_string(value).context("Failed to encode output")?;
    println!("{}", line);
    Ok(())
}

async fn handle_command(pipeline: &Pipeline, line: &str) -> anyhow::Result<bool> {
    let command: Command = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("Ignoring invalid command {:?}: {}", line, e);
            return Ok(true);
        }
    };

    match command {
        Command::ReEvaluate { id, preferences } => {
            let preferences = match preferences {
                Some(p) => p,
                None => match pipeline.store().get(&id).await {
                    Some(snapshot) => snapshot.preferences,
                    None => {
                        tracing::warn!("Cannot re-evaluate unknown resource {}", id);
                        return Ok(true);
                    }
                },
            };
            if let Err(e) = pipeline.re_evaluate(&id, preferences).await {
                tracing::warn!("Re-evaluation of {} rejected: {}", id, e);
            }
        }
        Command::Export => {
            let rows = pipeline.export_all().await;
            emit(&ExportOutput {
                kind: "export",
                data: &rows,
            })?;
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let inventory_path = cfg
        .app
        .inventory_path
        .clone()
        .context("app.inventory_path is not set")?;
    let cloud = Arc::new(
        InventoryCloud::from_path(&inventory_path).context("Failed to load inventory")?,
    );
    let project_id = cfg
        .app
        .project_id
        .clone()
        .unwrap_or_else(|| cloud.project_id().to_string());

    let collaborators = Collaborators {
        lister: cloud.clone(),
        disks: cloud.clone(),
        metrics: cloud,
        recommender: create_recommender_from_config(&cfg),
    };

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let token = shutdown.token();

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        project_id,
        collaborators,
        PipelineSettings::from_config(&cfg),
        token.clone(),
        events_tx,
    );
    let dispatcher = pipeline.start().context("Pipeline already started")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    // stdin 关闭后等队列真正空闲再退出：re-evaluate 推入的任务会让它重新变忙
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                emit(&event)?;
                if !stdin_open && pipeline.is_idle() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if !handle_command(&pipeline, line.trim()).await? {
                            shutdown.shutdown(ShutdownReason::UserInitiated);
                            break;
                        }
                    }
                    None => {
                        stdin_open = false;
                        if pipeline.is_idle() {
                            break;
                        }
                    }
                }
            }
        }
    }

    shutdown.shutdown(ShutdownReason::Completed);
    let _ = dispatcher.await;
    while let Ok(event) = events_rx.try_recv() {
        emit(&event)?;
    }

    let stats = pipeline.stats();
    tracing::info!(
        "Pipeline stopped ({}): {} tasks pushed, {} succeeded, {} failed, {} retries",
        shutdown.reason().unwrap_or(ShutdownReason::Completed),
        stats.pushed,
        stats.succeeded,
        stats.failed,
        stats.retried
    );
    Ok(())
}
