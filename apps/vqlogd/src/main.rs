use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vqlog_kernel::PlayerBuilder;
use vqlog_policy::ClassificationPolicy;
use vqlog_protocol::{ElementEvent, MediaType, RawEvent, ReadyState, RequestEvent};
use vqlog_sim::{ScriptedElement, ScriptedEngine};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "vqlogd")]
#[command(about = "vqlog scripted playback daemon")]
struct Cli {
    #[arg(long, default_value = ".vqlog")]
    root: PathBuf,
    #[arg(long, default_value = "https://cdn.example/bbb/manifest.mpd")]
    url: String,
    #[arg(long)]
    autoplay: bool,
    #[arg(long)]
    autosave: bool,
    /// Playback steps to simulate.
    #[arg(long, default_value_t = 60)]
    ticks: u32,
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// JSON classification policy; defaults to the dash.js lists.
    #[arg(long)]
    policy: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn load_policy(path: Option<&Path>) -> Result<ClassificationPolicy> {
    let Some(path) = path else {
        return Ok(ClassificationPolicy::dashjs());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed reading policy {path:?}"))?;
    let policy: ClassificationPolicy =
        serde_json::from_str(&raw).with_context(|| format!("failed parsing policy {path:?}"))?;
    policy.validate()?;
    Ok(policy)
}

fn scripted_engine() -> ScriptedEngine {
    let engine = ScriptedEngine::dashjs();
    engine.set_manifest(json!({
        "type": "static",
        "mediaPresentationDuration": "PT10M34S",
        "periods": [{ "id": "period-0" }],
    }));
    engine.set_video_representations(&[
        ("rep-360p", 800_000, Some(24.0)),
        ("rep-720p", 1_500_000, Some(30.0)),
        ("rep-1080p", 3_500_000, Some(60.0)),
    ]);
    engine
}

/// One simulated step of playback at `tick` (0-based).
fn play_step(engine: &ScriptedEngine, element: &ScriptedElement, tick: u32, tick_ms: u64) {
    let seconds = f64::from(tick) * tick_ms as f64 / 1000.0;
    element.set_current_time(seconds);
    element.set_decoded_byte_count(u64::from(tick) * 48_000);
    element.dispatch(ElementEvent::TimeUpdate);

    // buffer fills in half-second steps and drains on the stall
    let video_level = (f64::from(tick / 5) * 0.5).min(12.0);
    let level = if tick % 40 == 39 { 0.0 } else { video_level };
    engine.set_buffer_level(MediaType::Video, level);
    engine.set_buffer_level(MediaType::Audio, (level - 0.5).max(0.0));

    match tick {
        2 => engine.switch_representation("rep-360p"),
        15 => engine.switch_representation("rep-720p"),
        35 => engine.switch_representation("rep-1080p"),
        _ => {}
    }

    if tick % 10 == 0 {
        let url = format!("https://cdn.example/bbb/video/seg-{}.m4s", tick / 10);
        engine.request(RequestEvent::Started { url: url.clone() });
        engine.request(RequestEvent::Completed {
            url,
            byte_length: 480_000,
        });
    }
    if tick % 40 == 39 {
        element.dispatch(ElementEvent::Stalled);
        engine.emit(
            "bufferStalled",
            RawEvent::new().with("mediaType", "video").with("bufferLevel", 0.0),
        );
    }
    if tick == 20 {
        engine.emit(
            "qualityChangeRendered",
            RawEvent::new()
                .with("type", "qualityChangeRendered")
                .with("mediaType", "video"),
        );
    }
    engine.emit(
        "playbackTimeUpdated",
        RawEvent::new()
            .with("time", seconds)
            .with("timeToEnd", 634.0 - seconds)
            .with("streamId", "period-0"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let policy = load_policy(cli.policy.as_deref()).await?;
    let engine = Arc::new(scripted_engine());
    let element = Arc::new(ScriptedElement::new());
    element.set_ready_state(ReadyState::HaveMetadata);

    let player = PlayerBuilder::new(&cli.root, cli.url.clone())
        .autoplay(cli.autoplay)
        .autosave(cli.autosave)
        .policy(policy)
        .build(engine.clone(), element.clone());

    let mut records = player.subscribe_records();
    let record_task = tokio::spawn(async move {
        while let Ok(record) = records.recv().await {
            let rendered = serde_json::to_string(&record.event).unwrap_or_else(|_| "{}".to_owned());
            info!(sequence = record.sequence, event = %rendered, "qlog.recorded");
        }
    });

    player.setup().await?;
    if let Some(table) = player.classification() {
        let unclassified: Vec<_> = table.unclassified().map(|id| id.as_str()).collect();
        info!(
            identifiers = table.len(),
            unclassified = unclassified.len(),
            "classification ready"
        );
    }

    player.start_logging().await?;
    engine.set_active_stream("period-0", 0);
    element.set_ready_state(ReadyState::HaveEnoughData);
    element.dispatch(ElementEvent::CanPlay);
    element.dispatch(ElementEvent::Play);

    let tick = Duration::from_millis(cli.tick_ms.max(1));
    for step in 0..cli.ticks {
        play_step(&engine, &element, step, cli.tick_ms);
        if step == cli.ticks / 2 {
            element.set_volume(0.5);
            element.dispatch(ElementEvent::VolumeChange);
        }
        tokio::time::sleep(tick).await;
    }

    engine.emit("playbackEnded", RawEvent::new());
    tokio::time::sleep(Duration::from_millis(200)).await;
    if !cli.autosave {
        player.download_current_log().await?;
    }
    info!(
        state = %player.state(),
        log = %player.log_path().display(),
        exports = %player.exports_dir().display(),
        "playback finished"
    );

    record_task.abort();
    if let Err(error) = record_task.await
        && !error.is_cancelled()
    {
        warn!(%error, "record task stopped");
    }

    Ok(())
}
