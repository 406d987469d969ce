//! zone_guard - restricted-zone breach monitor daemon
//!
//! This daemon:
//! 1. Loads the zone, the monitored categories and the alert settings
//! 2. Starts a monitoring session
//! 3. Polls the detector against camera frames until Ctrl-C or `--seconds` elapse
//! 4. Stops the session and prints a summary

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use zone_guard::detect::{ScriptedBackend, StubBackend, SyntheticBackend};
use zone_guard::notify::request_notifications;
use zone_guard::state::{lock, SUPPORTED_ANIMALS};
use zone_guard::{
    AlertManager, AudioLibrary, BackendRegistry, CommandPlayer, GuardConfig, LogNotifier,
    MonitorRunner, MonitoringAction, Session, SyntheticCamera, Zone,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "ZONE_GUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Restricted zone in display pixels: x,y,width,height.
    #[arg(long)]
    zone: Option<String>,
    /// Categories to monitor (comma separated).
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,
    /// Detector backend: synthetic, scripted or stub.
    #[arg(long)]
    backend: Option<String>,
    /// JSON-lines detection script for the scripted backend.
    #[arg(long)]
    script: Option<PathBuf>,
    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    seconds: Option<u64>,
    /// Seed for the synthetic backend.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = GuardConfig::load_from(args.config.as_deref())?;
    if let Some(zone) = args.zone.as_deref() {
        cfg.zone = Some(Zone::parse_csv(zone)?);
    }
    if !args.select.is_empty() {
        cfg.selected = args.select.clone();
    }
    if let Some(backend) = args.backend {
        cfg.backend = backend;
    }
    if let Some(script) = args.script {
        cfg.script_path = Some(script);
    }
    cfg.validate()?;

    let session = Session::new_handle();
    {
        let mut s = lock(&session)?;
        s.dispatch(MonitoringAction::SetCooldown(cfg.cooldown_seconds))?;
        s.dispatch(MonitoringAction::SetZone(cfg.zone))?;
        s.dispatch(MonitoringAction::SetSelectedAnimals(cfg.selected.clone()))?;
    }

    let audio = AudioLibrary::new();
    if let Some(path) = cfg.audio_path.as_deref() {
        match audio.load(path) {
            Ok(clip) => {
                log::info!("alert sound: {} ({} bytes)", clip.name(), clip.size_bytes());
                lock(&session)?.dispatch(MonitoringAction::SetAudio(Some(clip)))?;
            }
            Err(e) => log::warn!("alert sound not loaded: {:#}", e),
        }
    }
    if cfg.notifications {
        if let Err(e) = request_notifications(&session, &mut LogNotifier::new()) {
            log::warn!("continuing without notifications: {:#}", e);
        }
    }

    let classes: Vec<String> = if cfg.selected.is_empty() {
        SUPPORTED_ANIMALS.iter().map(|s| s.to_string()).collect()
    } else {
        cfg.selected.clone()
    };
    let mut registry = BackendRegistry::new();
    registry.register(SyntheticBackend::new(
        args.seed.unwrap_or_else(rand::random),
        classes,
    ));
    registry.register(StubBackend::default());
    if let Some(path) = cfg.script_path.as_deref() {
        registry.register(ScriptedBackend::from_path(path)?.repeating(true));
    }
    let backend = registry.select(&cfg.backend)?;

    lock(&session)?
        .dispatch(MonitoringAction::SetMonitoring(true))
        .context("monitoring not started")?;
    log::info!(
        "monitoring started: zone={:?} categories={:?} backend={} camera={}x{}@{}fps",
        cfg.zone,
        cfg.selected,
        cfg.backend,
        cfg.camera.size.width,
        cfg.camera.size.height,
        cfg.camera.fps
    );

    let mut alerts = AlertManager::new().with_notifier(Box::new(LogNotifier::new()));
    if let Some(player) = cfg.audio_player.as_deref() {
        alerts = alerts.with_player(Box::new(CommandPlayer::new(player)));
    }
    let camera = SyntheticCamera::new(cfg.camera.size, cfg.display);
    let runner = MonitorRunner::new(Arc::clone(&session), Box::new(camera), backend, alerts)
        .with_interval(cfg.poll_interval);

    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    {
        let tx = Arc::clone(&tx);
        ctrlc::set_handler(move || {
            let _ = tx.send(true);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let seconds = args.seconds;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let summary = rt.block_on(async move {
        if let Some(secs) = seconds {
            let tx = Arc::clone(&tx);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                let _ = tx.send(true);
            });
        }
        runner.run(rx).await
    })?;

    lock(&session)?.dispatch(MonitoringAction::SetMonitoring(false))?;
    log::info!("monitoring stopped");

    println!("status:            {:?}", summary.status);
    println!("ticks:             {}", summary.ticks);
    println!("breach episodes:   {}", summary.breach_episodes);
    println!("alerts dispatched: {}", summary.alerts_dispatched);
    println!("alerts suppressed: {}", summary.alerts_suppressed);
    if summary.detect_failures > 0 {
        println!("detect failures:   {}", summary.detect_failures);
    }
    Ok(())
}
