use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::{select, tick, Receiver};

use proctor_core::camera::domain::frame_source::{FrameSource, MediaContext};
use proctor_core::camera::infrastructure::ffmpeg_camera::FfmpegCamera;
use proctor_core::camera::infrastructure::still_frame_source::StillFrameSource;
use proctor_core::detection::domain::object_detector::{suspicious_trigger, ObjectDetector};
use proctor_core::detection::infrastructure::onnx_face_mesh_detector::OnnxFaceMeshDetector;
use proctor_core::detection::infrastructure::onnx_yolo_detector::OnnxObjectDetector;
use proctor_core::escalation::escalation_client::{EscalationClient, EscalationRequest};
use proctor_core::escalation::escalation_handler::EscalationHandler;
use proctor_core::escalation::infrastructure::image_encoding::encode_jpeg_base64;
use proctor_core::lockdown::camera_watch::WatchTimings;
use proctor_core::lockdown::domain::integrity_event::IntegrityEvent;
use proctor_core::lockdown::infrastructure::event_bus::EventBus;
use proctor_core::lockdown::infrastructure::headless_display::HeadlessDisplay;
use proctor_core::pipeline::proctor_session::{LockdownHost, ProctorSession, SessionParts};
use proctor_core::pipeline::session_observer::LogSessionObserver;
use proctor_core::shared::config::ProctorConfig;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);
const AUTO_ESCALATE_COOLDOWN: Duration = Duration::from_secs(30);

/// Live exam proctoring on a local camera and vision-model escalation.
#[derive(Parser)]
#[command(name = "proctor")]
struct Cli {
    /// Settings file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor the candidate until Ctrl-D, `quit` or the time limit.
    ///
    /// Lines on stdin simulate host events: `exit-fullscreen`, `fullscreen`,
    /// `menu`, `hide`, `show`, `rearm`, `status`, `escalate`, `quit`.
    Monitor {
        /// Replay a still image instead of opening the camera.
        #[arg(long)]
        image: Option<PathBuf>,

        /// With --image: end the fake camera track after N frames.
        #[arg(long)]
        frames: Option<usize>,

        /// Camera device name or path.
        #[arg(long)]
        device: Option<String>,

        /// Directory with bundled ONNX models.
        #[arg(long)]
        models: Option<PathBuf>,

        /// Run the object detector alongside the face mesh.
        #[arg(long)]
        objects: bool,

        /// Escalate frames with suspicious objects automatically.
        #[arg(long)]
        auto_escalate: bool,

        /// Run without fullscreen/context-menu/camera lockdown.
        #[arg(long)]
        no_lockdown: bool,

        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Session id used for persisted flags.
        #[arg(long, default_value = "")]
        session_id: String,
    },
    /// Send one image to the vision backends.
    Escalate {
        /// JPEG or PNG file.
        image: PathBuf,

        #[arg(long, default_value = "")]
        session_id: String,

        #[arg(long, default_value = "manual")]
        trigger: String,
    },
    /// Answer one escalation request read as JSON from stdin.
    Handle,
    /// Write the current settings (without secrets) to the settings file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Monitor {
            image,
            frames,
            device,
            models,
            objects,
            auto_escalate,
            no_lockdown,
            duration,
            session_id,
        } => {
            let mut config = config;
            if device.is_some() {
                config.camera.device = device;
            }
            if models.is_some() {
                config.models.bundled_dir = models;
            }
            config.models.object_detection |= objects;
            config.lockdown &= !no_lockdown;
            let options = MonitorOptions {
                image,
                frames,
                auto_escalate,
                duration: duration.map(Duration::from_secs),
                session_id,
            };
            run_monitor(&config, options)
        }
        Command::Escalate {
            image,
            session_id,
            trigger,
        } => run_escalate(&config, &image, session_id, trigger),
        Command::Handle => run_handle(&config),
        Command::InitConfig { force } => run_init_config(&config, cli.config, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<ProctorConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let mut config = ProctorConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Ok(ProctorConfig::load()),
    }
}

struct MonitorOptions {
    image: Option<PathBuf>,
    frames: Option<usize>,
    auto_escalate: bool,
    duration: Option<Duration>,
    session_id: String,
}

fn run_monitor(
    config: &ProctorConfig,
    options: MonitorOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let media = MediaContext::new();
    let source: Box<dyn FrameSource> = match &options.image {
        Some(path) => {
            let mut still = StillFrameSource::open(path, media.clone())?;
            if let Some(n) = options.frames {
                still = still.with_frame_limit(n);
            }
            Box::new(still)
        }
        None => Box::new(FfmpegCamera::new(config.camera.clone(), media.clone())),
    };

    let detector = Box::new(OnnxFaceMeshDetector::new(config.models.bundled_dir.clone()));
    let objects: Option<Box<dyn ObjectDetector>> = if config.models.object_detection {
        Some(Box::new(OnnxObjectDetector::load(
            config.models.bundled_dir.clone(),
        )?))
    } else {
        None
    };

    let bus = EventBus::new();
    let display = Arc::new(HeadlessDisplay::new(bus.clone()));

    let mut parts = SessionParts::new(source, detector);
    parts.objects = objects;
    parts.observer = Box::new(LogSessionObserver::default());
    if config.lockdown {
        parts.lockdown = Some(LockdownHost {
            events: Arc::new(bus.clone()),
            display: display.clone(),
            media: media.clone(),
            timings: WatchTimings::default(),
        });
    }

    let client = EscalationClient::from_config(&config.escalation, &config.flag_store)?;
    let mut session = ProctorSession::start(parts)?;
    eprintln!("Monitoring. Type `quit` or press Ctrl-D to stop.");

    let commands = spawn_stdin_reader();
    let status = tick(STATUS_INTERVAL);
    let started = Instant::now();
    let mut last_warning: Option<String> = None;
    let mut last_escalation: Option<Instant> = None;

    loop {
        select! {
            recv(commands) -> line => {
                let Ok(line) = line else { break };
                match line.trim() {
                    "quit" | "exit" => break,
                    "exit-fullscreen" => display.leave_fullscreen(),
                    "fullscreen" | "rearm" => {
                        if let Err(e) = session.request_fullscreen() {
                            eprintln!("Re-arm failed: {e}");
                        }
                    }
                    "menu" => {
                        let disposition = bus.dispatch(IntegrityEvent::ContextMenu);
                        eprintln!("Context menu: {disposition:?}");
                    }
                    "hide" => {
                        bus.dispatch(IntegrityEvent::VisibilityChanged { hidden: true });
                    }
                    "show" => {
                        bus.dispatch(IntegrityEvent::VisibilityChanged { hidden: false });
                    }
                    "status" => print_status(&session),
                    "escalate" => escalate_latest(&client, &session, &options.session_id, "manual"),
                    "" => {}
                    other => eprintln!("Unknown command: {other}"),
                }
            }
            recv(status) -> _ => {
                let warning = session.current_warning();
                if warning != last_warning {
                    if let Some(w) = &warning {
                        eprintln!("WARNING: {w}");
                    }
                    last_warning = warning;
                }
                if session.is_paused() {
                    log::debug!("Session paused; waiting for re-arm");
                }

                if options.auto_escalate {
                    let cooled = last_escalation.map_or(true, |t| t.elapsed() >= AUTO_ESCALATE_COOLDOWN);
                    if let (true, Some(trigger)) = (cooled, suspicious_trigger(&session.detections())) {
                        escalate_latest(&client, &session, &options.session_id, &trigger);
                        last_escalation = Some(Instant::now());
                    }
                }

                if options.duration.is_some_and(|d| started.elapsed() >= d) {
                    break;
                }
            }
        }
    }

    let snapshot = session.snapshot();
    let lockdown = session.lockdown_state();
    session.stop();

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if let Some(state) = lockdown {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_status(session: &ProctorSession) {
    let stats = session.stats();
    eprintln!(
        "trust {} | violations {} (no_face {}, multiple_faces {}, looking_away {}, tab_switch {}, fullscreen_exit {}, context_menu {}, webcam_disconnect {}) | faces {} | paused {}",
        stats.trust_score,
        stats.total_violations,
        stats.no_face_count,
        stats.multiple_faces_count,
        stats.looking_away_count,
        stats.tab_switch_count,
        stats.fullscreen_exit_count,
        stats.context_menu_count,
        stats.webcam_disconnect_count,
        session.overlay().len(),
        session.is_paused(),
    );
}

fn escalate_latest(client: &EscalationClient, session: &ProctorSession, session_id: &str, trigger: &str) {
    let Some(frame) = session.capture_frame() else {
        eprintln!("No frame captured yet");
        return;
    };
    match client.escalate_frame(session_id, &frame, trigger) {
        Ok(verdict) => eprintln!(
            "Escalation ({trigger}): violation={} confidence={:.2} reason={}",
            verdict.violation, verdict.confidence, verdict.reason
        ),
        Err(e) => eprintln!("Escalation failed: {e}"),
    }
}

fn run_escalate(
    config: &ProctorConfig,
    image: &Path,
    session_id: String,
    trigger: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let rgb = image::open(image)?.to_rgb8();
    let client = EscalationClient::from_config(&config.escalation, &config.flag_store)?;
    let verdict = client.escalate(&EscalationRequest {
        session_id,
        image_base64: encode_jpeg_base64(&rgb)?,
        trigger_reason: trigger,
    });
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    if let Some(flag_type) = verdict.flag_type {
        log::info!("Flag type {flag_type}, persisted: {}", verdict.flagged);
    }
    Ok(())
}

fn run_handle(config: &ProctorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;

    let client = EscalationClient::from_config(&config.escalation, &config.flag_store)?;
    let handler = EscalationHandler::new(Arc::new(client));
    let response = handler.handle(&body);

    println!("{}", serde_json::to_string(&response.body)?);
    if response.status != 200 {
        return Err(format!("request failed with status {}", response.status).into());
    }
    Ok(())
}

fn run_init_config(
    config: &ProctorConfig,
    path: Option<PathBuf>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path
        .or_else(ProctorConfig::settings_path)
        .ok_or("could not determine config directory")?;
    if path.exists() && !force {
        return Err(format!("{} exists; pass --force to overwrite", path.display()).into());
    }
    config.save_to(&path)?;
    log::info!("Settings written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_monitor_flags_parse() {
        let cli = Cli::try_parse_from([
            "proctor",
            "monitor",
            "--image",
            "face.jpg",
            "--frames",
            "90",
            "--no-lockdown",
            "--objects",
        ])
        .unwrap();
        let Command::Monitor {
            image,
            frames,
            no_lockdown,
            objects,
            ..
        } = cli.command
        else {
            panic!("expected monitor");
        };
        assert_eq!(image, Some(PathBuf::from("face.jpg")));
        assert_eq!(frames, Some(90));
        assert!(no_lockdown);
        assert!(objects);
    }

    #[test]
    fn test_escalate_defaults() {
        let cli = Cli::try_parse_from(["proctor", "escalate", "frame.jpg"]).unwrap();
        let Command::Escalate {
            session_id, trigger, ..
        } = cli.command
        else {
            panic!("expected escalate");
        };
        assert_eq!(session_id, "");
        assert_eq!(trigger, "manual");
    }
}
