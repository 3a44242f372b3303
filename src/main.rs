use facelock::{
    camera::{Camera, CameraOpener},
    cli::{self, terminal, Key, RawMode, SpeechCommand},
    common::{self, Config, DevMode},
    core::{
        AccessController, CaptureOutcome, ControllerSettings, DoorStatus, EnrollmentSession,
        FacePipeline, Gallery, LockState,
    },
    storage::{AccessOutcome, Datastore, FileStore},
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facelock")]
#[command(about = "Face recognition door lock")]
struct Cli {
    /// Enable development mode (saves data locally for testing)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Activate the door lock (Esc or q to stop)
    Run,
    /// Enroll a new identity
    Enroll {
        #[arg(short, long)]
        name: String,
    },
    /// List enrolled identities
    Users,
    /// Show recent access events
    History {
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// List V4L2 capture devices
    Cameras,
    /// Capture one frame and save it with detected faces marked
    Probe,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on mode
    setup_logging(cli.dev);

    // Create dev mode context
    let dev_mode = DevMode::new(cli.dev)?;
    let config = load_config(cli.config, &dev_mode)?;

    match cli.command {
        Commands::Run => run_door(&config, &dev_mode)?,
        Commands::Enroll { name } => enroll(&name, &config, &dev_mode)?,
        Commands::Users => {
            let store = FileStore::open(&config, &dev_mode)?;
            let identities = store.list_identities()?;

            if identities.is_empty() {
                println!("No identities enrolled. Add one with: facelock enroll --name <NAME>");
                return Ok(());
            }

            println!("👥 {} enrolled identities\n", identities.len());
            for identity in identities {
                println!(
                    "  {:<24} {:>3} samples  enrolled {}  ({})",
                    identity.name,
                    identity.embeddings.len(),
                    identity.created_at.with_timezone(&chrono::Local).format("%b %e, %Y"),
                    identity.id
                );
            }
        }
        Commands::History { limit } => {
            let store = FileStore::open(&config, &dev_mode)?;
            let events = store.list_access_events(limit)?;

            if events.is_empty() {
                println!("No access events recorded yet.");
                return Ok(());
            }

            for event in events {
                let when = event.timestamp.with_timezone(&chrono::Local).format("%b %e, %Y %I:%M %p");
                let icon = match event.outcome {
                    AccessOutcome::Granted => "✅",
                    AccessOutcome::Denied => "❌",
                    AccessOutcome::Unknown => "❔",
                };
                let who = event.name.as_deref().unwrap_or("unknown face");
                match event.unlock_duration {
                    Some(secs) => println!("{} {}  {:<8} {:<24} {:>4}%  unlocked {}s",
                                           icon, when, event.outcome, who, event.confidence, secs),
                    None => println!("{} {}  {:<8} {:<24} {:>4}%",
                                     icon, when, event.outcome, who, event.confidence),
                }
            }
        }
        Commands::Cameras => {
            println!("🔍 Detecting available cameras...\n");

            let cameras = Camera::list_all_cameras()?;
            if cameras.is_empty() {
                println!("❌ No cameras found!");
                println!("\nTroubleshooting:");
                println!("  1. Check if cameras are connected");
                println!("  2. Ensure you have permission to access /dev/video*");
                return Ok(());
            }

            for camera in &cameras {
                let marker = if camera.index == config.camera.device_index { " (configured)" } else { "" };
                println!("📷 /dev/video{}: {}{}", camera.index, camera.name, marker);
                if !camera.can_capture {
                    println!("   - no video capture support");
                }
                for format in &camera.formats {
                    println!("   - {}", format);
                }
                println!();
            }

            println!("📝 To use a different camera, set in the config:");
            println!("   [camera]");
            println!("   device_index = <NUMBER>");
        }
        Commands::Probe => {
            let pipeline = FacePipeline::new(&config)?;
            let mut camera = Camera::new(&config.camera)?;
            camera.warm_up()?;

            println!("Capturing frame from camera {}...", config.camera.device_index);
            let frame = camera.capture_frame()?;
            let faces = pipeline.detect(&frame)?;

            println!("Found {} face(s)", faces.len());
            for (i, face) in faces.iter().enumerate() {
                println!("  Face {}: confidence={:.3}, box=[{:.0}, {:.0}, {:.0}, {:.0}]",
                         i + 1, face.confidence, face.x1, face.y1, face.x2, face.y2);
            }

            let path = dev_mode.get_capture_path("probe");
            cli::annotate_faces(&frame, &faces).save(&path)?;
            println!("Saved annotated frame to {}", path.display());
        }
    }

    Ok(())
}

fn load_config(explicit: Option<PathBuf>, dev_mode: &DevMode) -> Result<Config> {
    match common::resolve_config_file(explicit, dev_mode) {
        Some(path) => Ok(Config::load_from_path(&path)?),
        None => {
            tracing::warn!("No config file found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

fn run_door(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let store: Arc<dyn Datastore> = Arc::new(FileStore::open(config, dev_mode)?);
    let gallery = Gallery::from(store.list_identities()?);
    if gallery.is_empty() {
        println!("⚠️  No identities enrolled; every face will be denied.");
    }

    let pipeline = Arc::new(FacePipeline::new(config)?);
    let mut opener = CameraOpener::new(config.camera.clone(), pipeline);

    let mut controller = AccessController::new(
        ControllerSettings::from(config),
        store,
        SpeechCommand::from_config(&config.speech),
    );
    controller.activate(&mut opener, gallery)?;

    let _raw = RawMode::enable()?;
    terminal::clear_screen().ok();
    terminal::print_line("Door lock active. Press ESC or q to stop.");

    let mut halted = None;
    controller.run_until(
        || terminal::check_for_stop().unwrap_or(false),
        |status| {
            terminal::print_line(&render_status(status));
            if status.state == LockState::Error {
                halted = status.error.clone();
            }
        },
    );

    match halted {
        Some(reason) => bail!("Door lock stopped: {}", reason),
        None => {
            terminal::print_line("Door lock stopped.");
            Ok(())
        }
    }
}

fn render_status(status: &DoorStatus) -> String {
    match status.state {
        LockState::Locked => "🔒 Locked".to_string(),
        LockState::Scanning if status.confidence != 0 => {
            format!("🔍 Scanning... last match {}%", status.confidence)
        }
        LockState::Scanning => "🔍 Scanning...".to_string(),
        LockState::Unlocked => format!(
            "🔓 Unlocked for {} ({}%), locking in {}s",
            status.recognized.as_deref().unwrap_or("?"),
            status.confidence,
            status.countdown
        ),
        LockState::Error => format!("⛔ {}", status.error.as_deref().unwrap_or("error")),
    }
}

fn enroll(name: &str, config: &Config, dev_mode: &DevMode) -> Result<()> {
    let store = FileStore::open(config, dev_mode)?;
    let pipeline = Arc::new(FacePipeline::new(config)?);
    let mut opener = CameraOpener::new(config.camera.clone(), pipeline);

    let mut session = EnrollmentSession::start(name, &store, &mut opener, config.enrollment.sample_count)?;

    let _raw = RawMode::enable()?;
    terminal::clear_screen().ok();
    terminal::print_line(&format!("Enrolling {}. Look at the camera.", session.name()));
    terminal::print_line("Press SPACE or ENTER to capture a sample, ESC to cancel.");

    loop {
        match terminal::poll_key(Duration::from_millis(100))? {
            Some(Key::Capture) => match session.capture() {
                Ok(CaptureOutcome::NoFace) => {
                    terminal::print_line("No face detected, try again.");
                }
                Ok(CaptureOutcome::Captured { count, total }) => {
                    terminal::print_line(&format!("📸 Captured {}/{}", count, total));
                }
                Ok(CaptureOutcome::Enrolled(identity)) => {
                    terminal::print_line(&format!(
                        "✅ Enrolled {} with {} samples", identity.name, identity.embeddings.len()
                    ));
                    return Ok(());
                }
                Err(e) if !e.ends_enrollment() => {
                    tracing::debug!("Capture attempt failed: {}", e);
                    terminal::print_line(&format!("Error detecting face ({}), try again.", e));
                }
                Err(e) => return Err(e.into()),
            },
            Some(Key::Cancel | Key::Quit) => {
                session.cancel();
                terminal::print_line("Enrollment cancelled.");
                return Ok(());
            }
            None => {}
        }
    }
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
