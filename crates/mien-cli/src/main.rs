use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueEnum};

use mien_core::classify::LiveClassifier;
use mien_core::{largest_face, FrameSource, Role, SourceError};
use mien_engine::{spawn_engine, EngineConfig, EngineHandle, ReplaySource, SessionState};
use mien_store::{credential, StoreFile};

#[derive(Parser)]
#[command(name = "mien", about = "mien face-identity recognizer CLI")]
struct Cli {
    /// Store blob path (defaults to MIEN_STORE_PATH or the XDG data dir).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a recorded frame stream and print the debounced decisions
    Classify {
        /// Recorded frames, one JSON detection array per line
        #[arg(long)]
        frames: PathBuf,
    },
    /// Run a guided enrollment from a recording and commit it
    ///
    /// The recording must contain the subject's front/left/right poses
    /// followed by the administrator facing the camera for verification.
    Enroll {
        #[arg(long)]
        frames: PathBuf,
        /// Name for the new identity
        #[arg(long)]
        name: String,
        /// Role for the new identity
        #[arg(long, value_enum, default_value_t = RoleArg::Member)]
        role: RoleArg,
    },
    /// Create the administrator (allowed only while none exists)
    CreateAdmin {
        #[arg(long)]
        frames: PathBuf,
        #[arg(long)]
        name: String,
        /// Admin PIN (at least 4 characters)
        #[arg(long)]
        pin: String,
        /// PIN confirmation; defaults to the PIN itself
        #[arg(long)]
        confirm_pin: Option<String>,
    },
    /// List enrolled identities
    List {
        /// Emit the whole store as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the administrator and all identities
    Reset {
        /// Confirm the destructive reset
        #[arg(long)]
        yes: bool,
        /// Admin PIN, required while an administrator exists
        #[arg(long)]
        pin: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Member,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Member => Role::Member,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = EngineConfig::from_env();
    if let Some(store) = cli.store {
        cfg.store_path = store;
    }
    // A recording is consumed by exactly one driver; the idle live loop
    // would steal session frames.
    cfg.live_enabled = false;

    match cli.command {
        Commands::Classify { frames } => run_classify(&cfg, &frames),
        Commands::Enroll { frames, name, role } => {
            run_enroll(cfg, &frames, &name, role.into()).await
        }
        Commands::CreateAdmin { frames, name, pin, confirm_pin } => {
            run_create_admin(cfg, &frames, &name, &pin, confirm_pin).await
        }
        Commands::List { json } => run_list(&cfg, json),
        Commands::Reset { yes, pin } => run_reset(&cfg, yes, pin),
    }
}

fn run_classify(cfg: &EngineConfig, frames: &PathBuf) -> Result<()> {
    let store = StoreFile::new(&cfg.store_path).load()?;
    tracing::debug!(
        identities = store.identities.len(),
        "classifying recording against store"
    );
    let mut source = ReplaySource::from_path(frames)?;
    let mut classifier = LiveClassifier::new(cfg.matcher, cfg.vote);

    let mut frame_no = 0usize;
    loop {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(SourceError::Exhausted) => break,
            Err(e) => return Err(e.into()),
        };
        frame_no += 1;
        let decision = largest_face(&frame)
            .and_then(|det| classifier.classify_frame(&det.embedding, &store));
        match decision {
            Some(identity) => println!("frame {frame_no:>4}: {} ({})", identity.name, identity.role),
            None => println!("frame {frame_no:>4}: Unknown"),
        }
    }
    println!("{frame_no} frames classified.");
    Ok(())
}

async fn run_enroll(cfg: EngineConfig, frames: &PathBuf, name: &str, role: Role) -> Result<()> {
    let source = ReplaySource::from_path(frames)?;
    let handle = spawn_engine(source, cfg)?;

    let ticket = handle.start_enrollment().await?;
    watch_capture(&handle).await?;

    println!("Capture complete. Admin verification: face the camera.");
    handle.commit_enrollment(ticket, name, role).await?;
    println!("Enrolled: {name} ({role})");
    Ok(())
}

async fn run_create_admin(
    cfg: EngineConfig,
    frames: &PathBuf,
    name: &str,
    pin: &str,
    confirm_pin: Option<String>,
) -> Result<()> {
    let source = ReplaySource::from_path(frames)?;
    let handle = spawn_engine(source, cfg)?;

    let confirm = confirm_pin.unwrap_or_else(|| pin.to_string());
    let mut rx = handle.progress_watch();
    let create = handle.create_admin(name, pin, confirm);
    tokio::pin!(create);

    // Print stage transitions while the engine drives the capture.
    let mut last_stage = None;
    loop {
        tokio::select! {
            result = &mut create => {
                result?;
                break;
            }
            changed = rx.changed() => {
                changed?;
                if let Some(view) = rx.borrow_and_update().clone() {
                    if last_stage != Some(view.stage) {
                        println!(
                            "stage: {} ({}/{} samples)",
                            view.stage, view.samples_so_far, view.target_total
                        );
                        last_stage = Some(view.stage);
                    }
                }
            }
        }
    }
    println!("Admin {name} enrolled.");
    Ok(())
}

/// Print stage transitions until the capture leaves the `Capturing` state.
async fn watch_capture(handle: &EngineHandle) -> Result<()> {
    let mut rx = handle.progress_watch();
    let mut last_stage = None;
    loop {
        let view = rx.borrow_and_update().clone();
        if let Some(view) = view {
            if last_stage != Some(view.stage) {
                println!(
                    "stage: {} ({}/{} samples)",
                    view.stage, view.samples_so_far, view.target_total
                );
                last_stage = Some(view.stage);
            }
            match view.state {
                SessionState::Capturing => {}
                SessionState::AwaitingCommit | SessionState::Committed => return Ok(()),
                SessionState::Cancelled => bail!("capture cancelled"),
                SessionState::Failed(reason) => bail!("capture failed: {reason}"),
            }
        }
        rx.changed().await?;
    }
}

fn run_list(cfg: &EngineConfig, json: bool) -> Result<()> {
    let store = StoreFile::new(&cfg.store_path).load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&store)?);
        return Ok(());
    }

    match &store.admin {
        Some(cred) => println!("Administrator: {}", cred.name),
        None => println!("Administrator: (none)"),
    }
    if store.identities.is_empty() {
        println!("No identities enrolled.");
        return Ok(());
    }
    for identity in &store.identities {
        println!(
            "{}  role={}  templates={}  enrolled={}",
            identity.name,
            identity.role,
            identity.templates.len(),
            identity.enrolled_at
        );
    }
    Ok(())
}

fn run_reset(cfg: &EngineConfig, yes: bool, pin: Option<String>) -> Result<()> {
    if !yes {
        bail!("refusing to clear all enrollments without --yes");
    }
    let file = StoreFile::new(&cfg.store_path);
    let store = file.load()?;

    if let Some(cred) = &store.admin {
        let pin = pin.ok_or_else(|| anyhow!("an administrator exists; supply --pin to confirm"))?;
        if !credential::verify_pin(cred, &pin) {
            bail!("PIN verification failed");
        }
    }

    file.reset()?;
    println!("Store cleared.");
    Ok(())
}
