//! mien — face enrollment and live recognition at the terminal.
//!
//! Wires the hardware layer (V4L2 camera), the detector and recognizer
//! from `mien-core`, and the SQLite identity store into the session
//! drivers in `mien-engine`. Runs either as one-shot subcommands or as
//! an interactive menu when invoked bare.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};

use mien_core::types::{Frame, Region};
use mien_core::{CancelToken, LbphModel, ScrfdDetector};
use mien_engine::{
    run_enroll, run_recognition, run_training, EnrollRequest, Overlay, PipelineConfig, Verdict,
};
use mien_hw::{Camera, CameraSettings};
use mien_store::IdentityStore;

#[derive(Parser)]
#[command(name = "mien", about = "Face enrollment and live recognition")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick and persist the capture device
    SetupCamera,
    /// Capture face samples for a user and train their recognizer
    CreateDataset {
        /// Numeric user id (prompted for when omitted)
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Retrain a user's recognizer from their stored samples
    Train {
        /// Numeric user id
        #[arg(long)]
        user_id: i64,
    },
    /// Run live recognition against a user's recognizer
    DetectFaces {
        /// Numeric user id
        #[arg(long)]
        user_id: i64,
    },
    /// Show a user's recorded activity
    Activity {
        /// Numeric user id
        #[arg(long)]
        user_id: i64,
    },
    /// Delete the identity store, samples, recognizers, and camera config
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Menu-driven session (also the default when run bare)
    Interactive,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = PipelineConfig::from_env();
    tracing::debug!(db = %cfg.db_path.display(), images = %cfg.image_dir.display(),
        "configuration resolved");

    match cli.command {
        Some(command) => dispatch(&cfg, command),
        None => interactive(&cfg),
    }
}

fn dispatch(cfg: &PipelineConfig, command: Commands) -> Result<()> {
    match command {
        Commands::SetupCamera => setup_camera(cfg),
        Commands::CreateDataset { user_id } => enroll(cfg, user_id),
        Commands::Train { user_id } => train(cfg, user_id),
        Commands::DetectFaces { user_id } => recognize(cfg, user_id),
        Commands::Activity { user_id } => activity(cfg, user_id),
        Commands::Reset { yes } => reset(cfg, yes),
        Commands::Interactive => interactive(cfg),
    }
}

fn interactive(cfg: &PipelineConfig) -> Result<()> {
    loop {
        println!();
        println!("mien — choose an operation");
        println!("  1) set up camera");
        println!("  2) enroll a user");
        println!("  3) retrain a user");
        println!("  4) recognize a user");
        println!("  5) show user activity");
        println!("  6) reset all data");
        println!("  0) quit");
        let choice = prompt("> ")?;
        let result = match choice.as_str() {
            "1" => setup_camera(cfg),
            "2" => enroll(cfg, None),
            "3" => prompt_i64("user id: ").and_then(|id| train(cfg, id)),
            "4" => prompt_i64("user id: ").and_then(|id| recognize(cfg, id)),
            "5" => prompt_i64("user id: ").and_then(|id| activity(cfg, id)),
            "6" => reset(cfg, false),
            "0" | "q" | "" => return Ok(()),
            other => {
                println!("unrecognized choice: {other}");
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("error: {e:#}");
        }
    }
}

fn setup_camera(cfg: &PipelineConfig) -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        bail!("no V4L2 capture devices found");
    }
    for (i, dev) in devices.iter().enumerate() {
        println!("  {i}) {} — {} ({})", dev.path, dev.name, dev.driver);
    }
    let index: usize = prompt("select device: ")?
        .parse()
        .context("not a device index")?;
    let dev = devices.get(index).context("no such device")?;

    let settings = CameraSettings {
        device: dev.path.clone(),
    };
    settings.save(&cfg.camera_settings_path)?;
    println!("camera set to {}", dev.path);
    Ok(())
}

fn enroll(cfg: &PipelineConfig, id: Option<i64>) -> Result<()> {
    let request = EnrollRequest {
        numeric_id: match id {
            Some(id) => id,
            None => prompt_i64("user id: ")?,
        },
        name: prompt("name: ")?,
        age: prompt_i64("age: ")?,
        role: prompt("role: ")?,
    };

    let store = IdentityStore::open(&cfg.db_path)?;
    let camera = open_camera(cfg)?;
    let mut source = camera.start_stream()?;
    let mut detector = ScrfdDetector::load(&cfg.detector_model_path)?;
    let mut model = LbphModel::new();
    let cancel = cancel_on_quit();

    println!(
        "capturing up to {} samples; press q then Enter to stop early",
        cfg.sample_quota
    );
    let outcome = run_enroll(
        cfg, &store, &mut source, &mut detector, &mut model, &cancel, &request,
    )?;

    println!("captured {} samples", outcome.captured);
    match outcome.training {
        Some(report) => match report.artifact {
            Some(path) => println!(
                "trained on {} samples ({} skipped); recognizer at {}",
                report.samples,
                report.skipped,
                path.display()
            ),
            None => println!("no usable samples; recognizer not written"),
        },
        None => println!("training failed; samples are stored, retry with `mien train`"),
    }
    store.record_activity(request.numeric_id, "enrolled")?;
    Ok(())
}

fn train(cfg: &PipelineConfig, id: i64) -> Result<()> {
    let store = IdentityStore::open(&cfg.db_path)?;
    let profile = store
        .get_profile(id)?
        .with_context(|| format!("no profile for user {id}"))?;
    let mut detector = ScrfdDetector::load(&cfg.detector_model_path)?;
    let mut model = LbphModel::new();

    let report = run_training(cfg, &store, &mut detector, &mut model, &profile.stable_id)?;
    match report.artifact {
        Some(path) => println!(
            "trained on {} samples ({} skipped); recognizer at {}",
            report.samples,
            report.skipped,
            path.display()
        ),
        None => println!("no usable samples; recognizer not written"),
    }
    Ok(())
}

fn recognize(cfg: &PipelineConfig, id: i64) -> Result<()> {
    let store = IdentityStore::open(&cfg.db_path)?;
    let camera = open_camera(cfg)?;
    let mut source = camera.start_stream()?;
    let mut detector = ScrfdDetector::load(&cfg.detector_model_path)?;
    let mut model = LbphModel::new();
    let mut overlay = ConsoleOverlay::default();
    let cancel = cancel_on_quit();

    println!("recognizing; press q then Enter to stop");
    let summary = run_recognition(
        cfg, &store, &mut source, &mut detector, &mut model, &mut overlay, &cancel, id,
    )?;

    println!(
        "{} frames, {} matched, {} rejected",
        summary.frames, summary.matches, summary.rejections
    );
    if summary.matches > 0 {
        store.record_activity(id, "recognized")?;
    }
    Ok(())
}

fn activity(cfg: &PipelineConfig, id: i64) -> Result<()> {
    let store = IdentityStore::open(&cfg.db_path)?;
    let records = store.get_activity(id)?;
    if records.is_empty() {
        println!("no recorded activity for user {id}");
    }
    for record in records {
        println!("{}  {}", record.recorded_at, record.activity);
    }
    Ok(())
}

fn reset(cfg: &PipelineConfig, yes: bool) -> Result<()> {
    if !yes {
        let answer = prompt("delete ALL identities, samples, and recognizers? [y/N] ")?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }
    mien_engine::reset(cfg)?;
    println!("all data removed");
    Ok(())
}

fn open_camera(cfg: &PipelineConfig) -> Result<Camera> {
    let settings = CameraSettings::load_or_default(&cfg.camera_settings_path)?;
    Camera::open(&settings.device)
        .with_context(|| format!("could not open camera {}", settings.device))
}

/// Cancels the returned token when the user types `q` on stdin.
fn cancel_on_quit() -> CancelToken {
    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    watcher.cancel();
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });
    cancel
}

/// Prints verdicts as they change rather than once per frame.
#[derive(Default)]
struct ConsoleOverlay {
    last: Option<Verdict>,
}

impl Overlay for ConsoleOverlay {
    fn draw(&mut self, frame: &Frame, region: &Region, verdict: &Verdict) {
        if self.last.as_ref() == Some(verdict) {
            return;
        }
        match verdict {
            Verdict::Match {
                name,
                role,
                distance,
                ..
            } => println!(
                "frame {}: {name} ({role}) at {},{} distance {distance:.1}",
                frame.sequence, region.x, region.y
            ),
            Verdict::Rejected { distance } => {
                println!("frame {}: unknown face, distance {distance:.1}", frame.sequence)
            }
            Verdict::Unresolvable { distance } => println!(
                "frame {}: matched a different identity, distance {distance:.1}",
                frame.sequence
            ),
        }
        self.last = Some(verdict.clone());
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_i64(message: &str) -> Result<i64> {
    prompt(message)?.parse().context("expected a number")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_surface() {
        let cli = Cli::try_parse_from(["mien", "create-dataset", "--user-id", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::CreateDataset { user_id: Some(7) })
        ));

        let cli = Cli::try_parse_from(["mien", "detect-faces", "--user-id", "7"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::DetectFaces { user_id: 7 })));

        let cli = Cli::try_parse_from(["mien", "setup-camera"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::SetupCamera)));

        let cli = Cli::try_parse_from(["mien", "interactive"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Interactive)));

        // Bare invocation falls through to the menu.
        let cli = Cli::try_parse_from(["mien"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_reset_confirmation_flag() {
        let cli = Cli::try_parse_from(["mien", "reset", "--yes"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Reset { yes: true })));
    }
}
