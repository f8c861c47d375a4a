use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use facegate_core::auth::domain::auth_client::{Credentials, RemoteAuthClient};
use facegate_core::auth::infrastructure::http_auth_client::HttpAuthClient;
use facegate_core::binding::forms::RegistrationForm;
use facegate_core::binding::login_page::LoginPage;
use facegate_core::binding::navigation::Navigation;
use facegate_core::binding::register_page::RegisterPage;
use facegate_core::capture::domain::media_source::MediaSource;
use facegate_core::capture::infrastructure::ffmpeg_camera_source::FfmpegCameraSource;
use facegate_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use facegate_core::detection::infrastructure::onnx_blazeface_probe::OnnxBlazefaceProbe;
use facegate_core::session::capture_controller::{CancelHandle, CaptureController};
use facegate_core::session::capture_session::SessionOutcome;
use facegate_core::session::session_signals::{LogSignals, SessionSignals, SessionStatus};
use facegate_core::shared::settings::Settings;

/// Face-gated login and registration against a FaceGate auth server.
#[derive(Parser)]
#[command(name = "facegate", version)]
struct Cli {
    /// Settings file (defaults to the per-user config location).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify your face and log in.
    Login {
        #[command(flatten)]
        account: Account,
        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Collect five face frames and create an account.
    Register {
        #[command(flatten)]
        account: Account,
        /// Password confirmation; must match --password.
        #[arg(long, env = "FACEGATE_CONFIRM_PASSWORD", hide_env_values = true)]
        confirm_password: String,
        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Print the effective settings.
    Config {
        /// Write them to the settings file.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct Account {
    #[arg(long)]
    username: String,
    #[arg(long, env = "FACEGATE_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct CaptureArgs {
    /// Auth service base URL.
    #[arg(long)]
    server: Option<String>,

    /// Camera device (e.g. /dev/video0).
    #[arg(long, conflicts_with = "frames_dir")]
    device: Option<String>,

    /// Replay still images from this directory instead of a camera.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Directory holding a pre-downloaded face model.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Session timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

/// Prints status changes on one updating stderr line.
struct ConsoleSignals;

impl SessionSignals for ConsoleSignals {
    fn status(&mut self, status: &SessionStatus) {
        eprint!("\r\x1b[2K{status}");
        let _ = std::io::stderr().flush();
    }

    fn submit_enabled(&mut self, enabled: bool) {
        log::debug!("Submit enabled: {enabled}");
    }

    fn finished(&mut self, _outcome: &SessionOutcome) {
        eprintln!();
    }
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
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Command::Login { account, capture } => {
            apply_overrides(&mut settings, &capture);
            let credentials = Credentials::new(account.username, account.password);
            runtime.block_on(run_login(&settings, &capture, credentials))
        }
        Command::Register {
            account,
            confirm_password,
            capture,
        } => {
            apply_overrides(&mut settings, &capture);
            let form = RegistrationForm::new(account.username, account.password, confirm_password);
            runtime.block_on(run_register(&settings, &capture, form))
        }
        Command::Config { write } => show_config(&settings, cli.config, write),
    }
}

async fn run_login(
    settings: &Settings,
    capture: &CaptureArgs,
    credentials: Credentials,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut page = LoginPage::new(build_controller(settings, capture)?);
    let interrupt = cancel_on_ctrl_c(page.cancel_handle());

    let outcome = page.begin(credentials).await;
    interrupt.abort();
    let outcome = outcome?;
    report_outcome(&outcome);
    navigate(page.submit())
}

async fn run_register(
    settings: &Settings,
    capture: &CaptureArgs,
    form: RegistrationForm,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut page = RegisterPage::new(build_controller(settings, capture)?);
    let interrupt = cancel_on_ctrl_c(page.cancel_handle());

    let outcome = page.begin(&form).await;
    interrupt.abort();
    let outcome = outcome?;
    report_outcome(&outcome);
    if !page.submit_enabled() {
        return navigate(Navigation::Stay);
    }

    let enrolled = tokio::select! {
        result = page.submit() => result.map_err(|e| e.user_message())?,
        _ = tokio::signal::ctrl_c() => return Err("registration interrupted".into()),
    };
    println!("{}", enrolled.message);
    navigate(enrolled.navigation)
}

fn build_controller(
    settings: &Settings,
    capture: &CaptureArgs,
) -> Result<CaptureController, Box<dyn std::error::Error>> {
    let media: Box<dyn MediaSource> = match &capture.frames_dir {
        Some(dir) => {
            Box::new(ImageSequenceSource::new(dir).with_quality(settings.snapshot_quality))
        }
        None => Box::new(
            FfmpegCameraSource::new(&settings.device)
                .with_ideal_size(settings.capture_width, settings.capture_height)
                .with_quality(settings.snapshot_quality),
        ),
    };

    let mut probe = OnnxBlazefaceProbe::new(settings.model_location());
    if settings.overlay {
        probe = probe.with_overlay();
    }

    log::info!("Using auth service at {}", settings.server_url);
    let auth: Arc<dyn RemoteAuthClient> = Arc::new(HttpAuthClient::new(&settings.server_url)?);

    Ok(CaptureController::new(media, Box::new(probe), auth)
        .with_signals(session_signals())
        .with_login_config(settings.login_config())
        .with_register_config(settings.register_config()))
}

/// Live status line on a terminal, log records otherwise.
fn session_signals() -> Box<dyn SessionSignals> {
    if std::io::stderr().is_terminal() {
        Box::new(ConsoleSignals)
    } else {
        Box::new(LogSignals)
    }
}

fn apply_overrides(settings: &mut Settings, capture: &CaptureArgs) {
    if let Some(server) = &capture.server {
        settings.server_url = server.clone();
    }
    if let Some(device) = &capture.device {
        settings.device = device.clone();
    }
    if let Some(dir) = &capture.model_dir {
        settings.model_dir = Some(dir.clone());
    }
    if let Some(secs) = capture.timeout {
        settings.login.timeout_secs = secs;
        settings.register.timeout_secs = secs;
    }
}

/// Cancels the session on Ctrl-C until the returned task is aborted.
fn cancel_on_ctrl_c(cancel: CancelHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted; cancelling session");
            cancel.cancel();
        }
    })
}

fn report_outcome(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Authenticated {
            similarity: Some(similarity),
        } => println!("Face verified (similarity {similarity:.2})"),
        SessionOutcome::Authenticated { similarity: None } => println!("Face verified"),
        SessionOutcome::Collected(frames) => println!("Collected {} face frames", frames.len()),
        SessionOutcome::Failed(_) | SessionOutcome::TimedOut => {
            println!("{}", SessionStatus::from_outcome(outcome))
        }
    }
}

fn navigate(navigation: Navigation) -> Result<(), Box<dyn std::error::Error>> {
    match navigation.path() {
        Some(path) => {
            println!("Next: {path}");
            Ok(())
        }
        None => Err("session did not complete; run the command again to retry".into()),
    }
}

fn show_config(
    settings: &Settings,
    path: Option<PathBuf>,
    write: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    if write {
        let path = path
            .or_else(Settings::config_path)
            .ok_or("could not determine config directory")?;
        settings.save_to(&path)?;
        eprintln!("Settings written to {}", path.display());
    }
    Ok(())
}
