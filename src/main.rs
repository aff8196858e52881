//! codebox CLI
//!
//! Usage: `codebox [--upload FILE]... [--install PKG]... [--save-images] [CODE | -]`
//!
//! Starts a sandbox from `CODEBOX_*` environment configuration, uploads and
//! installs what was asked for, runs CODE (or stdin for `-`), prints the
//! outcome and the workspace listing, then stops the kernel.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use codebox::tracing::{init_tracing, shutdown_tracing};
use codebox::{ExecutionOutcome, PidRegistry, Sandbox, SandboxConfig};
use tracing::{error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const USAGE: &str =
    "usage: codebox [--upload FILE]... [--install PKG]... [--save-images] [CODE | -]";

#[derive(Debug, Default)]
struct Args {
    uploads: Vec<PathBuf>,
    installs: Vec<String>,
    save_images: bool,
    code: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--upload" => {
                let file = args.next().ok_or("--upload needs a file")?;
                parsed.uploads.push(PathBuf::from(file));
            }
            "--install" => {
                let package = args.next().ok_or("--install needs a package")?;
                parsed.installs.push(package);
            }
            "--save-images" => parsed.save_images = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag {}\n{}", flag, USAGE));
            }
            _ if parsed.code.is_some() => {
                return Err(format!("unexpected argument {}\n{}", arg, USAGE));
            }
            _ => parsed.code = Some(arg),
        }
    }
    Ok(parsed)
}

fn read_code(code: Option<String>) -> Result<Option<String>, BoxError> {
    match code.as_deref() {
        Some("-") => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(Some(buffer))
        }
        _ => Ok(code),
    }
}

fn print_outcome(outcome: &ExecutionOutcome) {
    match outcome {
        ExecutionOutcome::Text { content } => println!("{}", content),
        ExecutionOutcome::Image { encoding, content_base64 } => {
            println!("[{} image, {} base64 chars]", encoding.mime_type(), content_base64.len())
        }
        ExecutionOutcome::Error { message } => eprintln!("[ERROR] {}", message),
    }
}

async fn session(sandbox: &mut Sandbox, args: Args) -> Result<bool, BoxError> {
    let started = sandbox.start().await?;
    println!("[CODEBOX] Session {} on port {}", started.session_id, started.port);

    for path in &args.uploads {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("cannot upload {}", path.display()))?;
        let content = std::fs::read(path)?;
        sandbox.workspace().upload(name, &content)?;
        println!("[CODEBOX] Uploaded {}", name);
    }

    let mut ok = true;
    for package in &args.installs {
        let outcome = sandbox.install(package).await?;
        ok &= !outcome.is_error();
        print_outcome(&outcome);
    }

    if let Some(code) = read_code(args.code)? {
        let outcome = sandbox.run(&code).await?;
        ok &= !outcome.is_error();
        print_outcome(&outcome);
        if args.save_images {
            if let Some(name) = sandbox.workspace().save_image(&outcome)? {
                println!("[CODEBOX] Saved {}", name);
            }
        }
    }

    let files = sandbox.workspace().list_names()?;
    println!("[CODEBOX] Workspace: {}", files.join(", "));
    Ok(ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    if let Err(e) = init_tracing("codebox", otlp_endpoint.as_deref()) {
        eprintln!("[CODEBOX] Failed to initialize tracing: {}", e);
    }

    let registry = PidRegistry::shared();
    let result = match SandboxConfig::from_env() {
        Ok(config) => match Sandbox::with_registry(config, registry.clone()) {
            Ok(mut sandbox) => {
                let result = session(&mut sandbox, args).await;
                if let Err(e) = sandbox.stop().await {
                    error!(error = %e, "failed to stop sandbox");
                }
                result
            }
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    };

    let signalled = registry.teardown();
    if signalled > 0 {
        info!(signalled, "terminated leftover kernel processes");
    }
    shutdown_tracing();

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("[CODEBOX] {}", e);
            ExitCode::FAILURE
        }
    }
}
