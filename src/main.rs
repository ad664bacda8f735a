use anyhow::Result;
use clap::Parser;
use formcheck::events::{EventFilter, EventReceiver};
use formcheck::{EventBus, FormcheckApp, FormcheckConfig};
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "formcheck")]
#[command(about = "Real-time squat posture feedback from a camera feed")]
#[command(version)]
#[command(long_about = "Formcheck watches a camera feed, runs pose estimation on every frame, \
measures the left knee angle and tells you whether you are standing, descending, at good \
depth or too low. Press SPACE to start or stop the camera and q to quit.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "formcheck.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - load the pose model but don't open the camera
    #[arg(long, help = "Perform dry run - load the pose model and exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Run without terminal keyboard controls
    #[arg(long, help = "Disable SPACE/q keyboard controls; stop with Ctrl+C or SIGTERM")]
    no_keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting Formcheck v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FormcheckConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut app = FormcheckApp::new(config).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;
    app.set_keyboard_enabled(!args.no_keyboard);

    spawn_feedback_printer(app.event_bus());

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - pose model loaded, camera not opened");
        println!("✓ Dry run completed successfully - pose model loaded");
        return Ok(());
    }

    if let Err(e) = app.start().await {
        // With keyboard controls the user can retry with SPACE
        if args.no_keyboard {
            error!("Failed to start: {}", e);
            return Err(e.into());
        }
        warn!("Session did not start: {}", e);
    }

    let exit_code = app.run().await.map_err(|e| {
        error!("Error during execution: {}", e);
        e
    })?;

    info!("Formcheck exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

/// Print each feedback or status message once, when it changes
fn spawn_feedback_printer(event_bus: Arc<EventBus>) {
    let mut receiver = EventReceiver::new(
        event_bus.subscribe(),
        EventFilter::EventTypes(vec!["feedback", "status_changed"]),
        "printer".to_string(),
    );

    tokio::spawn(async move {
        let mut last_message = String::new();
        while let Some(event) = receiver.recv().await {
            let message = event.description();
            if message == last_message {
                continue;
            }

            // Raw mode needs an explicit carriage return
            print!("{}\r\n", message);
            let _ = std::io::stdout().flush();
            last_message = message;
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("formcheck={}", log_level)));

    // Logs go to stderr so they don't interleave with the feedback lines
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Formcheck Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any value can be overridden from the environment, e.g. FORMCHECK_CAMERA__FPS=15");
    println!();
    println!("{}", toml::to_string_pretty(&FormcheckConfig::default())?);
    Ok(())
}
