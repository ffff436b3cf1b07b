//! ride command line entry point
//!
//! Opens a project, prints its tree with unsaved markers and lists keywords that do not
//! resolve. With `--run` the project root is handed to the test runner and its events are
//! printed as they stream in; Ctrl-C stops the run.
//!
//! Exit code 0 on success, 1 when the project cannot be opened.

use clap::Parser;
use ride_core::{
    config::Settings,
    console,
    controller::Project,
    event::{topics, Event, EventData},
    runner::{RunRequest, Runner},
    RideError,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

#[derive(Parser)]
#[command(name = "ride")]
#[command(author, version, about = "Open a test data project and report on it", long_about = None)]
struct Cli {
    /// Accepted for compatibility; there is no update check
    #[arg(long)]
    noupdatecheck: bool,

    /// Run the project's tests after loading it
    #[arg(long)]
    run: bool,

    /// Settings file (default: the platform settings directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory or data file to open
    #[arg(default_value = ".")]
    path: PathBuf,
}

fn print_event(event: &Event) -> Result<(), RideError> {
    match &event.data {
        EventData::TestEnd {
            name,
            status,
            message,
        } => println!("  {status:<4} {name} {message}"),
        EventData::SuiteStart { name } => println!("{name}"),
        EventData::Log { level, text } => println!("  [{level}] {text}"),
        EventData::Artifact { path } => println!("{}: {}", event.topic, path.display()),
        EventData::ProcessEnded { code } => println!("runner ended: {code:?}"),
        _ => {}
    }
    Ok(())
}

fn open(cli: &Cli) -> Result<(Settings, Project), RideError> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    let project = Project::open(&cli.path, settings.project_options()?)?;
    if let Err(e) = settings.add_recent_file(&cli.path) {
        tracing::warn!("[ride] Could not update recent files: {}", e);
    }
    Ok((settings, project))
}

fn run_tests(settings: &Settings, project: &mut Project) -> Result<Option<i32>, RideError> {
    let Some(suite) = project
        .root()
        .and_then(|r| project.controller(r))
        .map(|c| c.path().to_path_buf())
    else {
        return Err(RideError::NotFound("nothing to run".to_string()));
    };
    let runner = Runner::from_command(&settings.paths().runner)?;
    project.subscribe(topics::RUNNER, print_event);
    let mut handle = runner.start(&RunRequest::new(suite), project.sender())?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping run...");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| RideError::Internal(format!("cannot install Ctrl-C handler: {e}")))?;

    loop {
        project.drain_events();
        if handle.poll()? {
            project.drain_events();
            return Ok(handle.exit_code().flatten());
        }
        if !running.load(Ordering::SeqCst) {
            handle.stop()?;
            let code = handle.wait(Some(Duration::from_secs(10)))?;
            project.drain_events();
            return Ok(code);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (settings, mut project) = match open(&cli) {
        Ok(opened) => opened,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    print!("{}", console::render_tree(&project));
    for error in project.errors() {
        eprintln!("Error: {error}");
    }
    for diagnostic in project.unresolved_keywords() {
        println!(
            "{} row {}: {}",
            diagnostic.target, diagnostic.row, diagnostic.error
        );
    }

    if cli.run {
        match run_tests(&settings, &mut project) {
            Ok(code) => tracing::info!("[ride] Run finished with {:?}", code),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}
