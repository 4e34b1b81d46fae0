mod api;
mod app;
mod config;
mod error;
mod events;
mod jobs;
mod models;
mod session;
mod storage;
mod ui;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::Backend, prelude::*};
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::ModelScopeClient;
use app::{App, KeyOutcome, Submission};
use config::AppPaths;
use events::EventReceiver;
use jobs::JobRunner;
use models::JobKind;
use session::Session;
use storage::{ArtifactStore, SettingsStore};

/// Log to a file; the terminal belongs to the UI.
fn init_tracing(paths: &AppPaths) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)
        .with_context(|| format!("Failed to open log file {}", paths.log_file.display()))?;

    // Priority: RUST_LOG env var > default
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zimage=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .compact(),
        )
        .try_init()
        .ok();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let paths = AppPaths::resolve()?;
    let config = config::load_config(&paths)?;
    let paths = paths.with_config(&config);
    paths.ensure()?;
    init_tracing(&paths)?;
    let settings_store = SettingsStore::new(&paths.settings_file);
    let artifacts = ArtifactStore::new(&paths.output_dir);
    info!(
        settings = %settings_store.path().display(),
        output_dir = %artifacts.output_dir().display(),
        "zimage starting"
    );

    let mut session = Session::new(config.system_prompt.clone());
    session.seed(artifacts.enumerate());
    let mut app = App::new(settings_store.load(), session);
    app.stream_chat = config.stream_chat;

    let (tx, mut rx) = events::channel();
    let client = ModelScopeClient::new(config.base_url.clone(), config.request_timeout)?;
    info!(base_url = client.base_url(), "using inference endpoint");
    let runner = JobRunner::new(client, artifacts, tx, &config);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, &runner, &settings_store, &mut rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.sync_settings();
    settings_store.save(&app.settings);
    info!("zimage exiting");

    if let Err(err) = res {
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

/// Save settings, then hand the validated job to the runner.
fn submit(app: &mut App, runner: &JobRunner, settings_store: &SettingsStore) {
    let Some(submission) = app.prepare_submission() else {
        return;
    };
    settings_store.save(&app.settings);

    let (kind, result) = match submission {
        Submission::Image(job) => (JobKind::Image, runner.submit_image(job)),
        Submission::Chat(job) => (JobKind::Chat, runner.submit_chat(job)),
    };

    match result {
        Ok(job) => app.job_started(kind, job.id),
        Err(e) => {
            warn!(%kind, "submission rejected: {e}");
            app.job_rejected(kind, &e);
        }
    }
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &JobRunner,
    settings_store: &SettingsStore,
    event_rx: &mut EventReceiver,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::render(f, app))?;

        // Drain everything the workers sent since the last frame
        while let Ok(app_event) = event_rx.try_recv() {
            app.apply_event(app_event);
        }

        // ~60fps
        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.on_key(key.code, key.modifiers) {
                        KeyOutcome::Submit => submit(app, runner, settings_store),
                        KeyOutcome::SettingsChanged => {
                            app.sync_settings();
                            settings_store.save(&app.settings);
                        }
                        KeyOutcome::Handled => {}
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
