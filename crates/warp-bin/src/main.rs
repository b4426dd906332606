//! warpedit entrypoint.
use anyhow::{Context, Result};
use clap::Parser;
use core_config::{ConfigContext, load_from};
use core_display::term::{Routes, TermScreen, TerminalGuard};
use core_events::{ChildTransportSource, CommandSource, EVENT_CHANNEL_CAP, EventSourceRegistry};
use core_idle::IdleCollaborator;
use core_input::spawn_term_input;
use core_model::ContentProvider;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Once;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

mod keys;
mod runtime;
mod store;

use runtime::{HeadlessFactory, Runtime, TermFactory};
use store::LineStore;

const WELCOME: &str = "\
warpedit

No file given. Arrows move the cursor, j/k scroll, / finds,
n opens a sibling view, q quits.
";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "warpedit", version, about = "Multi-view text display core")]
struct Args {
    /// File to display. A welcome text is shown when omitted.
    pub path: Option<PathBuf>,
    /// Configuration file (overrides discovery of `warpedit.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Also read commands (`find PAT`, `goto N`, `quit`, ...) from stdin,
    /// one per line.
    #[arg(long = "commands-from-stdin")]
    pub commands_from_stdin: bool,
    /// Run a shell command and show its output in the transcript area.
    #[arg(long = "exec")]
    pub exec: Option<String>,
    /// Composite once against a recording server and exit.
    #[arg(long = "headless")]
    pub headless: bool,
}

struct AppStartup {
    _log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { _log_guard: None }
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("warpedit.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "warpedit.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        if tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
            .is_ok()
        {
            self._log_guard = Some(guard);
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }

    /// Open the document and load its first block so the initial composite
    /// has text.
    fn load_document(args: &Args, block: usize) -> Result<(LineStore, core_model::DocId)> {
        let mut store = LineStore::new();
        let doc = match args.path.as_deref() {
            Some(path) => store.open_file(path)?,
            None => store.open_text("*welcome*", WELCOME),
        };
        let first = store.read_ahead(doc, block)?;
        info!(
            target: "runtime.startup",
            doc = store.name(doc),
            lines = first.total,
            eof = first.eof,
            "document_loaded"
        );
        Ok((store, doc))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut startup = AppStartup::new();
    startup.configure_logging()?;
    AppStartup::install_panic_hook();
    info!(target: "runtime", "startup");

    let mut config = load_from(args.config.clone())?;
    let (mut store, doc) = AppStartup::load_document(&args, config.file.idle.read_ahead_block)?;
    let transcript = args.exec.is_some().then(|| store.new_transcript());
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAP);

    if args.headless {
        let factory = HeadlessFactory::default();
        config.apply_context(ConfigContext::new(1024, 768));
        let mut rt = Runtime::new(config, store, doc, transcript, factory, tx, rx);
        rt.open_session(None)?;
        let reason = rt.smoke().await;
        let ops: usize = rt.factory().handles().iter().map(|h| h.ops().len()).sum();
        info!(target: "runtime", %reason, ops, "headless_complete");
        return Ok(());
    }

    let mut registry = EventSourceRegistry::new();
    let mut child = None;
    if let Some(cmd) = args.exec.as_deref() {
        let mut spawned = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn `{cmd}`"))?;
        if let Some(out) = spawned.stdout.take() {
            registry.register(ChildTransportSource::new(out));
        }
        child = Some(spawned);
    }
    if args.commands_from_stdin {
        registry.register(CommandSource::new(BufReader::new(tokio::io::stdin())));
    }

    let (width, height) = crossterm::terminal::size().context("query terminal size")?;
    let (width, height) = (u32::from(width), u32::from(height));
    config.apply_context(ConfigContext::new(width, height));
    let mut guard = TerminalGuard::enter()?;

    let routes = Routes::shared(width, height);
    let screen = TermScreen::shared(routes.clone());
    let factory = TermFactory::new(screen.clone(), routes.clone());
    let mut rt = Runtime::new(config, store, doc, transcript, factory, tx.clone(), rx);
    // The keyboard stays live alongside piped commands; crossterm reads the
    // controlling terminal when stdin is not one.
    let (task, shutdown) = spawn_term_input(tx.clone(), routes, screen);
    rt.attach_input(task, shutdown);
    rt.attach_sources(registry.spawn_all(&tx));
    if let Some(child) = child {
        rt.attach_child(child);
    }
    drop(tx);

    rt.open_session(None)?;
    let reason = rt.run().await;
    guard.leave()?;
    info!(
        target: "runtime",
        %reason,
        sessions = rt.sessions().len(),
        lines = rt.store().line_count(doc),
        "exit"
    );
    Ok(())
}
