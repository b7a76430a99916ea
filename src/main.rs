#![forbid(unsafe_code)]

//! `tmux-supervisor`: run and drive agent processes hosted in tmux sessions.
//!
//! `run` starts an instance on its own socket, waits for readiness, and
//! forwards stdin lines to the pane until EOF or a shutdown signal. `send`,
//! `capture`, and `stop` address an existing instance (`--id`) or a raw
//! session on the shared socket (`--session`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tmux_supervisor::control::ControlChannel;
use tmux_supervisor::input::{CoalescerOptions, InputCoalescer, OneShotSender, Sender};
use tmux_supervisor::lifecycle::{
    graceful_shutdown, CommandBackend, LifecycleOptions, OutputPatternProbe, ServerScope,
    SessionLifecycle,
};
use tmux_supervisor::models::instance::{AgentInstance, Instance, LifecycleEvent};
use tmux_supervisor::tmux::{
    global_socket, instance_socket, session_name, Multiplexer, TmuxCli,
};
use tmux_supervisor::{AppError, Result, SupervisorConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tmux-supervisor", about = "Supervise agent processes in tmux sessions", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an instance and forward stdin lines to it.
    Run(RunArgs),
    /// Deliver text, a key, or a paste block to a session.
    Send {
        #[command(flatten)]
        target: Target,
        /// Classified text (special characters become keys).
        #[arg(long, conflicts_with_all = ["key", "paste"])]
        text: Option<String>,
        /// Symbolic key name such as `Enter` or `C-c`.
        #[arg(long, conflicts_with = "paste")]
        key: Option<String>,
        /// Text wrapped in bracketed-paste markers.
        #[arg(long)]
        paste: Option<String>,
    },
    /// Print the pane contents of a session.
    Capture {
        #[command(flatten)]
        target: Target,
        /// Include this many scrollback lines.
        #[arg(long)]
        lines: Option<u32>,
    },
    /// Run the graceful-shutdown sequence for a session.
    Stop {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Instance identifier; generated when omitted.
    #[arg(long)]
    id: Option<String>,
    /// Working directory of the hosted process.
    #[arg(long, default_value = ".")]
    dir: PathBuf,
    /// Program that hosts the agent.
    #[arg(long)]
    command: String,
    /// Argument for the program; `{prompt_file}` is replaced by the prompt path.
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
    /// Task text written to the prompt file.
    #[arg(long, conflicts_with = "task_file")]
    task: Option<String>,
    /// File whose contents become the task text.
    #[arg(long)]
    task_file: Option<PathBuf>,
    /// Readiness deadline in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    ready_timeout_ms: u64,
    /// Regex the pane must match before the instance counts as ready.
    #[arg(long)]
    ready_pattern: Option<String>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Instance identifier (dedicated socket).
    #[arg(long)]
    id: Option<String>,
    /// Raw session name on the shared socket.
    #[arg(long)]
    session: Option<String>,
}

impl Target {
    /// Socket and session name this target resolves to.
    fn resolve(&self, config: &SupervisorConfig) -> (String, String) {
        match (&self.id, &self.session) {
            (Some(id), _) => (
                instance_socket(&config.socket_prefix, id),
                session_name(&config.socket_prefix, id),
            ),
            (None, Some(session)) => (global_socket(&config.socket_prefix), session.clone()),
            (None, None) => (global_socket(&config.socket_prefix), String::new()),
        }
    }

    /// Whether the resolved socket is shared with unrelated sessions.
    fn server_scope(&self) -> ServerScope {
        if self.id.is_some() {
            ServerScope::Dedicated
        } else {
            ServerScope::Shared
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match args.config {
        Some(ref path) => SupervisorConfig::load_from_path(path)?,
        None => SupervisorConfig::default(),
    };
    let mux: Arc<dyn Multiplexer> = Arc::new(TmuxCli::new(
        config.tmux_binary.clone(),
        config.command_timeout(),
    ));

    match args.command {
        Commands::Run(run_args) => run_instance(&config, mux, run_args).await,
        Commands::Send {
            target,
            text,
            key,
            paste,
        } => {
            let (socket, session) = target.resolve(&config);
            let sender: Arc<dyn Sender> = Arc::new(OneShotSender::new(mux, socket));
            let coalescer = InputCoalescer::new(sender, CoalescerOptions::from(&config));
            let result = match (text, key, paste) {
                (Some(text), _, _) => coalescer.send_input(&session, &text).await,
                (None, Some(key), _) => {
                    coalescer.send_key(&session, &key).await;
                    Ok(())
                }
                (None, None, Some(paste)) => {
                    coalescer.send_paste(&session, &paste).await;
                    Ok(())
                }
                (None, None, None) => Err(AppError::InvalidArgument(
                    "one of --text, --key, or --paste is required".into(),
                )),
            };
            coalescer.close().await;
            result
        }
        Commands::Capture { target, lines } => {
            let (socket, session) = target.resolve(&config);
            let pane = mux.capture_pane(&socket, &session, lines).await?;
            print!("{pane}");
            Ok(())
        }
        Commands::Stop { target } => {
            let (socket, session) = target.resolve(&config);
            graceful_shutdown(
                mux.as_ref(),
                &socket,
                &session,
                config.graceful_stop_timeout(),
                target.server_scope(),
            )
            .await;
            Ok(())
        }
    }
}

async fn run_instance(
    config: &SupervisorConfig,
    mux: Arc<dyn Multiplexer>,
    args: RunArgs,
) -> Result<()> {
    let id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_owned());
    let work_dir = args
        .dir
        .canonicalize()
        .map_err(|err| AppError::InvalidArgument(format!("invalid --dir: {err}")))?;
    let task = match (args.task, args.task_file) {
        (Some(task), _) => task,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| AppError::Io(format!("cannot read task file: {err}")))?,
        (None, None) => String::new(),
    };

    let backend = Arc::new(CommandBackend::new(args.command, args.args));
    let mut lifecycle =
        SessionLifecycle::new(Arc::clone(&mux), backend, LifecycleOptions::from(config));
    if let Some(pattern) = args.ready_pattern {
        let regex = Regex::new(&pattern)
            .map_err(|err| AppError::InvalidArgument(format!("invalid --ready-pattern: {err}")))?;
        lifecycle = lifecycle.with_probe(Arc::new(OutputPatternProbe::new(Arc::clone(&mux), regex)));
    }

    let ct = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(8);
    let instance = AgentInstance::new(&id, &config.socket_prefix, work_dir, task)
        .with_events(event_tx);
    let events_handle = tokio::spawn(log_lifecycle_events(event_rx, ct.clone()));

    lifecycle.start(&instance).await?;
    info!(
        instance_id = %id,
        socket = instance.socket_name(),
        session = instance.session_name(),
        "instance started"
    );

    let ready_timeout = Duration::from_millis(args.ready_timeout_ms);
    if let Err(err) = lifecycle.wait_for_ready(&instance, ready_timeout).await {
        warn!(%err, "instance did not report ready; forwarding input anyway");
    }

    let one_shot: Arc<dyn Sender> = Arc::new(OneShotSender::new(
        Arc::clone(&mux),
        instance.socket_name(),
    ));
    let control = config.persistent_control.then(|| {
        Arc::new(ControlChannel::new(
            config.tmux_binary.clone(),
            instance.socket_name(),
            instance.session_name(),
            Arc::clone(&one_shot),
        ))
    });
    let sender: Arc<dyn Sender> = match control {
        Some(ref channel) => Arc::clone(channel) as Arc<dyn Sender>,
        None => one_shot,
    };
    let coalescer = InputCoalescer::new(sender, CoalescerOptions::from(config));

    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_ct.cancel();
    });

    forward_stdin(&coalescer, instance.session_name(), &ct).await;

    coalescer.close().await;
    if let Some(channel) = control {
        channel.close().await;
    }
    lifecycle.stop(&instance).await;
    lifecycle.clear_state(&id).await;

    ct.cancel();
    let _ = events_handle.await;
    info!(instance_id = %id, "tmux-supervisor shut down");
    Ok(())
}

/// Forward stdin lines, each followed by Enter, until EOF or cancellation.
async fn forward_stdin(coalescer: &InputCoalescer, session: &str, ct: &CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = ct.cancelled() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if let Err(err) = coalescer.send_input(session, &line).await {
                    error!(%err, "failed to deliver input line");
                    continue;
                }
                coalescer.send_key(session, "Enter").await;
            }
            Ok(None) => {
                info!("stdin closed");
                break;
            }
            Err(err) => {
                error!(%err, "failed to read stdin");
                break;
            }
        }
    }
}

async fn log_lifecycle_events(mut rx: mpsc::Receiver<LifecycleEvent>, ct: CancellationToken) {
    loop {
        tokio::select! {
            () = ct.cancelled() => break,
            event = rx.recv() => match event {
                Some(LifecycleEvent::Started { instance_id }) => info!(%instance_id, "lifecycle: started"),
                Some(LifecycleEvent::Stopped { instance_id }) => info!(%instance_id, "lifecycle: stopped"),
                None => break,
            },
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
