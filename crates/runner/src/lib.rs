//! Runs the long-lived processes of a service and shuts them down together.
//!
//! - Named app processes run concurrently on a shared [`CancellationToken`]
//! - SIGINT/SIGTERM or the first process error cancels every process
//! - Closers run afterwards, concurrently, under a timeout
//!
//! # Example
//!
//! ```no_run
//! use sensor_fusion_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type BoxedResultFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// An app process: takes the shared cancellation token and runs until it is cancelled or fails
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// Cleanup function run once every app process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every process stopped without error
    Clean,
    /// A process failed or panicked; carries the process name and the error
    Failed { process: String, error: anyhow::Error },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Failed { .. } => 1,
        }
    }
}

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// New runner with a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an unnamed app process. Equivalent to [`Runner::with_named_process`]
    /// with a generated name.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds an app process. The name shows up in logs and in [`RunOutcome::Failed`].
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds a closer. All closers are attempted even if some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally controlled cancellation token
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until shutdown, then exit the process with 0 on a clean stop or 1 on failure
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token);

        let outcome = self.run_until_stopped().await;
        match &outcome {
            RunOutcome::Clean => info!("application exiting normally"),
            RunOutcome::Failed { process, error } => {
                error!(process = %process, "application exiting with error: {:#}", error)
            }
        }
        std::process::exit(outcome.exit_code());
    }

    /// Run every process until all stop, one fails, or the token is cancelled,
    /// then run the closers. Does not install signal handlers.
    pub async fn run_until_stopped(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut outcome = RunOutcome::Clean;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, "app process error: {:#}", err);
                        outcome = RunOutcome::Failed {
                            process: name,
                            error: err,
                        };
                        token.cancel();
                    } else {
                        debug!(process = %name, "app process error after shutdown: {:#}", err);
                    }
                }
                Err(err) => {
                    error!("app process panicked: {}", err);
                    if !token.is_cancelled() {
                        outcome = RunOutcome::Failed {
                            process: "unknown".to_string(),
                            error: anyhow::anyhow!("app process panicked: {}", err),
                        };
                        token.cancel();
                    }
                }
            }
        }

        run_closers(self.closers, self.closer_timeout).await;
        outcome
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => error!("error setting up SIGTERM handler: {}", err),
        }
    });
}

async fn run_closers(closers: Vec<Closer>, closer_timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    info!(timeout_ms = closer_timeout.as_millis(), "running closers");

    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    let drain = async {
        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => debug!("closer completed"),
                Ok(Err(err)) => error!("closer error: {:#}", err),
                Err(err) => error!("closer panicked: {}", err),
            }
        }
    };

    match tokio::time::timeout(closer_timeout, drain).await {
        Ok(()) => info!("all closers completed"),
        Err(_) => error!(timeout_ms = closer_timeout.as_millis(), "closers timed out"),
    }
}
