//! zitadel-access-operator - protect Kubernetes applications with Zitadel and Cloudflare Access

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;

use zitadel_access_operator::config::{
    token_from_env, OperatorConfig, CLOUDFLARE_TOKEN_ENV, ZITADEL_TOKEN_ENV,
};
use zitadel_access_operator::controller::{error_policy, reconcile, Context};
use zitadel_access_operator::crd::SecuredApplication;
use zitadel_access_operator::health::{bind_probes, serve_probes, Readiness};
use zitadel_access_operator::leader_election::{
    replica_identity, LeaderElector, LeaderGuard, DEFAULT_LEASE_NAME,
};
use zitadel_access_operator::telemetry::{init_logging, LogFormat};
use zitadel_access_operator::{
    DEFAULT_PROBE_ADDR, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESYNC_INTERVAL_SECS,
    DEFAULT_SESSION_DURATION, FIELD_MANAGER,
};

/// Kubernetes operator that protects applications with Zitadel OIDC and Cloudflare Access
///
/// Tokens are read from ZITADEL_TOKEN and CLOUDFLARE_API_TOKEN only.
#[derive(Parser, Debug)]
#[command(name = "zitadel-access-operator", version, about, long_about = None)]
struct Cli {
    /// Print the SecuredApplication CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Server-side apply the CRD before starting the controller
    #[arg(long, env = "INSTALL_CRD")]
    install_crd: bool,

    /// Base URL of the Zitadel instance
    #[arg(long, env = "ZITADEL_URL", required_unless_present = "crd")]
    zitadel_url: Option<String>,

    /// Cloudflare account owning the Access applications
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID", required_unless_present = "crd")]
    cloudflare_account_id: Option<String>,

    /// Cloudflare Access identity provider configured for Zitadel
    #[arg(long, env = "CLOUDFLARE_IDP_ID", required_unless_present = "crd")]
    cloudflare_idp_id: Option<String>,

    /// Access application session duration
    #[arg(long, env = "SESSION_DURATION", default_value = DEFAULT_SESSION_DURATION)]
    session_duration: String,

    /// Only watch SecuredApplications in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Address for the /healthz and /readyz probes
    #[arg(long, env = "PROBE_ADDR", default_value = DEFAULT_PROBE_ADDR)]
    probe_addr: SocketAddr,

    /// Seconds between full resyncs of every SecuredApplication
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = DEFAULT_RESYNC_INTERVAL_SECS)]
    resync_interval_secs: u64,

    /// Timeout in seconds for each Zitadel and Cloudflare request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Run the controller only while holding the leader Lease
    #[arg(long, env = "LEADER_ELECT")]
    leader_elect: bool,

    /// Name of the leader Lease
    #[arg(long, env = "LEADER_ELECTION_ID", default_value = DEFAULT_LEASE_NAME)]
    leader_election_id: String,

    /// Namespace of the leader Lease; defaults to the client's namespace
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE")]
    leader_election_namespace: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    /// Turn flags and token variables into a validated configuration
    fn operator_config(&self) -> anyhow::Result<OperatorConfig> {
        let required = |value: &Option<String>, flag: &str| {
            value
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--{flag} is required"))
        };

        let mut config = OperatorConfig::new(
            required(&self.zitadel_url, "zitadel-url")?,
            token_from_env(ZITADEL_TOKEN_ENV)?,
            required(&self.cloudflare_account_id, "cloudflare-account-id")?,
            token_from_env(CLOUDFLARE_TOKEN_ENV)?,
            required(&self.cloudflare_idp_id, "cloudflare-idp-id")?,
        );
        config.reconcile.session_duration = self.session_duration.clone();
        config.namespace = self.namespace.clone();
        config.resync_interval = Duration::from_secs(self.resync_interval_secs);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&SecuredApplication::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_logging(cli.log_format);

    let config = cli.operator_config()?;
    tracing::info!(?config, "Starting zitadel-access-operator");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if cli.install_crd {
        ensure_crd_installed(&client).await?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    // A taken probe port aborts startup
    let listener = bind_probes(cli.probe_addr).await?;
    let readiness = Readiness::default();
    let probes = tokio::spawn(watch_probes(listener, readiness.clone(), cancel.clone()));
    readiness.set_ready();

    let mut leadership = None;
    if cli.leader_elect {
        let namespace = cli
            .leader_election_namespace
            .clone()
            .unwrap_or_else(|| client.default_namespace().to_string());
        let elector = Arc::new(LeaderElector::new(
            client.clone(),
            &cli.leader_election_id,
            &namespace,
            &replica_identity(),
        ));
        tracing::info!(identity = %elector.identity(), lease = %cli.leader_election_id, "Leader election enabled");

        tokio::select! {
            guard = elector.acquire() => {
                let mut guard = guard?;
                let lost = guard_lost(&mut guard, cancel.clone());
                leadership = Some((guard, lost));
            }
            _ = cancel.cancelled() => {
                tracing::info!("Shutdown before leadership was acquired");
            }
        }
    }

    let mut lost_leadership = false;
    if !cancel.is_cancelled() {
        run_controller(client, config, cancel.clone()).await?;
    }
    cancel.cancel();

    if let Some((guard, lost)) = leadership {
        lost_leadership = lost.await.unwrap_or(false);
        if !lost_leadership {
            if let Err(e) = guard.release_leadership().await {
                tracing::warn!(error = %e, "Failed to release leadership");
            }
        }
    }

    let probe_failed = match probes.await {
        Ok(failed) => failed,
        Err(e) => {
            tracing::error!(error = %e, "Probe server task panicked");
            true
        }
    };

    tracing::info!("Shutting down");
    if lost_leadership {
        anyhow::bail!("leadership lost");
    }
    if probe_failed {
        anyhow::bail!("probe server failed");
    }
    Ok(())
}

/// Serve the probes; a failure cancels the operator instead of going unnoticed.
///
/// Resolves to true if the server failed.
async fn watch_probes(
    listener: tokio::net::TcpListener,
    readiness: Readiness,
    cancel: CancellationToken,
) -> bool {
    match serve_probes(listener, readiness, cancel.clone()).await {
        Ok(()) => false,
        Err(e) => {
            tracing::error!(error = %e, "Probe server failed, shutting down");
            cancel.cancel();
            true
        }
    }
}

/// Cancel the operator when leadership is lost.
///
/// The returned task resolves to true if leadership was lost, false if the
/// operator shut down first.
fn guard_lost(guard: &mut LeaderGuard, cancel: CancellationToken) -> tokio::task::JoinHandle<bool> {
    let lost = guard.lost_signal();
    tokio::spawn(async move {
        tokio::select! {
            _ = lost => {
                tracing::error!("Leadership lost, stopping controller");
                cancel.cancel();
                true
            }
            _ = cancel.cancelled() => false,
        }
    })
}

/// Watch SecuredApplications (and the objects they own) until shutdown
async fn run_controller(
    client: Client,
    config: OperatorConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (apps, secrets, ingresses): (Api<SecuredApplication>, Api<Secret>, Api<Ingress>) =
        match &config.namespace {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            ),
            None => (
                Api::all(client.clone()),
                Api::all(client.clone()),
                Api::all(client.clone()),
            ),
        };

    let resync = IntervalStream::new(tokio::time::interval(config.resync_interval)).map(|_| ());
    let shutdown = cancel.clone();
    let ctx = Arc::new(
        Context::builder(client, config)
            .cancellation(cancel)
            .build()?,
    );

    tracing::info!("Starting SecuredApplication controller");

    Controller::new(apps, WatcherConfig::default())
        .owns(secrets, WatcherConfig::default())
        .owns(ingresses, WatcherConfig::default())
        .reconcile_all_on(resync)
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Controller stopped");
    Ok(())
}

/// Cancel the controller and in-flight passes on SIGINT or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    tracing::info!("Shutdown signal received, cancelling in-flight reconciliations");
    cancel.cancel();
}

/// Ensure the SecuredApplication CRD is installed
///
/// Server-side apply keeps the installed schema in step with the operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing SecuredApplication CRD...");
    crds.patch(
        "securedapplications.access.twiechert.de",
        &params,
        &Patch::Apply(&SecuredApplication::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install SecuredApplication CRD: {}", e))?;

    tracing::info!("SecuredApplication CRD installed/updated");
    Ok(())
}
