//! xprovider CLI entrypoint.
//!
//! Each invocation is one scheduling round: it runs at most one pass per
//! resource and reports through the exit code whether a retry is worthwhile.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use xprovider::cli::{Cli, Commands, OutputFormatter, ResourceSummary};
use xprovider::config::{
    ConfigParser, ConfigValidator, Manifest, ProviderConfig, apply_env_overrides,
    find_config_file, load_manifests,
};
use xprovider::error::{ProviderError, Result, StoreError};
use xprovider::kinds::{Database, KindName, Policy, Role};
use xprovider::reconciler::{ReconcileOutcome, Reconciler};
use xprovider::remote::{FileSecretStore, HttpConnector, SecretStore};
use xprovider::resource::ResourceKind;
use xprovider::store::{LocalResourceStore, ResourceStore};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code when a pass failed and a later attempt may succeed (`EX_TEMPFAIL`).
const EXIT_RETRYABLE: u8 = 75;

/// Secrets file used when the configuration names none.
const DEFAULT_SECRETS_FILE: &str = "secrets.yaml";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code_for(&e)
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn exit_code_for(error: &ProviderError) -> ExitCode {
    if error.is_retryable() {
        ExitCode::from(EXIT_RETRYABLE)
    } else {
        ExitCode::FAILURE
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { file } => cmd_validate(&config, file.as_deref(), &formatter),
        Commands::Apply { file, no_reconcile } => {
            let provider = Provider::new(config)?;
            provider.apply(&file, no_reconcile, &formatter).await
        }
        Commands::Reconcile { kind, name } => {
            let provider = Provider::new(config)?;
            Ok(provider.reconcile_and_report(kind, &name, &formatter).await)
        }
        Commands::Delete { kind, name } => {
            let provider = Provider::new(config)?;
            provider.request_deletion(kind, &name).await?;
            Ok(provider.reconcile_and_report(kind, &name, &formatter).await)
        }
        Commands::Get { kind, name } => {
            let store = open_store(&config);
            let output = match kind {
                KindName::Role => get_resource::<Role>(&store, kind, &name, &formatter).await?,
                KindName::Policy => get_resource::<Policy>(&store, kind, &name, &formatter).await?,
                KindName::Database => {
                    get_resource::<Database>(&store, kind, &name, &formatter).await?
                }
            };
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { kind: only } => {
            let store = open_store(&config);
            let mut summaries = Vec::new();
            for kind in KindName::ALL.into_iter().filter(|k| only.is_none_or(|o| o == *k)) {
                match kind {
                    KindName::Role => summaries.extend(summarize::<Role>(&store, kind).await?),
                    KindName::Policy => summaries.extend(summarize::<Policy>(&store, kind).await?),
                    KindName::Database => {
                        summaries.extend(summarize::<Database>(&store, kind).await?);
                    }
                }
            }
            println!("{}", formatter.format_status(&summaries));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads the provider configuration.
///
/// An explicit path must exist. Without one, the configuration file is
/// searched for and the defaults apply when none is found.
fn load_config(path: Option<&Path>) -> Result<ProviderConfig> {
    let config_file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir()?;
            find_config_file(&cwd).ok()
        }
    };

    match config_file {
        Some(config_file) => {
            let parser = ConfigParser::new()
                .with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
            parser.load_dotenv()?;
            parser.load_with_env(&config_file)
        }
        None => {
            debug!("No configuration file found, using defaults");
            ConfigParser::new().load_dotenv()?;
            let mut config = ProviderConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            Ok(config)
        }
    }
}

fn open_store(config: &ProviderConfig) -> LocalResourceStore {
    LocalResourceStore::with_base_dir(&config.store.path)
}

/// Validate configuration and, optionally, a manifest file.
fn cmd_validate(
    config: &ProviderConfig,
    file: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let validator = ConfigValidator::new();
    let mut result = validator.validate(config)?;

    let mut resources = 0;
    if let Some(file) = file {
        let manifests = load_manifests(file)?;
        let manifest_result = validator.validate_manifests(&manifests)?;
        result.warnings.extend(manifest_result.warnings);
        resources = manifests.len();
    }

    println!("{}", formatter.format_validation(&result, resources));
    Ok(ExitCode::SUCCESS)
}

async fn get_resource<K: ResourceKind>(
    store: &LocalResourceStore,
    kind: KindName,
    name: &str,
    formatter: &OutputFormatter,
) -> Result<String> {
    let resource = ResourceStore::<K>::get(store, name).await?;
    Ok(formatter.format_resource::<K>(kind, &resource))
}

async fn summarize<K: ResourceKind>(
    store: &LocalResourceStore,
    kind: KindName,
) -> Result<Vec<ResourceSummary>> {
    let resources = ResourceStore::<K>::list(store).await?;
    Ok(resources
        .iter()
        .map(|r| ResourceSummary::of::<K>(kind, r))
        .collect())
}

/// Store, connection settings and cancellation shared by every pass.
struct Provider {
    config: ProviderConfig,
    store: Arc<LocalResourceStore>,
    secrets: Arc<dyn SecretStore>,
    cancel: CancellationToken,
}

impl Provider {
    fn new(config: ProviderConfig) -> Result<Self> {
        let result = ConfigValidator::new().validate(&config)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        let secrets_file = config
            .secrets_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_FILE));

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling in-flight calls");
                on_signal.cancel();
            }
        });

        Ok(Self {
            store: Arc::new(open_store(&config)),
            secrets: Arc::new(FileSecretStore::new(secrets_file)),
            config,
            cancel,
        })
    }

    fn reconciler<K: ResourceKind>(&self) -> Reconciler<K> {
        let connector = HttpConnector::new(
            Arc::clone(&self.secrets),
            self.config.credentials.clone(),
            self.config.endpoint.clone(),
        );
        let store: Arc<dyn ResourceStore<K>> = self.store.clone();
        Reconciler::new(store, Arc::new(connector)).with_call_timeout(self.config.call_timeout())
    }

    async fn reconcile(&self, kind: KindName, name: &str) -> Result<ReconcileOutcome> {
        let cancel = self.cancel.clone();
        match kind {
            KindName::Role => self.reconciler::<Role>().reconcile(name, cancel).await,
            KindName::Policy => self.reconciler::<Policy>().reconcile(name, cancel).await,
            KindName::Database => self.reconciler::<Database>().reconcile(name, cancel).await,
        }
    }

    async fn reconcile_and_report(
        &self,
        kind: KindName,
        name: &str,
        formatter: &OutputFormatter,
    ) -> ExitCode {
        let result = self.reconcile(kind, name).await;
        println!("{}", formatter.format_outcome(kind, name, &result));
        match result {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => exit_code_for(&e),
        }
    }

    async fn request_deletion(&self, kind: KindName, name: &str) -> Result<()> {
        match kind {
            KindName::Role => self.mark_deleted::<Role>(name).await,
            KindName::Policy => self.mark_deleted::<Policy>(name).await,
            KindName::Database => self.mark_deleted::<Database>(name).await,
        }
    }

    async fn mark_deleted<K: ResourceKind>(&self, name: &str) -> Result<()> {
        let mut resource = ResourceStore::<K>::get(self.store.as_ref(), name).await?;
        resource.metadata.deletion_requested = true;
        ResourceStore::<K>::update(self.store.as_ref(), &resource).await?;
        info!("Marked {} '{name}' for deletion", K::KIND);
        Ok(())
    }

    async fn store_manifest<K: ResourceKind>(&self, manifest: &Manifest) -> Result<()> {
        let store = self.store.as_ref();
        let existing = match ResourceStore::<K>::get(store, &manifest.metadata.name).await {
            Ok(resource) => Some(resource),
            Err(ProviderError::Store(StoreError::NotFound { .. })) => None,
            Err(e) => return Err(e),
        };
        let resource = manifest.apply_to::<K>(existing)?;
        ResourceStore::<K>::update(store, &resource).await
    }

    /// Stores every manifest in `file`, then runs one pass for each.
    async fn apply(
        &self,
        file: &Path,
        no_reconcile: bool,
        formatter: &OutputFormatter,
    ) -> Result<ExitCode> {
        let manifests = load_manifests(file)?;
        ConfigValidator::new().validate_manifests(&manifests)?;

        for manifest in &manifests {
            match manifest.kind {
                KindName::Role => self.store_manifest::<Role>(manifest).await?,
                KindName::Policy => self.store_manifest::<Policy>(manifest).await?,
                KindName::Database => self.store_manifest::<Database>(manifest).await?,
            }
            info!("Stored {} '{}'", manifest.kind, manifest.metadata.name);
        }

        if no_reconcile {
            return Ok(ExitCode::SUCCESS);
        }

        let mut fatal = false;
        let mut retryable = false;
        for manifest in &manifests {
            if self.cancel.is_cancelled() {
                retryable = true;
                break;
            }
            let name = &manifest.metadata.name;
            let result = self.reconcile(manifest.kind, name).await;
            println!("{}", formatter.format_outcome(manifest.kind, name, &result));
            if let Err(e) = result {
                if e.is_retryable() {
                    retryable = true;
                } else {
                    fatal = true;
                }
            }
        }

        Ok(if fatal {
            ExitCode::FAILURE
        } else if retryable {
            ExitCode::from(EXIT_RETRYABLE)
        } else {
            ExitCode::SUCCESS
        })
    }
}
