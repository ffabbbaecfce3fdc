//! `ztna`: command-line front end for ZTNA policy bundles.
//!
//! A bundle is a JSON document with `access_policies`, `sign_in_policies`
//! and `applications`. Every subcommand reads one bundle.
//!
//! Usage:
//!   ztna check policies.json
//!   ztna evaluate-access policies.json --context request.json --config engine.toml
//!   ztna evaluate-sign-in policies.json --stage pre-auth --context request.json --geoip ranges.txt
//!   ztna compile policies.json --node-id gw-eu-1

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use ztna_contracts::{
    context::{RequestContext, Verdict},
    error::{ZtnaError, ZtnaResult},
    policy::{PolicyBundle, Stage},
};
use ztna_core::{
    codec,
    traits::{PolicyEvaluator, PolicyStore},
};
use ztna_gateway::CompileOptions;
use ztna_policy::{EngineConfig, PolicySnapshot, SnapshotHandle, TreeEvaluator};
use ztna_store::{InMemoryApplicationDirectory, InMemoryPolicyStore, RangeGeoIpResolver};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Validate, evaluate and compile ZTNA access and sign-in policies.
#[derive(Parser)]
#[command(name = "ztna", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate every policy and application in a bundle.
    Check {
        bundle: PathBuf,
    },
    /// Decide an access request against the bundle's access policies.
    EvaluateAccess {
        bundle: PathBuf,
        /// Request context as JSON.
        #[arg(long)]
        context: PathBuf,
        /// Engine TOML.
        #[arg(long)]
        config: Option<PathBuf>,
        /// IPv4 range file (`start end country` per line) used to resolve
        /// the country of `source_ip` when the context has none.
        #[arg(long)]
        geoip: Option<PathBuf>,
    },
    /// Decide a sign-in attempt against the bundle's sign-in policies.
    EvaluateSignIn {
        bundle: PathBuf,
        #[arg(long, value_enum)]
        stage: StageArg,
        #[arg(long)]
        context: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        geoip: Option<PathBuf>,
    },
    /// Compile access policies into gateway rules and print them as JSON.
    Compile {
        bundle: PathBuf,
        /// Compile for this gateway; overrides `node-id` from the config.
        #[arg(long)]
        node_id: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    PreAuth,
    PostAuth,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::PreAuth => Stage::PreAuth,
            StageArg::PostAuth => Stage::PostAuth,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug to trace every policy visit.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Check { bundle } => run_check(&bundle),
        Command::EvaluateAccess {
            bundle,
            context,
            config,
            geoip,
        } => run_evaluate(&bundle, &context, config.as_deref(), geoip.as_deref(), None),
        Command::EvaluateSignIn {
            bundle,
            stage,
            context,
            config,
            geoip,
        } => run_evaluate(
            &bundle,
            &context,
            config.as_deref(),
            geoip.as_deref(),
            Some(stage.into()),
        ),
        Command::Compile {
            bundle,
            node_id,
            config,
        } => run_compile(&bundle, node_id, config.as_deref()),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("ztna: {}", e);
            std::process::exit(2);
        }
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// Load the bundle through the validating stores. Returns false if anything
/// was rejected.
fn run_check(path: &Path) -> ZtnaResult<bool> {
    let bundle = load_bundle(path)?;
    let mut passed = true;

    for app in bundle.applications {
        let name = app.name.clone();
        match InMemoryApplicationDirectory::new().upsert(app) {
            Ok(()) => println!("ok    application  {}", name),
            Err(e) => {
                passed = false;
                println!("FAIL  application  {}", e);
            }
        }
    }

    let access = InMemoryPolicyStore::new();
    for policy in bundle.access_policies {
        let line = format!("{} [{}] {}", policy.name, policy.priority, policy.root_node);
        match access.create(policy) {
            Ok(_) => println!("ok    access       {}", line),
            Err(e) => {
                passed = false;
                println!("FAIL  access       {}", e);
            }
        }
    }

    let sign_in = InMemoryPolicyStore::new();
    for policy in bundle.sign_in_policies {
        let line = format!(
            "{} [{} {}] {}",
            policy.name, policy.stage, policy.priority, policy.root_node
        );
        match sign_in.create(policy) {
            Ok(_) => println!("ok    sign-in      {}", line),
            Err(e) => {
                passed = false;
                println!("FAIL  sign-in      {}", e);
            }
        }
    }

    Ok(passed)
}

/// Evaluate one request and print the decision. Returns false on deny.
fn run_evaluate(
    bundle_path: &Path,
    context_path: &Path,
    config_path: Option<&Path>,
    geoip_path: Option<&Path>,
    stage: Option<Stage>,
) -> ZtnaResult<bool> {
    let bundle = load_bundle(bundle_path)?;
    let config = load_config(config_path)?;
    let ctx: RequestContext = serde_json::from_str(&read(context_path)?).map_err(|e| {
        ZtnaError::ConfigError {
            reason: format!("failed to decode request context: {}", e),
        }
    })?;

    let directory = directory_for(&bundle);
    let snapshots = Arc::new(SnapshotHandle::new(PolicySnapshot::from_bundle(&bundle)));
    let mut evaluator = TreeEvaluator::new(config, snapshots, Arc::new(directory));
    if let Some(path) = geoip_path {
        evaluator = evaluator.with_geoip(Arc::new(RangeGeoIpResolver::from_file(path)?));
    }

    let decision = match stage {
        Some(stage) => evaluator.evaluate_sign_in(stage, &ctx)?,
        None => evaluator.evaluate_access(&ctx)?,
    };
    print_json(&decision)?;
    Ok(decision.verdict == Verdict::Allow)
}

fn run_compile(
    bundle_path: &Path,
    node_id: Option<String>,
    config_path: Option<&Path>,
) -> ZtnaResult<bool> {
    let bundle = load_bundle(bundle_path)?;
    let config = load_config(config_path)?;
    let options = CompileOptions {
        node_id: node_id.or(config.node_id),
        vacuous_or: config.vacuous_or,
        ..CompileOptions::default()
    };

    let directory = directory_for(&bundle);
    let compiled = ztna_gateway::compile(&bundle.access_policies, &directory, &options)?;
    print_json(&compiled)?;
    Ok(true)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn read(path: &Path) -> ZtnaResult<String> {
    std::fs::read_to_string(path).map_err(|e| ZtnaError::ConfigError {
        reason: format!("failed to read '{}': {}", path.display(), e),
    })
}

fn load_bundle(path: &Path) -> ZtnaResult<PolicyBundle> {
    let bundle = codec::decode_bundle(&read(path)?)?;
    debug!(
        access = bundle.access_policies.len(),
        sign_in = bundle.sign_in_policies.len(),
        applications = bundle.applications.len(),
        "bundle loaded"
    );
    Ok(bundle)
}

fn load_config(path: Option<&Path>) -> ZtnaResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Invalid applications are left out, so policies targeting them evaluate
/// as unresolvable.
fn directory_for(bundle: &PolicyBundle) -> InMemoryApplicationDirectory {
    let directory = InMemoryApplicationDirectory::new();
    for app in &bundle.applications {
        if let Err(e) = directory.upsert(app.clone()) {
            warn!(app_id = %app.id, error = %e, "skipping invalid application");
        }
    }
    directory
}

fn print_json<T: Serialize>(value: &T) -> ZtnaResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ZtnaError::MalformedPolicy {
        reason: format!("failed to encode output: {}", e),
    })?;
    println!("{}", json);
    Ok(())
}
