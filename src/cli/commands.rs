//! CLI command definitions for planguard.
//!
//! `validate` runs the full pipeline, `check` only the static pass and
//! `types` lists what the runtime has installed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::config::{EngineConfig, DEFAULT_MAX_RETRIES, DEFAULT_MAX_STRUCTURE_REPAIRS};
use crate::engine::{
    AutomaticDecision, StaticFailureChoice, StaticFailureHandler, ValidationEngine,
    ValidationReport,
};
use crate::llm::{LiteLlmClient, LlmProvider, DEFAULT_MODEL};
use crate::plan::PlanStore;
use crate::repair::{OracleConfig, RepairOracle};
use crate::runtime::{FlowRuntime, NifiClient};
use crate::validation::{TypeCatalog, ValidationError};

/// Default plan location, relative to the working directory.
const DEFAULT_PLAN_PATH: &str = "plan.json";

/// Validate and repair generated NiFi flow plans.
#[derive(Parser)]
#[command(name = "planguard")]
#[command(about = "Validate and auto-repair generated NiFi flow plans")]
#[command(version)]
#[command(
    long_about = "planguard checks a generated flow plan (plan.json) against a live NiFi instance.\n\nEach processor is created in a sandbox process group, inspected and deleted again. Failures are repaired with an LLM when one is configured.\n\nExample usage:\n  planguard validate --plan ./plan.json --sandbox-group 0e5c7a1b-0190-1000-ffff-ffffa1b2c3d4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Print the final report as JSON.
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run static checks, then validate every processor in the sandbox.
    Validate(ValidateArgs),

    /// Run the static checks only. Type rewrites are still saved.
    Check(CheckArgs),

    /// List the processor types installed in the runtime.
    Types(TypesArgs),
}

/// Connection settings for the NiFi instance.
#[derive(clap::Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// NiFi base URL, e.g. https://localhost:8443.
    #[arg(long, env = "NIFI_BASE_URL")]
    pub nifi_url: String,

    /// Bearer token for the NiFi API.
    #[arg(long, env = "NIFI_AUTH", hide_env_values = true)]
    pub nifi_auth: Option<String>,

    /// Verify the runtime's TLS certificate.
    #[arg(long, env = "NIFI_VERIFY_SSL", default_value_t = true, action = clap::ArgAction::Set)]
    pub verify_ssl: bool,
}

/// Oracle settings.
#[derive(clap::Args, Debug, Clone)]
pub struct OracleArgs {
    /// LLM model used for repairs.
    #[arg(short = 'm', long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// OpenRouter API key. Falls back to LITELLM_API_BASE/LITELLM_API_KEY.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Never call the LLM; failures are reported as-is.
    #[arg(long)]
    pub no_repair: bool,
}

/// Non-interactive answer to a failed static pass.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticFailurePolicy {
    Abort,
    Repair,
}

/// Arguments for `planguard validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path of the plan document.
    #[arg(short, long, env = "PLAN_JSON_PATH", default_value = DEFAULT_PLAN_PATH)]
    pub plan: PathBuf,

    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(flatten)]
    pub oracle: OracleArgs,

    /// Process group that sandbox processors are created in.
    #[arg(long, env = "SANDBOX_VALIDATION_PROCESSOR_GROUP")]
    pub sandbox_group: String,

    /// Oracle-assisted retries per processor.
    #[arg(long, env = "MAX_VALIDATION_FIX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Answer static failures without prompting.
    #[arg(long, value_enum)]
    pub on_static_failure: Option<StaticFailurePolicy>,

    /// Upper bound on structure repairs with `--on-static-failure repair`.
    #[arg(long, default_value_t = DEFAULT_MAX_STRUCTURE_REPAIRS)]
    pub max_structure_repairs: u32,

    /// Shell command run after a clean validation, e.g. the flow builder.
    #[arg(long)]
    pub build_command: Option<String>,
}

/// Arguments for `planguard check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Path of the plan document.
    #[arg(short, long, env = "PLAN_JSON_PATH", default_value = DEFAULT_PLAN_PATH)]
    pub plan: PathBuf,

    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// Arguments for `planguard types`.
#[derive(Parser, Debug)]
pub struct TypesArgs {
    /// Case-insensitive substring filter.
    pub filter: Option<String>,

    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run a parsed command line.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Validate(args) => run_validate_command(args, cli.json).await,
        Commands::Check(args) => run_check_command(args, cli.json).await,
        Commands::Types(args) => run_types_command(args, cli.json).await,
    }
}

fn build_runtime(args: &RuntimeArgs) -> anyhow::Result<Arc<dyn FlowRuntime>> {
    if !args.verify_ssl {
        warn!("TLS certificate verification is disabled");
    }
    let client = NifiClient::new(args.nifi_url.clone(), args.nifi_auth.clone(), args.verify_ssl)
        .map_err(|e| anyhow::anyhow!("Failed to initialize NiFi client: {}", e))?;
    info!(base_url = %client.base_url(), "Using NiFi runtime");
    Ok(Arc::new(client))
}

/// Picks OpenRouter when a key is given, otherwise a LiteLLM proxy from the
/// environment. Returns `None` when neither is configured.
fn build_llm_client(args: &OracleArgs) -> Option<Arc<dyn LlmProvider>> {
    if args.no_repair {
        info!("LLM repairs disabled");
        return None;
    }

    if let Some(key) = args.api_key.clone().filter(|k| !k.is_empty()) {
        match LiteLlmClient::openrouter(key, args.model.clone()) {
            Ok(client) => {
                info!(model = %args.model, "Using OpenRouter for repairs");
                return Some(Arc::new(client));
            }
            Err(e) => warn!(error = %e, "Failed to initialize OpenRouter client"),
        }
    }

    match LiteLlmClient::from_env() {
        Ok(client) => {
            info!(api_base = %client.api_base(), model = %args.model, "Using LiteLLM for repairs");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "No LLM configured; failures will not be repaired");
            None
        }
    }
}

/// Oracle settings; the model always comes from `--model`/`LLM_MODEL`.
fn oracle_config(args: &OracleArgs) -> OracleConfig {
    OracleConfig {
        model: args.model.clone(),
        ..OracleConfig::default()
    }
}

async fn run_validate_command(args: ValidateArgs, json: bool) -> anyhow::Result<ExitCode> {
    let runtime = build_runtime(&args.runtime)?;
    let config = EngineConfig::new()
        .with_max_retries(args.max_retries)
        .with_sandbox_container(args.sandbox_group.clone())
        .with_max_structure_repairs(args.max_structure_repairs);

    let mut engine = ValidationEngine::new(PlanStore::new(&args.plan), runtime, config);
    if let Some(llm) = build_llm_client(&args.oracle) {
        engine = engine.with_oracle(RepairOracle::new(llm, oracle_config(&args.oracle)));
    }

    let handler: Box<dyn StaticFailureHandler> = match args.on_static_failure {
        Some(StaticFailurePolicy::Abort) => Box::new(AutomaticDecision::abort()),
        Some(StaticFailurePolicy::Repair) => {
            Box::new(AutomaticDecision::repair(args.max_structure_repairs))
        }
        None => Box::new(PromptDecision),
    };

    let report = engine.run(handler.as_ref()).await?;
    print_report(&report, json)?;

    if !report.is_success() {
        return Ok(ExitCode::FAILURE);
    }
    if let Some(command) = &args.build_command {
        return run_build_command(command, &args.plan).await;
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_check_command(args: CheckArgs, json: bool) -> anyhow::Result<ExitCode> {
    let runtime = build_runtime(&args.runtime)?;
    let mut engine = ValidationEngine::new(PlanStore::new(&args.plan), runtime, EngineConfig::new());

    let report = engine.check().await?;
    print_report(&report, json)?;
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_types_command(args: TypesArgs, json: bool) -> anyhow::Result<ExitCode> {
    let runtime = build_runtime(&args.runtime)?;
    let catalog = TypeCatalog::from_entries(
        runtime
            .list_types()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch processor types from NiFi: {}", e))?,
    );

    let matches = match &args.filter {
        Some(filter) => catalog.matching(filter),
        None => catalog.identifiers().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    } else {
        for identifier in &matches {
            println!("{}", identifier);
        }
        println!();
        println!("{} of {} processor types", matches.len(), catalog.len());
    }
    Ok(ExitCode::SUCCESS)
}

/// Hands the validated plan to the builder.
async fn run_build_command(command: &str, plan: &std::path::Path) -> anyhow::Result<ExitCode> {
    info!(command = %command, "Running build command");
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .env("PLAN_JSON_PATH", plan)
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start build command: {}", e))?;

    if status.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(status = %status, "Build command failed");
        Ok(ExitCode::FAILURE)
    }
}

fn print_report(report: &ValidationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("=== Validation report: {} ===", report.plan_path);
    println!("Status: {:?}", report.status);
    println!("Static passes: {}", report.static_passes);
    if report.structure_repairs > 0 {
        println!("Structure repairs: {}", report.structure_repairs);
    }
    for outcome in &report.processors {
        let mark = if outcome.passed { "ok" } else { "FAILED" };
        println!(
            "  [{}] Processor[{}] '{}' ({} attempt(s), {} auto-correction(s))",
            mark, outcome.index, outcome.name, outcome.attempts, outcome.auto_corrections
        );
    }
    if report.plan_saved {
        println!("Plan updated on disk.");
    }
    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
    Ok(())
}

/// Asks the operator on stdin how to continue.
struct PromptDecision;

#[async_trait]
impl StaticFailureHandler for PromptDecision {
    async fn decide(
        &self,
        errors: &[ValidationError],
        repair_available: bool,
    ) -> StaticFailureChoice {
        let mut prompt = String::from("\nStatic validation failed:\n");
        for error in errors {
            prompt.push_str(&format!("  - {}\n", error));
        }
        prompt.push_str("Fix plan.json and press [r] to retry");
        if repair_available {
            prompt.push_str(", [a] to let the LLM repair it");
        }
        prompt.push_str(", or [e] to exit: ");

        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                return StaticFailureChoice::Abort;
            }
            let answer = match lines.next_line().await {
                Ok(Some(line)) => line,
                _ => return StaticFailureChoice::Abort,
            };
            match parse_choice(&answer, repair_available) {
                Some(choice) => return choice,
                None => prompt = "Please answer r, a or e: ".to_string(),
            }
        }
    }
}

fn parse_choice(answer: &str, repair_available: bool) -> Option<StaticFailureChoice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "r" | "retry" => Some(StaticFailureChoice::Retry),
        "a" | "repair" if repair_available => Some(StaticFailureChoice::Repair),
        "e" | "exit" | "q" => Some(StaticFailureChoice::Abort),
        _ => None,
    }
}
