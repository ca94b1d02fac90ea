use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mixdown_core::{
    AssetRole, FaultClass, JobError, MixPipeline, MixRequest, RenderPlan, ServiceConfig,
    TimelineInputs, ValidationPolicy, build_plan, compile,
    diagnostics::init_tracing_from_config,
    fixtures::{podcast_inputs, podcast_request},
    validate_request,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "mixdown-cli")]
#[command(about = "Plan and render voice/bed/intro/outro mixes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the render plan for a request and known durations.
    Plan {
        #[arg(long)]
        request: PathBuf,

        #[arg(long, value_parser = parse_seconds)]
        voice_seconds: f64,

        #[arg(long, value_parser = parse_seconds)]
        intro_seconds: Option<f64>,

        #[arg(long, value_parser = parse_seconds)]
        outro_seconds: Option<f64>,
    },
    /// Fetch, probe and render to a local file.
    Render {
        #[arg(long)]
        request: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
    /// Full job: render and publish to object storage.
    Run {
        #[arg(long)]
        request: PathBuf,
    },
    /// Print the plan for the built-in podcast fixture.
    DemoPlan,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _telemetry = init_tracing_from_config(&config.diagnostics, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Plan {
            request,
            voice_seconds,
            intro_seconds,
            outro_seconds,
        } => {
            let request = read_request(&request)?;
            let policy = ValidationPolicy {
                max_volume: config.mix.max_volume,
                ..ValidationPolicy::default()
            };
            validate_request(&request, &policy)?;

            let inputs = TimelineInputs {
                voice_seconds,
                has_bed: request.bed_url.is_some(),
                intro_seconds: intro_seconds.filter(|_| request.intro_url.is_some()),
                outro_seconds: outro_seconds.filter(|_| request.outro_url.is_some()),
            };
            print_plan(&request, &build_plan(&request.params, &inputs))?;
        }
        Commands::Render { request, output } => {
            let request = read_request(&request)?;
            let pipeline = MixPipeline::from_config(&config)?;
            let rendered = pipeline
                .render_to(&request, &output)
                .map_err(report_job_error)?;
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Commands::Run { request } => {
            let request = read_request(&request)?;
            let pipeline = MixPipeline::from_config(&config)?;
            let outcome = pipeline.run(&request).map_err(report_job_error)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::DemoPlan => {
            let request = podcast_request();
            print_plan(&request, &build_plan(&request.params, &podcast_inputs()))?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    match path {
        Some(path) => {
            let mut config = ServiceConfig::from_file(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => ServiceConfig::load(),
    }
}

fn read_request(path: &Path) -> anyhow::Result<MixRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse request JSON from {}", path.display()))
}

/// Remote URLs stand in for local paths so the program reads end to end.
fn print_plan(request: &MixRequest, plan: &RenderPlan) -> anyhow::Result<()> {
    let sources: BTreeMap<AssetRole, PathBuf> = request
        .present_roles()
        .into_iter()
        .filter_map(|role| {
            request
                .source_url(role)
                .map(|url| (role, PathBuf::from(url)))
        })
        .collect();
    let program = compile(&plan.graph, &sources).context("plan failed to compile")?;

    let report = json!({
        "fingerprint": plan.fingerprint(),
        "expected_duration_seconds": plan.expected_duration_seconds(),
        "shape": plan.shape,
        "effective": plan.effective,
        "segments": plan.segments,
        "inputs": program.inputs,
        "filter_complex": program.filter_graph,
        "map": program.output_selector,
        "encoding": program.encoding,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn report_job_error(job_error: JobError) -> anyhow::Error {
    error!(
        kind = job_error.kind(),
        status = job_error.status_code(),
        detail = %job_error.detail(),
        "job failed"
    );
    let context = match job_error.fault() {
        FaultClass::Client => "request could not be processed",
        FaultClass::Server => "server-side failure",
    };
    anyhow::Error::new(job_error).context(context)
}

fn parse_seconds(raw: &str) -> Result<f64, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|error| format!("not a number: {error}"))?;
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(format!("durations must be finite and >= 0, got {seconds}"))
    }
}
