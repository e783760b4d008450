use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use homeflow_core::{Context, ExecutionEvent, FlowDesc, FunctionArguments, OperatorIO, StepDesc};
use homeflow_runtime::{EngineConfig, FlowEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "homeflow")]
#[command(about = "Home automation flow engine", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of stored flows, overrides the configuration file
    #[arg(short, long, global = true)]
    flows_dir: Option<PathBuf>,

    /// Show debug logs and execution events
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Main arguments and input of a run
#[derive(Args)]
struct RunInput {
    /// Argument as key=value, may be repeated
    #[arg(short, long = "arg")]
    args: Vec<String>,

    /// Main input; JSON is passed as an object, anything else as text
    #[arg(short, long)]
    input: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a stored flow
    Run {
        /// Flow id
        id: String,

        #[command(flatten)]
        input: RunInput,
    },

    /// Execute a flow file without storing it
    RunFile {
        /// Path to flow JSON file
        file: PathBuf,

        #[command(flatten)]
        input: RunInput,
    },

    /// Call a single operator function
    Call {
        operator: String,
        function: String,

        #[command(flatten)]
        input: RunInput,
    },

    /// Execute all flows matching the tags.
    ///
    /// Every argument is a group that must match; alternatives within a
    /// group are separated by ",".
    ByTag {
        #[arg(required = true)]
        groups: Vec<String>,

        #[command(flatten)]
        input: RunInput,
    },

    /// Check stored flows against the registered operators
    Check {
        /// Flow id; all flows when omitted
        id: Option<String>,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List stored flows
    List {
        /// Only flows with all of these tags
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Store a flow file
    Add {
        /// Path to flow JSON file
        file: PathBuf,

        /// Flow id; defaults to the file name
        #[arg(long)]
        id: Option<String>,

        /// Replace an existing flow
        #[arg(long)]
        overwrite: bool,
    },

    /// Delete a stored flow
    Delete {
        /// Flow id
        id: String,
    },

    /// List available operators and their functions
    Operators,

    /// Start all operators and run until stopped
    Serve,

    /// Create an example flow file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Run { id, input } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            let (args, input) = input.parse()?;
            let output = with_events(engine, cli.global.verbose, |engine, ctx| async move {
                engine.execute_flow(&ctx, &id, args, input).await
            })
            .await;
            print_output(output)?;
        }

        Commands::RunFile { file, input } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            let desc = load_desc(&file)?;
            let id = flow_id_from_path(&file)?;
            let (args, input) = input.parse()?;
            let output = with_events(engine, cli.global.verbose, |engine, ctx| async move {
                engine.execute_ad_hoc_flow(&ctx, &id, desc, args, input).await
            })
            .await;
            print_output(output)?;
        }

        Commands::Call {
            operator,
            function,
            input,
        } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            let (args, input) = input.parse()?;
            let output = with_events(engine, cli.global.verbose, |engine, ctx| async move {
                engine
                    .execute_operator(&ctx, &operator, &function, args, input)
                    .await
            })
            .await;
            print_output(output)?;
        }

        Commands::ByTag { groups, input } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            let groups = parse_tag_groups(&groups);
            let (args, input) = input.parse()?;
            let output = with_events(engine, cli.global.verbose, |engine, ctx| async move {
                engine
                    .execute_flow_by_tag_groups(&ctx, &groups, args, input)
                    .await
            })
            .await;
            print_output(output)?;
        }

        Commands::Check { id } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            check_flows(&engine, id)?;
        }

        Commands::Validate { file } => {
            validate_flow(&cli.global, &file)?;
        }

        Commands::List { tags } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            list_flows(&engine, &tags);
        }

        Commands::Add {
            file,
            id,
            overwrite,
        } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            require_store(&engine)?;
            let desc = load_desc(&file)?;
            let id = match id {
                Some(id) => id,
                None => flow_id_from_path(&file)?,
            };
            engine
                .add_flow(&Context::new("cli"), &id, desc, overwrite)
                .await?;
            println!("✅ Stored flow \"{}\"", id);
        }

        Commands::Delete { id } => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            require_store(&engine)?;
            engine.delete_flow(&Context::new("cli"), &id).await?;
            println!("🗑️  Deleted flow \"{}\"", id);
        }

        Commands::Operators => {
            let engine = build_engine(&cli.global, CancellationToken::new())?;
            list_operators(&engine);
        }

        Commands::Serve => {
            serve(&cli.global).await?;
        }

        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(global: &GlobalArgs) -> Result<EngineConfig> {
    let mut config = match &global.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Cannot read configuration {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &global.flows_dir {
        config.flows_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Engine with the standard operators registered
fn build_engine(global: &GlobalArgs, shutdown: CancellationToken) -> Result<Arc<FlowEngine>> {
    let engine = FlowEngine::new(load_config(global)?, shutdown)?;
    homeflow_operators::register_all(&engine);
    Ok(engine)
}

fn require_store(engine: &FlowEngine) -> Result<()> {
    if engine.config().flows_dir.is_none() {
        bail!("No flow directory configured, use --flows-dir or set flows_dir in the configuration");
    }
    Ok(())
}

impl RunInput {
    fn parse(self) -> Result<(FunctionArguments, OperatorIO)> {
        Ok((parse_args(&self.args)?, parse_input(self.input)))
    }
}

fn parse_args(pairs: &[String]) -> Result<FunctionArguments> {
    let mut args = FunctionArguments::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Argument \"{}\" is not of the form key=value", pair);
        };
        args.append(key.trim(), value);
    }
    Ok(args)
}

fn parse_input(input: Option<String>) -> OperatorIO {
    match input {
        None => OperatorIO::empty(),
        Some(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                OperatorIO::object(value)
            }
            _ => OperatorIO::plain(text),
        },
    }
}

fn parse_tag_groups(groups: &[String]) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|group| {
            group
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .collect()
}

fn load_desc(file: &Path) -> Result<FlowDesc> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let desc = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a flow description", file.display()))?;
    Ok(desc)
}

fn flow_id_from_path(file: &Path) -> Result<String> {
    file.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .with_context(|| format!("Cannot derive a flow id from {}", file.display()))
}

/// Runs `run` and, in verbose mode, prints execution events while it runs
async fn with_events<F, Fut>(engine: Arc<FlowEngine>, verbose: bool, run: F) -> OperatorIO
where
    F: FnOnce(Arc<FlowEngine>, Context) -> Fut,
    Fut: std::future::Future<Output = OperatorIO>,
{
    let ctx = Context::new("cli");
    if !verbose {
        return run(engine, ctx).await;
    }

    let mut events = engine.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });
    let output = run(engine, ctx).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    printer.abort();
    output
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::FlowStarted { flow_id, .. } => println!("▶️  Flow {} started", flow_id),
        ExecutionEvent::StepFinished {
            step,
            operator,
            function,
            error,
            ..
        } => match error {
            Some(error) => println!("  ❌ {} ({}.{}) failed: {}", step, operator, function, error),
            None => println!("  ✅ {} ({}.{})", step, operator, function),
        },
        ExecutionEvent::FlowFinished { flow_id, .. } => println!("⏹️  Flow {} finished", flow_id),
        ExecutionEvent::FlowsChanged { added, removed, .. } => {
            println!("🔄 Flows changed, added {:?}, removed {:?}", added, removed)
        }
        ExecutionEvent::AlertRaised {
            name,
            category,
            message,
            ..
        } => println!("⚠️  Alert {}.{}: {}", category, name, message),
        ExecutionEvent::AlertReset { name, category, .. } => {
            println!("🔕 Alert {}.{} reset", category, name)
        }
    }
}

fn print_output(output: OperatorIO) -> Result<()> {
    if let Some(message) = output.error_message() {
        bail!("Error {}: {}", output.status_code(), message);
    }
    if output.is_object() {
        println!("{}", serde_json::to_string_pretty(&output.to_json())?);
    } else if !output.is_empty() {
        println!("{}", output.get_string());
    }
    Ok(())
}

fn check_flows(engine: &FlowEngine, id: Option<String>) -> Result<()> {
    let ids = match id {
        Some(id) => vec![id],
        None => engine.all_flow_descs().into_keys().collect(),
    };

    let mut failed = 0;
    for id in &ids {
        let result = engine.check_flow(id);
        match result.error_message() {
            Some(message) => {
                failed += 1;
                println!("❌ {}: {}", id, message);
            }
            None => println!("✅ {}", id),
        }
    }
    if failed > 0 {
        bail!("{} of {} flows are invalid", failed, ids.len());
    }
    Ok(())
}

fn validate_flow(global: &GlobalArgs, file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let desc = load_desc(file)?;
    let id = flow_id_from_path(file)?;
    let engine = build_engine(global, CancellationToken::new())?;
    let complete = engine.check_flow_desc(&desc, &id)?;

    println!("✅ Flow is valid:");
    println!("   Name: {}", complete.display_name);
    println!("   Steps: {}", complete.steps.len());
    if !complete.output_from.is_empty() {
        println!("   Output from: {}", complete.output_from);
    }
    if !complete.tags.is_empty() {
        println!("   Tags: {}", complete.tags.join(", "));
    }
    Ok(())
}

fn list_flows(engine: &FlowEngine, tags: &[String]) {
    let flows = if tags.is_empty() {
        engine.all_flow_descs()
    } else {
        engine.flow_descs_by_tag(tags)
    };
    if flows.is_empty() {
        println!("No flows found");
        return;
    }

    println!("📋 Flows:");
    for (id, desc) in &flows {
        let name = if desc.display_name.is_empty() {
            id.as_str()
        } else {
            desc.display_name.as_str()
        };
        println!("  • {} ({}), {} steps", id, name, desc.steps.len());
        if !desc.tags.is_empty() {
            println!("    tags: {}", desc.tags.join(", "));
        }
    }
}

fn list_operators(engine: &FlowEngine) {
    println!("📦 Available Operators:");
    println!();
    for name in engine.operator_names() {
        let Some(operator) = engine.operator(&name) else {
            continue;
        };
        println!("  • {}", name);
        for function in operator.functions() {
            let args = operator.possible_args(&function);
            if args.is_empty() {
                println!("    - {}", function);
            } else {
                println!("    - {} ({})", function, args.join(", "));
            }
        }
    }
}

/// Runs until ctrl-c or `system.shutdown`; `system.reload` rebuilds the
/// engine from its configuration and stored flows
async fn serve(global: &GlobalArgs) -> Result<()> {
    loop {
        let shutdown = CancellationToken::new();
        let engine = build_engine(global, shutdown.clone())?;
        let ctx = Context::new("serve");
        engine.start_listening(&ctx).await;
        tracing::info!(
            "Serving {} flows with {} operators",
            engine.all_flow_descs().len(),
            engine.operator_names().len()
        );

        let interrupted = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Cannot listen for ctrl-c")?;
                true
            }
            _ = shutdown.cancelled() => false,
        };

        engine.shutdown(&ctx).await;
        if interrupted || !engine.reload_requested() {
            tracing::info!("Stopped");
            return Ok(());
        }
        tracing::info!("Reloading");
    }
}

fn create_example_flow(output: &Path) -> Result<()> {
    let desc = FlowDesc::new(vec![
        StepDesc::new("time", "now").with_name("now"),
        StepDesc::new("json", "build")
            .with_name("status")
            .with_arg("time", "${now}")
            .with_main_args(),
        StepDesc::new("debug", "log")
            .with_name("log")
            .with_input_from("status")
            .with_arg("message", "Status collected"),
    ])
    .with_output_from("log")
    .with_tags(["example", "room:kitchen"]);

    let json = serde_json::to_string_pretty(&desc)?;
    std::fs::write(output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  homeflow run-file {} --arg room=kitchen", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_arguments() {
        let args = parse_args(&["room=kitchen".into(), "Room=hall".into(), "q=a=b".into()]).unwrap();
        assert_eq!(args.get_all("room"), ["kitchen", "hall"]);
        assert_eq!(args.get("q"), Some("a=b"));
        assert!(parse_args(&["broken".into()]).is_err());
    }

    #[test]
    fn json_input_becomes_an_object() {
        assert!(parse_input(Some(r#"{"a": 1}"#.into())).is_object());
        assert_eq!(parse_input(Some("42".into())), OperatorIO::plain("42"));
        assert!(parse_input(None).is_empty());
    }

    #[test]
    fn tag_groups_split_on_commas() {
        let groups = parse_tag_groups(&["light, climate".into(), "room:kitchen".into()]);
        assert_eq!(groups, vec![vec!["light", "climate"], vec!["room:kitchen"]]);
    }

    #[tokio::test]
    async fn example_flow_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.json");
        create_example_flow(&path).unwrap();

        let global = GlobalArgs {
            config: None,
            flows_dir: None,
            verbose: false,
        };
        let engine = build_engine(&global, CancellationToken::new()).unwrap();
        let desc = load_desc(&path).unwrap();
        let output = engine
            .execute_ad_hoc_flow(
                &Context::new("test"),
                "example",
                desc,
                FunctionArguments::single("room", "kitchen"),
                OperatorIO::empty(),
            )
            .await;

        let map = output.get_args_map().unwrap();
        assert_eq!(map["room"], "kitchen");
        assert!(!map["time"].is_empty());
    }
}
