//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod ask;
pub mod config_cmd;
pub mod inspect;
pub mod prompt_args;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};

use crate::cli::ask::{run_ask, run_chat};
use crate::cli::config_cmd::run_config;
use crate::cli::inspect::{run_call, run_list_prompts, run_list_resources, run_list_tools, run_prompt, run_read};
use crate::core::config::{Config, ImagePolicy};
use crate::core::llm::OpenAiChatModel;
use crate::core::normalize::FsOutputSink;
use crate::core::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::logging::init_tracing;
use crate::mcp::transport::LaunchSpec;
use crate::utils::logging::TranscriptLog;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")\nbuilt: ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
    "\ntarget: ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

#[derive(Parser, Debug)]
#[command(name = "toolbridge")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Ask a language model questions it can answer with tools from an MCP server")]
#[command(
    long_about = "toolbridge starts an MCP server as a child process, lists the tools it offers, \
and lets a language model decide whether one of them answers your question. At most one tool \
is called per question; its result is summarized by the model.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key (the variable name can be changed with api_key_env)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  RUST_LOG          Diagnostic log filter (written to stderr)\n\n\
Examples:\n\
  toolbridge --command toolbridge-server \"What is the BMI of a 180cm tall person weighing 84kg?\"\n\
  toolbridge tools --server demo\n\
  toolbridge call calculate_sum --args '{\"a\": 2, \"b\": 3}'"
)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Question to ask (shorthand for `toolbridge ask ...`)
    #[arg(trailing_var_arg = true, value_name = "QUERY")]
    pub query: Vec<String>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append each question and answer to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Print debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// How images reach the summary model: describe or attach
    #[arg(long, global = true, value_name = "POLICY")]
    pub images: Option<ImagePolicy>,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Which server to launch.
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct ServerArgs {
    /// Configured server id
    #[arg(short = 's', long = "server", global = true, value_name = "ID")]
    pub id: Option<String>,

    /// Launch this executable instead of a configured server
    #[arg(long, global = true, value_name = "EXE", conflicts_with = "id")]
    pub command: Option<String>,

    /// Argument for --command (repeatable)
    #[arg(long = "arg", global = true, value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Answer one question (default)
    Ask {
        #[arg(required = true, trailing_var_arg = true, value_name = "QUERY")]
        query: Vec<String>,
    },
    /// Answer questions read line by line from stdin
    Chat,
    /// List the server's tools
    Tools,
    /// Call a tool directly, skipping tool selection
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, value_name = "JSON")]
        args: Option<String>,
        /// Summarize the result as an answer to this question
        #[arg(long, value_name = "QUERY")]
        query: Option<String>,
    },
    /// List the server's resources and resource templates
    Resources,
    /// Read a resource by URI
    Read {
        uri: String,
    },
    /// List the server's prompts
    Prompts,
    /// Render a prompt with key=value arguments
    Prompt {
        name: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "KEY=VALUE")]
        arguments: Vec<String>,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigCommands {
    /// Print the effective configuration (default)
    Show,
    /// Print the config file location
    Path,
    /// Write a starter configuration with the bundled demo server
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Everything a server-facing command needs.
pub struct CommandContext {
    pub config: Config,
    pub orchestrator: Orchestrator,
    pub server_id: String,
    pub launch: LaunchSpec,
    pub transcript: TranscriptLog,
}

/// Moves the subcommand out of `args`, treating a bare query as `ask`. The
/// remaining flags stay usable for building the command context.
fn take_command(args: &mut Args) -> Option<Commands> {
    match args.command.take() {
        Some(command) => Some(command),
        None if !args.query.is_empty() => Some(Commands::Ask {
            query: std::mem::take(&mut args.query),
        }),
        None => None,
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();
    init_tracing(args.verbose);

    let config_path = args.config.clone().unwrap_or_else(Config::get_config_path);
    let Some(command) = take_command(&mut args) else {
        Args::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Config { command } = command {
        return run_config(&config_path, command.unwrap_or(ConfigCommands::Show));
    }

    let context = match build_context(&args, &config_path) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    match command {
        Commands::Ask { query } => run_ask(&context, &query.join(" ")).await,
        Commands::Chat => run_chat(&context).await,
        Commands::Tools => run_list_tools(&context).await,
        Commands::Call { tool, args, query } => {
            run_call(&context, &tool, args.as_deref(), query.as_deref()).await
        }
        Commands::Resources => run_list_resources(&context).await,
        Commands::Read { uri } => run_read(&context, &uri).await,
        Commands::Prompts => run_list_prompts(&context).await,
        Commands::Prompt { name, arguments } => run_prompt(&context, &name, &arguments).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn build_context(args: &Args, config_path: &Path) -> Result<CommandContext, Box<dyn Error>> {
    let mut config = Config::load_from_path(config_path)?;
    if let Some(model) = args.model.as_ref().filter(|model| !model.trim().is_empty()) {
        config.model = Some(model.clone());
    }
    if let Some(policy) = args.images {
        config.summary_images = Some(policy);
    }

    let (server_id, launch) = resolve_launch(&config, &args.server)?;
    let model = OpenAiChatModel::new(
        config.base_url(),
        config.model(),
        config.api_key(),
        config.request_timeout(),
    )?;
    let orchestrator = Orchestrator::new(
        Arc::new(model),
        Arc::new(FsOutputSink),
        OrchestratorSettings::from_config(&config),
    );
    let transcript = TranscriptLog::from_option(args.log.clone())?;

    Ok(CommandContext {
        config,
        orchestrator,
        server_id,
        launch,
        transcript,
    })
}

/// `--command` wins; otherwise a configured server is looked up.
pub fn resolve_launch(config: &Config, server: &ServerArgs) -> Result<(String, LaunchSpec), String> {
    if let Some(command) = server.command.as_deref() {
        let launch = LaunchSpec::new(command).with_args(server.args.iter().cloned());
        let id = Path::new(command)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| command.to_string());
        return Ok((id, launch));
    }
    if !server.args.is_empty() {
        return Err("--arg requires --command".to_string());
    }
    let server = config.resolve_server(server.id.as_deref())?;
    Ok((server.id.clone(), server.launch_spec()))
}
