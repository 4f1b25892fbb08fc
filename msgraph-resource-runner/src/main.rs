mod logging;

use std::{process::exit, sync::Arc};

use anyhow::{Context as _, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use msgraph_resource::{
    provider::GraphProvider,
    schema::v0::{InputProperties, ResourceType},
};
use msgraph_resource_runner::{
    graph_client::HttpGraphClient,
    inputs::collect_inputs,
    operations::{self, ApplyOutcome},
    state::StateStore,
};

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("msgraph-resource-runner error: {:#}", e);
            exit(1);
        }
    }
}

fn run_args(args: Args) -> Result<()> {
    logging::set_up(args.options.verbose)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_command(&args.options, &args.command))
}

fn provider(options: &Options) -> GraphProvider {
    if options.access_token.is_none() {
        tracing::warn!("No access token given; requests will be unauthenticated");
    }
    let client = HttpGraphClient::new(&options.endpoint, options.access_token.clone());
    GraphProvider::new(Arc::new(client))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_command(options: &Options, command: &Commands) -> Result<()> {
    match command {
        Commands::Apply {
            name,
            resource_type,
            inputs,
        } => {
            let provider = provider(options);
            let mut store = StateStore::open(&options.state)?;
            let outcome = operations::apply(
                &provider,
                &mut store,
                name,
                ResourceType::from(resource_type.as_str()),
                inputs.to_properties()?,
            )
            .await?;
            match outcome {
                ApplyOutcome::Created => eprintln!("Created {}", name),
                ApplyOutcome::Updated => eprintln!("Updated {}", name),
                ApplyOutcome::Replaced => eprintln!("Replaced {}", name),
                ApplyOutcome::Unchanged => eprintln!("{} is up to date", name),
            }
            print_json(&store.resource(name)?)
        }
        Commands::Refresh { name } => {
            let provider = provider(options);
            let mut store = StateStore::open(&options.state)?;
            let current = operations::refresh(&provider, &mut store, name).await?;
            print_json(&current)
        }
        Commands::Destroy { name } => {
            let provider = provider(options);
            let mut store = StateStore::open(&options.state)?;
            operations::destroy(&provider, &mut store, name).await?;
            eprintln!("Destroyed {}", name);
            Ok(())
        }
        Commands::Import {
            name,
            resource_type,
            id,
        } => {
            let provider = provider(options);
            let mut store = StateStore::open(&options.state)?;
            let resource = operations::import(
                &provider,
                &mut store,
                name,
                ResourceType::from(resource_type.as_str()),
                id,
            )
            .await?;
            print_json(&resource)
        }
        Commands::ReadData {
            resource_type,
            inputs,
        } => {
            let provider = provider(options);
            let outputs = operations::read_data(
                &provider,
                ResourceType::from(resource_type.as_str()),
                inputs.to_properties()?,
            )
            .await?;
            print_json(&outputs)
        }
        Commands::Show { name } => {
            let store = StateStore::open(&options.state)?;
            match name {
                Some(name) => {
                    let resource = store
                        .resource(name)?
                        .with_context(|| format!("Resource {} is not in the state", name))?;
                    print_json(&resource)
                }
                None => print_json(&store.state()?.resources),
            }
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "msgraph-resource-runner",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// Manage Microsoft Graph objects from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Parser, Debug, Clone)]
struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// The state file, created when it does not exist
    #[arg(long, global = true, default_value = "msgraph-state.json")]
    state: String,

    /// The Graph endpoint requests are sent to
    #[arg(
        long,
        global = true,
        env = "MSGRAPH_ENDPOINT",
        default_value = "https://graph.microsoft.com"
    )]
    endpoint: String,

    /// A bearer token for the Graph endpoint
    #[arg(long, global = true, env = "MSGRAPH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// The (whole) JSON input properties for the resource
    ///
    /// This is a JSON object with the values needed to create the resource,
    /// such as `url` and `body`.
    #[arg(long("inputs-json"))]
    input_properties_json: Option<String>,

    /// An individual input property for the resource, in JSON format
    #[arg(long("input-json"), short('j'), number_of_values = 2, value_names = &["NAME", "JSON"])]
    input_property_json: Vec<String>,

    /// An individual input property for the resource, as a raw string.
    ///
    /// This is equivalent to `--input-json NAME JSON` if JSON is the JSON string formatting of STR.
    #[arg(long("input-str"), short('s'), number_of_values = 2, value_names = &["NAME", "STR"])]
    input_property_str: Vec<String>,
}

impl InputArgs {
    fn to_properties(&self) -> Result<InputProperties> {
        collect_inputs(
            self.input_properties_json.as_deref(),
            &self.input_property_json,
            &self.input_property_str,
        )
        .map(InputProperties)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update a resource so that it matches the inputs
    Apply {
        /// The name of the resource in the state file
        name: String,

        /// The type of resource, e.g. `msgraph_resource`
        #[arg(long("type"))]
        resource_type: String,

        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Read a resource and record what was found
    Refresh {
        /// The name of the resource in the state file
        name: String,
    },

    /// Delete a resource and remove it from the state
    Destroy {
        /// The name of the resource in the state file
        name: String,
    },

    /// Adopt an existing object as a resource
    Import {
        /// The name the resource gets in the state file
        name: String,

        /// The type of resource, e.g. `msgraph_resource`
        #[arg(long("type"))]
        resource_type: String,

        /// The object to import, e.g. `groups/<id>?api-version=beta`
        id: String,
    },

    /// Read a data source and print its outputs
    ReadData {
        /// The type of data source: `msgraph_resource` or `msgraph_resource_action`
        #[arg(long("type"))]
        resource_type: String,

        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Print the recorded state of one or all resources
    Show {
        /// The name of the resource; all resources when omitted
        name: Option<String>,
    },

    /// Generate markdown documentation for msgraph-resource-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for msgraph-resource-runner
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for msgraph-resource-runner
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
