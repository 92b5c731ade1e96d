mod commands;
mod options;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hubflow")]
#[command(about = "Provision an Azure IoT ingestion stack and onboard its devices", long_about = None)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, global = true, env = "HUBFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Show progress logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AzureArgs {
    /// Azure subscription (defaults to the active az login)
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Resource group holding every resource
    #[arg(long, env = "HUBFLOW_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Azure region
    #[arg(long, env = "HUBFLOW_LOCATION")]
    pub location: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Register devices as IoT Edge devices
    #[arg(long)]
    pub edge: bool,

    /// Tag edge devices for the IIoT platform (needs --edge)
    #[arg(long, requires = "edge")]
    pub iiot: bool,

    /// Save the key store after every registered device
    #[arg(long)]
    pub checkpoint: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every resource, onboard devices and wire credentials
    Deploy {
        #[command(flatten)]
        azure: AzureArgs,
        /// IoT Hub name
        #[arg(long)]
        iot_hub_name: Option<String>,
        /// IoT Hub pricing tier (F1, S1, ...)
        #[arg(long)]
        iot_hub_sku: Option<String>,
        /// Cosmos DB account name
        #[arg(long)]
        cosmosdb_name: Option<String>,
        /// App Service plan name
        #[arg(long)]
        app_srv_plan_name: Option<String>,
        /// Storage account name
        #[arg(long)]
        storage_acc_name: Option<String>,
        /// Function app name
        #[arg(long)]
        functions_name: Option<String>,
        /// File with one device id per line
        #[arg(long)]
        device_ids_file: Option<PathBuf>,
        #[command(flatten)]
        devices: DeviceArgs,
        /// Directory receiving the rendered function bindings
        #[arg(long)]
        functions_code_path: Option<PathBuf>,
        /// Vendor credentials file for the data pullers
        #[arg(long)]
        vendor_credentials: Option<PathBuf>,
    },
    /// Onboard devices into an existing IoT Hub
    Onboard {
        #[command(flatten)]
        azure: AzureArgs,
        /// IoT Hub name
        #[arg(long)]
        iot_hub_name: String,
        /// File with one device id per line
        #[arg(long)]
        device_ids_file: PathBuf,
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Delete the vendor credentials written next to the function bindings
    Cleanup {
        /// Directory holding the rendered function bindings
        #[arg(long)]
        functions_code_path: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn init_logging(log_level: Option<&str>, verbose: bool) {
    let fallback = log_level.unwrap_or(if verbose { "info" } else { "warn" });
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.verbose);

    if matches!(cli.command, Commands::Version) {
        println!("hubflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let file = hubflow_config::load_config()?;

    match cli.command {
        Commands::Deploy {
            azure,
            iot_hub_name,
            iot_hub_sku,
            cosmosdb_name,
            app_srv_plan_name,
            storage_acc_name,
            functions_name,
            device_ids_file,
            devices,
            functions_code_path,
            vendor_credentials,
        } => {
            let request = options::DeployRequest {
                azure,
                iot_hub_name,
                iot_hub_sku,
                cosmosdb_name,
                app_srv_plan_name,
                storage_acc_name,
                functions_name,
                device_ids_file,
                devices,
                functions_code_path,
                vendor_credentials,
            };
            let subscription_id = options::subscription_id(&request.azure, &file);
            let settings = options::deploy_settings(request, &file)?;
            commands::deploy::handle(settings, subscription_id).await?;
        }
        Commands::Onboard {
            azure,
            iot_hub_name,
            device_ids_file,
            devices,
        } => {
            let subscription_id = options::subscription_id(&azure, &file);
            let target = options::onboard_target(&azure, &file, iot_hub_name, device_ids_file);
            let onboard =
                options::onboard_options(&devices, Some(target.device_ids_file.as_path()));
            commands::onboard::handle(target, onboard, subscription_id).await?;
        }
        Commands::Cleanup {
            functions_code_path,
        } => {
            let code_path = functions_code_path
                .or(file.functions_code_path)
                .ok_or_else(|| anyhow::anyhow!("--functions-code-path is required"))?;
            commands::cleanup::handle(&code_path).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
