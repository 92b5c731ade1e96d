use super::{ConsoleProgress, connect};
use colored::Colorize;
use hubflow_cloud_azure::IotHubConnector;
use hubflow_core::{DeploySettings, Pipeline, check_inputs, keys_path};

pub async fn handle(settings: DeploySettings, subscription_id: Option<String>) -> anyhow::Result<()> {
    println!("{}", "Starting deployment...".blue().bold());
    check_inputs(&settings).await?;
    tracing::debug!("Local inputs are valid");

    let names = &settings.names;
    println!("Resource group: {}", names.resource_group.cyan());
    println!("Location:       {}", settings.location.cyan());
    println!("IoT Hub:        {}", names.device_registry);
    println!("Cosmos DB:      {}", names.document_store);
    println!("Storage:        {}", names.storage_account);
    println!("Function app:   {}", names.compute_host);
    println!();

    let cloud = connect(subscription_id).await?;
    tracing::info!("Deploying to resource group {}", settings.names.resource_group);
    let connector = IotHubConnector;
    let progress = ConsoleProgress;
    let key_store = settings.device_ids_file.as_deref().map(keys_path);
    let functions_code_path = settings.functions_code_path.clone();

    let report = Pipeline::new(&cloud, &connector, settings)
        .with_progress(&progress)
        .run()
        .await?;

    println!();
    println!("{}", "✓ Deployment complete".green().bold());
    println!("  {}", report.summary());
    if let Some(ref onboarding) = report.onboarding {
        if onboarding.persisted {
            if let Some(ref path) = key_store {
                println!("  Device keys: {}", path.display().to_string().cyan());
            }
        }
    }
    for path in &report.function_files {
        println!("  Wrote {}", path.display());
    }
    if let Some(ref code_path) = functions_code_path {
        if !report.function_files.is_empty() {
            println!(
                "  {} vendor secrets stay in {} until `hubflow cleanup` runs",
                "!".yellow(),
                code_path.display()
            );
        }
    }

    Ok(())
}
