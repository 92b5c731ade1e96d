use super::{connect, print_onboarding};
use crate::options::OnboardTarget;
use colored::Colorize;
use hubflow_cloud_azure::IotHubConnector;
use hubflow_core::{OnboardOptions, load_device_ids, onboard_existing};

pub async fn handle(
    target: OnboardTarget,
    options: OnboardOptions,
    subscription_id: Option<String>,
) -> anyhow::Result<()> {
    println!("{}", "Onboarding devices...".blue().bold());
    options.validate()?;
    let device_ids = load_device_ids(&target.device_ids_file).await?;
    println!(
        "IoT Hub: {} ({} device id(s))",
        target.registry.name.cyan(),
        device_ids.len()
    );

    let cloud = connect(subscription_id).await?;
    tracing::info!(
        "Onboarding {} device id(s) into {}",
        device_ids.len(),
        target.registry.name
    );
    let key_store = options.key_store_path.clone();
    let report = onboard_existing(
        &cloud,
        &IotHubConnector,
        &target.registry,
        &device_ids,
        options,
    )
    .await?;

    print_onboarding(&report);
    println!();
    println!(
        "{} {} registered, {} already registered",
        "✓".green(),
        report.registered(),
        report.already_registered()
    );
    if report.persisted {
        if let Some(path) = key_store {
            println!("  Device keys: {}", path.display().to_string().cyan());
        }
    }

    Ok(())
}
