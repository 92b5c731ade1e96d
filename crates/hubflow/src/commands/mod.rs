pub mod cleanup;
pub mod deploy;
pub mod onboard;

use colored::Colorize;
use hubflow_cloud::{ProvisionResult, ProvisionStatus};
use hubflow_cloud_azure::{AzureCliCredential, AzureControlPlane};
use hubflow_core::{DeviceState, OnboardReport, ProgressReporter};
use std::sync::Arc;

/// Open the Azure control plane, falling back to the active login's subscription
pub async fn connect(subscription_id: Option<String>) -> anyhow::Result<AzureControlPlane> {
    println!("{}", "Checking Azure login...".blue());
    let credential = Arc::new(AzureCliCredential::new(subscription_id.clone()));
    let account = credential.cli().check_auth().await.map_err(|e| {
        anyhow::anyhow!("{}\nLog in with `az login` and try again", e)
    })?;

    let subscription_id = subscription_id.unwrap_or_else(|| account.id.clone());
    let user = account
        .user
        .as_ref()
        .map(|u| u.name.as_str())
        .unwrap_or("unknown user");
    println!(
        "  ✓ {} ({}) as {}",
        account.name.cyan(),
        subscription_id,
        user
    );

    Ok(AzureControlPlane::new(subscription_id, credential))
}

/// Prints pipeline progress to stdout
pub struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn step(&self, index: usize, total: usize, title: &str) {
        println!();
        println!("{}", format!("[Step {}/{}] {}", index, total, title).yellow());
    }

    fn provisioned(&self, result: &ProvisionResult) {
        let label = result.kind().display_name();
        match result.status() {
            ProvisionStatus::Created => {
                println!("  ✓ {} {} created", label, result.name().cyan());
            }
            ProvisionStatus::AlreadyExists => {
                println!("  - {} {} (already provisioned)", label, result.name());
            }
        }
    }

    fn onboarded(&self, report: &OnboardReport) {
        print_onboarding(report);
    }
}

pub fn print_onboarding(report: &OnboardReport) {
    for outcome in &report.outcomes {
        match outcome.state {
            DeviceState::Registered => {
                println!("  ✓ {} registered", outcome.device_id.cyan());
            }
            DeviceState::AlreadyRegistered => {
                println!("  - {} (already registered)", outcome.device_id);
            }
            state => {
                println!("  ⚠ {} stopped at {:?}", outcome.device_id, state);
            }
        }
    }
}
