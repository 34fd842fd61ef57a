//! Rolescope - report the role assignments of an Azure subscription.
//!
//! Resolves each assignment against the directory and prints the role name,
//! display name and mail address per assigned principal.

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rolescope::arm::ArmClient;
use rolescope::credentials::{default_credential, GRAPH_RESOURCE, MANAGEMENT_RESOURCE};
use rolescope::graph::GraphClient;
use rolescope::output;
use rolescope::reporter::{Reporter, ReportStatus};

/// Rolescope - Azure role assignment reporter
#[derive(Parser)]
#[command(
    name = "rolescope",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "Report Azure subscription role assignments",
    long_about = "Lists every role assignment of a subscription and resolves each \
                  assigned principal against the directory, printing the role name, \
                  display name and mail address per assignment."
)]
struct Cli {
    /// Azure AD tenant ID
    tenant_id: String,

    /// Subscription ID to report on
    subscription_id: String,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = execute(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let http = reqwest::Client::new();

    let arm = ArmClient::new(
        http.clone(),
        default_credential(&cli.tenant_id, MANAGEMENT_RESOURCE, http.clone()),
    );
    let graph = GraphClient::new(
        http.clone(),
        default_credential(&cli.tenant_id, GRAPH_RESOURCE, http),
        &cli.tenant_id,
    );

    let report = Reporter::new(arm, graph).run(&cli.subscription_id).await?;

    for entry in &report.entries {
        output::print_entry(entry);
    }

    if let ReportStatus::Incomplete(reason) = &report.status {
        error!("Could not retrieve role assignments. Do you have GraphAPI permissions?");
        error!(
            subscription_id = %report.subscription_id,
            %reason,
            "Report is incomplete"
        );
    }

    Ok(())
}
