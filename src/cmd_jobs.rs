//! Jobs subcommand handlers for tickwork.

use tickwork_config::Config;

use crate::cli::JobsAction;
use crate::server::build_scheduler;

/// Handle jobs subcommands against the configured store.
pub(crate) async fn handle_jobs_command(
    action: JobsAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = build_scheduler(config).await?;

    match action {
        JobsAction::List { format } => {
            let jobs = scheduler.list_jobs().await?;
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&jobs)?),
                _ => {
                    println!(
                        "{:<24} {:<16} {:<24} {:<8} {}",
                        "NAME", "HANDLER", "SCHEDULE", "ENABLED", "NEXT DUE"
                    );
                    println!("{}", "-".repeat(100));
                    for job in jobs {
                        let next_due = job
                            .next_due
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{:<24} {:<16} {:<24} {:<8} {}",
                            job.definition.name,
                            job.definition.handler,
                            job.definition.schedule.to_string(),
                            job.definition.enabled,
                            next_due
                        );
                    }
                }
            }
        }
        JobsAction::Show { name } => {
            let status = scheduler.job_status(&name).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        JobsAction::Remove { name } => {
            scheduler.remove_job(&name).await?;
            println!("Job '{}' removed.", name);
        }
    }

    Ok(())
}
