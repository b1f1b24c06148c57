//! markup CLI: operator interface to the labeling core.

use clap::{Parser, Subcommand};
use markup_rs::config::Config;
use markup_rs::db::Db;
use markup_rs::db::reservation::NextOutcome;
use markup_rs::engine::Reaper;
use markup_rs::model::{
    AssessmentField, AssessmentFilters, BatchId, Identity, MarkupId, NewBatch, UserId,
};
use markup_rs::telemetry::{TelemetryConfig, init_telemetry};
use rand::SeedableRng;
use rand::rngs::StdRng;
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "markup", about = "Crowd labeling: batches, reservations and consensus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reaper until interrupted
    Serve,
    /// Run a single reaper pass and exit
    Reap,
    /// Batch operations
    Batch {
        #[command(subcommand)]
        action: BatchAction,
    },
    /// Markup operations
    Markup {
        #[command(subcommand)]
        action: MarkupAction,
    },
    /// User operations
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// List finalized answers
    Answers {
        #[arg(long)]
        markup: Option<i64>,
        #[arg(long)]
        user: Option<i64>,
    },
    /// Reserve the next markup for an assessor
    Next {
        #[arg(long)]
        user: i64,
    },
    /// Submit or revise an answer
    Submit {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        markup: i64,
        /// Field to mark, as ID or ID=TEXT. Repeatable.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<AssessmentField>,
        /// Answer as an admin (overrides crowd consensus)
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum BatchAction {
    /// Create a batch with its markup type and fields
    Create {
        name: String,
        /// Tier weight, 1 to 10
        #[arg(long, default_value_t = 1)]
        priority: i32,
        /// Agreeing answers needed to settle a markup
        #[arg(long, default_value_t = 1)]
        overlap: i32,
        /// Markup type name (defaults to the batch name)
        #[arg(long)]
        markup_type: Option<String>,
        /// Field label. Repeatable.
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Create the batch switched off
        #[arg(long)]
        inactive: bool,
        /// Quality-control batch of known answers
        #[arg(long)]
        honeypot: bool,
    },
    /// Change a batch's settings; omitted options keep their value
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long)]
        overlap: Option<i32>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Flip a batch between active and inactive
    Toggle { id: i64 },
    /// Show progress counters for a batch
    Stats { id: i64 },
}

#[derive(Subcommand)]
enum UserAction {
    /// Show a user's answer accuracy
    Stats { id: i64 },
}

#[derive(Subcommand)]
enum MarkupAction {
    /// Add a markup to a batch
    Add {
        #[arg(long)]
        batch: i64,
        /// Payload shown to assessors
        data: String,
    },
    /// Show a markup and its settled answer
    Show { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "markup".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret())
        .await?
        .with_timing(config.timing);
    db.migrate().await?;

    match cli.command {
        Command::Serve => cmd_serve(db, &config).await,
        Command::Reap => {
            let deleted = db.run_reaper_pass().await?;
            println!("Reaped {deleted} reservation(s)");
            Ok(())
        }
        Command::Batch { action } => match action {
            BatchAction::Create {
                name,
                priority,
                overlap,
                markup_type,
                fields,
                inactive,
                honeypot,
            } => {
                let mut new = NewBatch::new(&name).priority(priority).overlap(overlap);
                if let Some(markup_type) = markup_type {
                    new = new.markup_type(markup_type);
                }
                if inactive {
                    new = new.inactive();
                }
                if honeypot {
                    new = new.honeypot();
                }
                for label in fields {
                    new = new.field(label);
                }
                cmd_batch_create(&db, new).await
            }
            BatchAction::Update {
                id,
                name,
                priority,
                overlap,
                active,
            } => {
                let mut settings = db.get_batch(BatchId(id)).await?.settings();
                if let Some(name) = name {
                    settings.name = name;
                }
                if let Some(priority) = priority {
                    settings.priority = priority;
                }
                if let Some(overlap) = overlap {
                    settings.overlap = overlap;
                }
                if let Some(active) = active {
                    settings.is_active = active;
                }
                let batch = db.update_batch(BatchId(id), settings).await?;
                println!("{}", serde_json::to_string_pretty(&batch)?);
                Ok(())
            }
            BatchAction::Toggle { id } => {
                let active = db.toggle_batch_active(BatchId(id)).await?;
                println!("Batch {id} is now {}", if active { "active" } else { "inactive" });
                Ok(())
            }
            BatchAction::Stats { id } => cmd_batch_stats(&db, BatchId(id)).await,
        },
        Command::Markup { action } => match action {
            MarkupAction::Add { batch, data } => {
                let markup = db.add_markup(BatchId(batch), data).await?;
                println!("Created markup {} in batch {}", markup.id, markup.batch_id);
                Ok(())
            }
            MarkupAction::Show { id } => cmd_markup_show(&db, MarkupId(id)).await,
        },
        Command::User {
            action: UserAction::Stats { id },
        } => {
            let stats = db.user_stats(UserId(id)).await?;
            println!("User:        {id}");
            println!(
                "Answers:     {} ({} correct)",
                stats.assessment_count, stats.correct_assessment_count
            );
            Ok(())
        }
        Command::Answers { markup, user } => {
            let filters = AssessmentFilters {
                markup_id: markup.map(MarkupId),
                user_id: user.map(UserId),
            };
            let answers = db.list_assessments(&filters).await?;
            println!("{}", serde_json::to_string_pretty(&answers)?);
            Ok(())
        }
        Command::Next { user } => cmd_next(&db, UserId(user)).await,
        Command::Submit {
            user,
            markup,
            fields,
            admin,
        } => {
            let identity = if admin {
                Identity::admin(UserId(user))
            } else {
                Identity::assessor(UserId(user))
            };
            let outcome = db
                .submit_assessment(&identity, MarkupId(markup), fields)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

async fn cmd_serve(db: Db, config: &Config) -> anyhow::Result<()> {
    db.health_check().await?;

    let reaper = Reaper::new(Arc::new(db), config.timing.reaper_interval)?.spawn();

    tokio::signal::ctrl_c().await?;
    reaper.shutdown().await?;
    Ok(())
}

async fn cmd_batch_create(db: &Db, new: NewBatch) -> anyhow::Result<()> {
    let (batch, fields) = db.create_batch(new).await?;

    println!(
        "Created batch {} '{}' (priority {}, overlap {}, {}{})",
        batch.id,
        batch.name,
        batch.priority,
        batch.overlap,
        if batch.is_active { "active" } else { "inactive" },
        if batch.is_honeypot { ", honeypot" } else { "" }
    );
    for field in &fields {
        println!("  field {:<6} {}", field.id, field.label);
    }
    Ok(())
}

async fn cmd_batch_stats(db: &Db, id: BatchId) -> anyhow::Result<()> {
    let batch = db.get_batch(id).await?;
    let stats = db.batch_stats(id).await?;

    println!("Batch:       {} '{}'", batch.id, batch.name);
    println!("Active:      {}", batch.is_active);
    println!("Priority:    {}", batch.priority);
    println!("Overlap:     {}", batch.overlap);
    println!(
        "Markups:     {} ({} processed)",
        stats.markup_count, stats.processed_markup_count
    );
    println!(
        "Answers:     {} ({} correct)",
        stats.assessment_count, stats.correct_assessment_count
    );
    Ok(())
}

async fn cmd_markup_show(db: &Db, id: MarkupId) -> anyhow::Result<()> {
    let view = db.get_markup(id).await?;
    let markup = &view.markup;

    println!("ID:         {}", markup.id);
    println!("Batch:      {}", markup.batch_id);
    println!("Status:     {}", markup.status);
    println!(
        "Correct:    {}",
        markup.correct_hash.as_deref().unwrap_or("-")
    );
    println!("Created:    {}", markup.created_at);
    println!("Data:       {}", markup.data);
    if let Some(ref settled) = view.correct_assessment {
        println!("---");
        println!("Settled by: assessment {} (user {})", settled.id, settled.user_id);
        println!("Admin:      {}", settled.is_prior);
        println!("Updated:    {}", settled.updated_at);
    }
    Ok(())
}

async fn cmd_next(db: &Db, user: UserId) -> anyhow::Result<()> {
    let mut rng = StdRng::from_entropy();
    let outcome = db
        .request_next(&Identity::assessor(user), &mut rng)
        .await?;

    match outcome {
        NextOutcome::Reserved(item) => {
            println!("Reserved:");
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        NextOutcome::Resumed(item) => {
            println!("Resumed existing reservation:");
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        NextOutcome::NoWorkAvailable => println!("No work available."),
    }
    Ok(())
}

/// Parse `ID` or `ID=TEXT` into an answer field.
fn parse_field(raw: &str) -> Result<AssessmentField, String> {
    let (id, text) = match raw.split_once('=') {
        Some((id, text)) => (id, Some(text)),
        None => (raw, None),
    };
    let id: i64 = id
        .trim()
        .parse()
        .map_err(|_| format!("field id must be an integer, got {id:?}"))?;
    Ok(match text {
        Some(text) => AssessmentField::with_text(id, text),
        None => AssessmentField::new(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_field_ids() {
        assert_eq!(parse_field("12").unwrap(), AssessmentField::new(12));
    }

    #[test]
    fn parses_field_text_after_first_equals() {
        assert_eq!(
            parse_field("3=a=b").unwrap(),
            AssessmentField::with_text(3, "a=b")
        );
    }

    #[test]
    fn rejects_non_numeric_ids() {
        assert!(parse_field("title").is_err());
    }

    #[test]
    fn batch_update_leaves_omitted_settings_unset() {
        let cli = Cli::try_parse_from(["markup", "batch", "update", "4", "--overlap", "2"]).unwrap();
        match cli.command {
            Command::Batch {
                action:
                    BatchAction::Update {
                        id,
                        name,
                        priority,
                        overlap,
                        active,
                    },
            } => {
                assert_eq!(id, 4);
                assert_eq!(overlap, Some(2));
                assert!(name.is_none() && priority.is_none() && active.is_none());
            }
            _ => panic!("expected batch update"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
