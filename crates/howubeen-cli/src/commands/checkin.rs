use chrono::NaiveDate;
use clap::Subcommand;
use howubeen_core::storage::CheckinRange;
use howubeen_core::{CheckinSubmission, Mood};

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum CheckinAction {
    /// Record (or update) the check-in for a day
    Submit {
        /// User ID
        #[arg(long)]
        user: String,
        /// Typed note
        #[arg(long)]
        text: Option<String>,
        /// Reference to an uploaded voice note
        #[arg(long)]
        voice: Option<String>,
        /// Day in YYYY-MM-DD (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Self-declared mood (negative, neutral, positive)
        #[arg(long)]
        status: Option<Mood>,
    },
    /// Show the check-in for a day
    Get {
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// List check-ins, newest first
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

pub async fn run(ctx: &Context, action: CheckinAction) -> CmdResult {
    let ingestor = ctx.ingestor()?;
    match action {
        CheckinAction::Submit {
            user,
            text,
            voice,
            date,
            status,
        } => {
            let submission = CheckinSubmission {
                user_id: user,
                date,
                raw_input: text,
                voice_reference: voice,
                status,
            };
            let ingested = ingestor.submit(submission).await?;
            if let Some(warning) = &ingested.warning {
                eprintln!("warning: {warning}");
            }
            print_json(&ingested)?;
        }
        CheckinAction::Get { user, date } => match ingestor.get(&user, date).await? {
            Some(record) => print_json(&record)?,
            None => {
                eprintln!("no check-in for {user} on {date}");
                std::process::exit(1);
            }
        },
        CheckinAction::List {
            user,
            from,
            to,
            limit,
        } => {
            let records = ingestor
                .timeline(&user, CheckinRange { from, to, limit })
                .await?;
            print_json(&records)?;
        }
    }
    Ok(())
}
