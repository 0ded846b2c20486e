use chrono::{NaiveDate, Utc};
use clap::Subcommand;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum SummaryAction {
    /// Summarize one user's week, or every user's last complete week with --due
    Generate {
        /// User ID
        #[arg(long, required_unless_present = "due", conflicts_with = "due")]
        user: Option<String>,
        /// Any day in the week (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        week: Option<NaiveDate>,
        /// Summarize the last complete week for every user without one
        #[arg(long)]
        due: bool,
    },
    /// List stored summaries, newest week first
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show the most recent summary
    Latest {
        #[arg(long)]
        user: String,
    },
}

pub async fn run(ctx: &Context, action: SummaryAction) -> CmdResult {
    let summarizer = ctx.summarizer()?;
    let now = Utc::now();
    match action {
        SummaryAction::Generate { user, week, due } => {
            let day = week.unwrap_or_else(|| now.date_naive());
            if due {
                let report = summarizer.generate_due(day, now).await?;
                print_json(&report)?;
                return Ok(());
            }
            let user = user.unwrap_or_default();
            match summarizer.generate(&user, day, now).await? {
                Some(summary) => print_json(&summary)?,
                None => {
                    eprintln!("no check-ins for {user} in the week of {day}");
                    std::process::exit(1);
                }
            }
        }
        SummaryAction::List { user, limit } => {
            let summaries = summarizer.list(&user, limit).await?;
            print_json(&summaries)?;
        }
        SummaryAction::Latest { user } => match summarizer.latest(&user).await? {
            Some(summary) => print_json(&summary)?,
            None => {
                eprintln!("no summary for {user}");
                std::process::exit(1);
            }
        },
    }
    Ok(())
}
