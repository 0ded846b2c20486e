use chrono::Utc;
use clap::Subcommand;
use howubeen_core::{CheckinStore, User};

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user
    Add {
        /// User ID
        id: String,
        /// Address reminders are sent to
        #[arg(long)]
        address: String,
        /// Display name
        #[arg(long, default_value = "")]
        name: String,
    },
    /// List all users
    List,
}

pub async fn run(ctx: &Context, action: UserAction) -> CmdResult {
    let db = ctx.database()?;
    match action {
        UserAction::Add { id, address, name } => {
            let user = User {
                id,
                name,
                address,
                created_at: Utc::now(),
            };
            db.insert_user(user.clone()).await?;
            print_json(&user)?;
        }
        UserAction::List => {
            let mut users = Vec::new();
            for id in db.list_users().await? {
                if let Some(user) = db.get_user(&id).await? {
                    users.push(user);
                }
            }
            print_json(&users)?;
        }
    }
    Ok(())
}
