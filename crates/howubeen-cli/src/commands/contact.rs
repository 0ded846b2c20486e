use clap::Subcommand;
use howubeen_core::CheckinStore;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum ContactAction {
    /// Add an emergency contact for a user
    Add {
        /// User ID
        user: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: String,
    },
    /// List a user's emergency contacts
    List {
        /// User ID
        user: String,
    },
}

pub async fn run(ctx: &Context, action: ContactAction) -> CmdResult {
    let db = ctx.database()?;
    match action {
        ContactAction::Add {
            user,
            name,
            address,
        } => {
            if db.get_user(&user).await?.is_none() {
                eprintln!("unknown user: {user}");
                std::process::exit(1);
            }
            let contact = db.add_emergency_contact(&user, &name, &address).await?;
            print_json(&contact)?;
        }
        ContactAction::List { user } => {
            let contacts = db.list_emergency_contacts(&user).await?;
            print_json(&contacts)?;
        }
    }
    Ok(())
}
