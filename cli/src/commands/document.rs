use clap::Subcommand;
use scribo_core::models::NewDocument;

use crate::util::{Context, print_error, remote_failure, report};

#[derive(Subcommand)]
pub enum DocumentCommands {
    /// List all documents
    List,
    /// Show one document
    Get {
        #[arg(long)]
        id: String,
    },
    /// Create a document owned by the signed-in user
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Change a document's title or description
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a document
    Delete {
        #[arg(long)]
        id: String,
    },
}

pub async fn run(ctx: &Context, command: DocumentCommands) -> i32 {
    match command {
        DocumentCommands::List => report(ctx.client.list_documents().await),
        DocumentCommands::Get { id } => report(ctx.client.read_document(&id).await),
        DocumentCommands::Create { title, description } => {
            let user = match ctx.require_user().await {
                Ok(user) => user,
                Err(code) => return code,
            };
            let document = NewDocument::new(user.id, title, description);
            report(ctx.client.create_document(&document).await)
        }
        DocumentCommands::Update {
            id,
            title,
            description,
        } => update(ctx, &id, title, description).await,
        DocumentCommands::Delete { id } => report(ctx.client.delete_document(&id).await),
    }
}

async fn update(ctx: &Context, id: &str, title: Option<String>, description: Option<String>) -> i32 {
    if title.is_none() && description.is_none() {
        return print_error(4, "usage_error", "Nothing to update", Some("Pass --title and/or --description"));
    }

    let mut document = match ctx.client.read_document(id).await {
        Ok(document) => document,
        Err(e) => return remote_failure(&e),
    };
    if let Some(title) = title {
        document.title = title;
    }
    if let Some(description) = description {
        document.description = description;
    }
    report(ctx.client.update_document(&document).await)
}
