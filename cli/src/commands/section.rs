use clap::Subcommand;
use scribo_core::models::NewSection;

use crate::util::{Context, parse_metadata, print_error, read_text, remote_failure, report};

#[derive(Subcommand)]
pub enum SectionCommands {
    /// List sections, of one document or of all documents
    List {
        /// Only sections of this document
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Show one section
    Get {
        #[arg(long)]
        id: String,
    },
    /// Create a section in a document
    Create {
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        summary: String,
        /// Read initial content from file (use '-' for stdin)
        #[arg(long)]
        content_file: Option<String>,
        /// Metadata entry as key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
    /// Change a section; content statistics are recomputed
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        /// Read new content from file (use '-' for stdin)
        #[arg(long)]
        content_file: Option<String>,
        /// Metadata entry as key=value (repeatable, merged into existing)
        #[arg(long = "meta")]
        meta: Vec<String>,
        /// Save through the assistant endpoint instead of a plain update
        #[arg(long)]
        via_agent: bool,
    },
    /// Delete a section
    Delete {
        #[arg(long)]
        id: String,
    },
}

pub async fn run(ctx: &Context, command: SectionCommands) -> i32 {
    match command {
        SectionCommands::List { document_id } => match document_id {
            Some(id) => report(ctx.client.list_sections(&id).await),
            None => report(ctx.client.list_all_sections().await),
        },
        SectionCommands::Get { id } => report(ctx.client.read_section(&id).await),
        SectionCommands::Create {
            document_id,
            title,
            summary,
            content_file,
            meta,
        } => {
            let content = match content_file.as_deref().map(read_text).transpose() {
                Ok(content) => content.unwrap_or_default(),
                Err(e) => return print_error(4, "usage_error", &format!("Failed to read content: {e}"), None),
            };
            let metadata = match parse_metadata(&meta) {
                Ok(metadata) => metadata,
                Err(msg) => return print_error(4, "usage_error", &msg, None),
            };
            let section = NewSection::new(document_id, title, content, summary, metadata);
            report(ctx.client.create_section(&section).await)
        }
        SectionCommands::Update {
            id,
            title,
            summary,
            content_file,
            meta,
            via_agent,
        } => {
            let edit = SectionEdit {
                title,
                summary,
                content_file,
                meta,
            };
            update(ctx, &id, edit, via_agent).await
        }
        SectionCommands::Delete { id } => report(ctx.client.delete_section(&id).await),
    }
}

struct SectionEdit {
    title: Option<String>,
    summary: Option<String>,
    content_file: Option<String>,
    meta: Vec<String>,
}

async fn update(ctx: &Context, id: &str, edit: SectionEdit, via_agent: bool) -> i32 {
    let content = match edit.content_file.as_deref().map(read_text).transpose() {
        Ok(content) => content,
        Err(e) => return print_error(4, "usage_error", &format!("Failed to read content: {e}"), None),
    };
    let metadata = match parse_metadata(&edit.meta) {
        Ok(metadata) => metadata,
        Err(msg) => return print_error(4, "usage_error", &msg, None),
    };

    let mut section = match ctx.client.read_section(id).await {
        Ok(section) => section,
        Err(e) => return remote_failure(&e),
    };
    if let Some(title) = edit.title {
        section.title = title;
    }
    if let Some(summary) = edit.summary {
        section.summary = summary;
    }
    section.metadata.extend(metadata);
    // always recompute so stored statistics match the content
    let content = content.unwrap_or_else(|| section.content.clone());
    let section = section.with_content(content);

    if via_agent {
        report(ctx.client.save_section(&section).await)
    } else {
        report(ctx.client.update_section(&section).await)
    }
}
