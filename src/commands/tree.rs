use colored::Colorize;
use tracing::instrument;

use super::CommandError;
use crate::context::Context;
use crate::review::{self, TreeStatus};

/// Current tree status, `Unset` when no status URL is configured.
pub async fn tree_status(ctx: &Context) -> Result<TreeStatus, CommandError> {
    let url = ctx.settings.tree_status_url(ctx.git())?;
    Ok(review::tree_status(ctx.review(), url.as_deref()).await?)
}

/// `The tree is <status>`, colored by how safe it is to commit.
pub fn status_line(status: TreeStatus) -> String {
    let word = status.to_string();
    let word = match status {
        TreeStatus::Open => word.green().bold(),
        TreeStatus::Closed => word.red().bold(),
        TreeStatus::Unknown | TreeStatus::Unset => word.yellow().bold(),
    };
    format!("The tree is {word}")
}

/// Print the tree status. Only an open tree counts as success.
#[instrument(skip(ctx))]
pub async fn run(ctx: &Context) -> Result<(), CommandError> {
    match tree_status(ctx).await? {
        TreeStatus::Unset => Err(CommandError::TreeStatusUnset),
        status => {
            println!("{}", status_line(status));
            match status {
                TreeStatus::Open => Ok(()),
                _ => Err(CommandError::TreeNotOpen(status)),
            }
        }
    }
}
