//! `favorite` commands.

use super::{print_json, Format};
use crate::error::CliResult;
use partsync_store::{Database, Favorite, Favorites};
use std::sync::Arc;

/// Toggles a favorite and prints the new state.
pub fn toggle(db: &Arc<Database>, user: &str, product: &str) -> CliResult<bool> {
    let now_favorite = Favorites::new(Arc::clone(db)).toggle(user, product)?;
    if now_favorite {
        println!("{product} added to favorites (pending push)");
    } else {
        println!("{product} removed from favorites (pending push)");
    }
    Ok(now_favorite)
}

/// Lists the user's favorites.
pub fn list(db: &Arc<Database>, user: &str, format: Format) -> CliResult<Vec<Favorite>> {
    let favorites = Favorites::new(Arc::clone(db)).list(user)?;
    match format {
        Format::Json => print_json(&favorites)?,
        Format::Text if favorites.is_empty() => println!("no favorites"),
        Format::Text => {
            for f in &favorites {
                let marker = if f.pending { " *" } else { "" };
                println!("{}{marker}", f.product_id);
            }
        }
    }
    Ok(favorites)
}
