//! `cart` commands. The cart is device-local and never synced.

use super::{print_json, Format};
use crate::error::CliResult;
use partsync_store::{Cart, CartItem, Database};
use std::sync::Arc;

/// Adds `quantity` of a product.
pub fn add(db: &Arc<Database>, product: &str, quantity: u32) -> CliResult<CartItem> {
    let item = Cart::new(Arc::clone(db)).add(product, quantity)?;
    println!("{} x{}", item.product_server_id, item.quantity);
    Ok(item)
}

/// Sets the quantity of a line; zero removes it.
pub fn set(db: &Arc<Database>, product: &str, quantity: u32) -> CliResult<Option<CartItem>> {
    let item = Cart::new(Arc::clone(db)).set_quantity(product, quantity)?;
    match &item {
        Some(item) => println!("{} x{}", item.product_server_id, item.quantity),
        None => println!("{product} removed"),
    }
    Ok(item)
}

/// Removes a product.
pub fn remove(db: &Arc<Database>, product: &str) -> CliResult<bool> {
    let removed = Cart::new(Arc::clone(db)).remove(product)?;
    if removed {
        println!("{product} removed");
    } else {
        println!("{product} is not in the cart");
    }
    Ok(removed)
}

/// Lists the cart.
pub fn list(db: &Arc<Database>, format: Format) -> CliResult<Vec<CartItem>> {
    let items = Cart::new(Arc::clone(db)).list()?;
    match format {
        Format::Json => print_json(&items)?,
        Format::Text if items.is_empty() => println!("cart is empty"),
        Format::Text => {
            for item in &items {
                println!("{:<40} x{}", item.product_server_id, item.quantity);
            }
        }
    }
    Ok(items)
}

/// Empties the cart.
pub fn clear(db: &Arc<Database>) -> CliResult<usize> {
    let removed = Cart::new(Arc::clone(db)).clear()?;
    println!("removed {removed} line(s)");
    Ok(removed)
}
