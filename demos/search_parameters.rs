//! SearchParameter lookup example
//!
//! Lists the search parameters that apply to a resource type, then runs a
//! term search over the index.
//!
//! Usage: `cargo run --example search_parameters -- Patient`

use octofhir_canonical_index::{CanonicalManager, FcmConfig, SmartSearchFilters};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let resource_type = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Patient".to_string());

    let manager = CanonicalManager::new(FcmConfig::load().await?)?;
    manager.init().await?;

    println!("🔍 Search parameters for {resource_type}:");
    let params = manager.search_parameter_infos(&resource_type).await?;
    if params.is_empty() {
        println!("   (none)");
    }
    for param in &params {
        println!(
            "  • {:<24} {:<10} {}",
            param.code,
            param.type_field,
            param.expression.as_deref().unwrap_or("")
        );
    }

    println!("\n🔎 Term search: \"sp {}\"", resource_type.to_lowercase());
    let terms = ["sp".to_string(), resource_type.to_lowercase()];
    for entry in manager.smart_search(&terms, &SmartSearchFilters::default())? {
        println!("  • {}", entry.url.as_deref().unwrap_or("-"));
    }

    Ok(())
}
