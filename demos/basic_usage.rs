//! Basic usage example for the FHIR canonical index
//!
//! This example demonstrates the most common operations:
//! - Loading configuration
//! - Building or loading the index
//! - Resolving canonical URLs
//! - Basic search functionality

use octofhir_canonical_index::{CanonicalManager, FcmConfig, ResolveOptions, SearchParams};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("🔧 Loading configuration...");
    let config = match FcmConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            println!("⚠️  Falling back to default configuration: {e}");
            FcmConfig::default()
        }
    };
    println!("   Packages: {:?}", config.packages);
    println!("   Package root: {}", config.storage.packages_dir().display());

    println!("🚀 Initializing canonical manager...");
    let manager = CanonicalManager::new(config)?;
    let packages = manager.init().await?;
    println!("✅ Ready (cache key {})", manager.cache_key().unwrap_or_default());

    println!("📋 Installed packages:");
    for id in packages.values() {
        println!("  • {id}");
    }

    let canonical_url = "http://hl7.org/fhir/StructureDefinition/Patient";
    println!("🔍 Resolving {canonical_url}...");
    match manager.resolve(canonical_url, &ResolveOptions::default()).await {
        Ok(resource) => {
            println!("✅ Resolved {} {}", resource.resource_type, resource.id);
            if let Some(version) = &resource.version {
                println!("   Version: {version}");
            }
        }
        Err(e) => println!("❌ {e}"),
    }

    println!("🔎 StructureDefinitions of kind 'resource':");
    let entries = manager.search_entries(&SearchParams::default().with_kind("resource"))?;
    for entry in entries.iter().take(10) {
        println!(
            "  • {} ({})",
            entry.url.as_deref().unwrap_or("-"),
            entry
                .package
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
    }
    println!("   {} total", entries.len());

    for warning in manager.warnings()? {
        println!("⚠️  {warning}");
    }

    Ok(())
}
