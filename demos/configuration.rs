//! Configuration example for the FHIR canonical index
//!
//! This example demonstrates:
//! - Building a configuration in code
//! - Parsing package specifications
//! - Writing and reading `fcm.toml`

use octofhir_canonical_index::{FcmConfig, PackageSpec, RegistryConfig, StorageConfig};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("⚙️  Configuration Example");
    println!("========================\n");

    let working_dir = std::env::temp_dir().join("fcm-config-example");
    let mut config = FcmConfig::with_packages(
        &working_dir,
        ["hl7.fhir.r4.core@4.0.1", "hl7.fhir.us.core@6.1.0", "file:./my-ig"],
    );
    config.registry = RegistryConfig {
        url: Some("https://packages.fhir.org".to_string()),
    };
    config.storage = StorageConfig {
        cache_dir: Some(working_dir.join("snapshots")),
        ..StorageConfig::in_dir(&working_dir)
    };
    config.scan.collect_warnings = true;

    println!("📝 Storage");
    println!("   Working dir: {}", config.storage.working_dir().display());
    println!("   Cache dir:   {}", config.storage.cache_dir().display());
    println!("   Packages:    {}", config.storage.packages_dir().display());

    println!("\n📦 Package specs");
    for spec in config.package_specs()? {
        match spec {
            PackageSpec::Registry { name, version } => {
                println!("   registry {name} {}", version.as_deref().unwrap_or("(latest)"))
            }
            PackageSpec::Local { path } => println!("   local    {}", path.display()),
        }
    }

    config.validate()?;
    println!("\n✅ Configuration is valid");

    tokio::fs::create_dir_all(&working_dir).await?;
    let path = working_dir.join("fcm.toml");
    tokio::fs::write(&path, toml::to_string_pretty(&config)?).await?;
    println!("💾 Saved to {}", path.display());

    let reloaded = FcmConfig::from_file(&path).await?;
    println!("📖 Reloaded {} package specs", reloaded.packages.len());

    Ok(())
}
