//! Package management commands (list, enable, disable).

use anyhow::{Result, bail};
use colored::Colorize;
use serde_json::json;

use suite_cli::Session;
use suite_cli::theme::Theme;
use suite_package::ManifestEntry;

use super::{OutputFormat, print_json};

/// List packages from the manifest, rediscovering first when asked or when
/// nothing has been discovered yet.
pub(crate) fn list_packages(session: &Session, refresh: bool, format: OutputFormat) -> Result<()> {
    let runtime = session.open_runtime()?;
    let registry = runtime.registry();

    let mut manifest = registry.manifest();
    if refresh || manifest.packages.is_empty() {
        registry.discover();
        manifest = registry.manifest();
    }

    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(&manifest)?);
    }

    if manifest.packages.is_empty() {
        println!(
            "{}",
            Theme::warning(&format!(
                "No packages found under {}",
                runtime.package_root().display()
            ))
        );
        return Ok(());
    }

    println!("\n{}", Theme::header("Packages"));
    println!("{}", Theme::separator());
    for entry in &manifest.packages {
        print_entry(entry);
    }
    println!();
    Ok(())
}

fn print_entry(entry: &ManifestEntry) {
    let meta = &entry.meta;
    let flag = if entry.enabled { "enabled" } else { "disabled" };
    println!(
        "  {} {} ({})",
        meta.id.bold(),
        Theme::dimmed(&format!("v{}", meta.version)),
        Theme::state(flag)
    );
    if !meta.name.is_empty() {
        println!("    {}", meta.name);
    }
    if !meta.description.is_empty() {
        println!("    {}", Theme::dimmed(&meta.description));
    }
    for feature in &meta.features {
        println!("    - {} {}", feature.id.cyan(), Theme::dimmed(&feature.name));
    }
}

/// Flip the enabled flag of a package.
pub(crate) fn set_enabled(
    session: &Session,
    package_id: &str,
    enabled: bool,
    format: OutputFormat,
) -> Result<()> {
    let runtime = session.open_runtime()?;
    if !runtime.registry().enable_package(package_id, enabled) {
        bail!("failed to write {}", runtime.registry().store().path().display());
    }

    if format == OutputFormat::Json {
        return print_json(&json!({ "id": package_id, "enabled": enabled }));
    }
    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{}", Theme::success(&format!("{verb} package {package_id}")));
    Ok(())
}
