//! Descriptor inspection commands: describe, list, validate.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use capsmith_core::policy::OperationPolicy;
use capsmith_core::registry::Registry;
use capsmith_core::registry::shared::load_registry;
use capsmith_infra::config::{config_path, load_engine_config};
use capsmith_infra::source::FsContentSource;
use capsmith_types::descriptor::DescriptorKind;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Describe
// ---------------------------------------------------------------------------

pub fn handle_describe(state: &AppState, id: &str, json: bool) -> Result<()> {
    let descriptor = state.engine.describe(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*descriptor)?);
        return Ok(());
    }

    let d = &descriptor;
    println!();
    println!(
        "  {} {} {}",
        style(format!("{}:", d.kind)).bold(),
        style(&d.id).cyan().bold(),
        style(format!("v{}", d.version)).dim()
    );
    if d.name != d.id {
        println!("  {}", d.name);
    }
    println!("  {}", d.description);
    println!();
    println!("  Cost: {}", format_cost(d.estimated_cost));
    println!("  Tags: {}", join_or_dash(d.tags.iter().map(String::as_str)));
    println!(
        "  Depends on: {}",
        join_or_dash(d.depends_on.iter().map(String::as_str))
    );
    println!(
        "  Operations: {}",
        join_or_dash(d.allowed_operations.iter().map(ToString::to_string))
    );
    if let Some(class) = &d.conflict_class {
        println!("  Conflict class: {class}");
    }
    if !d.conflicts_with.is_empty() {
        println!(
            "  {} Conflicts with: {}",
            style("!").red(),
            join_or_dash(d.conflicts_with.iter().map(String::as_str))
        );
    }
    if let Some(source) = &d.source {
        println!("  Source: {}", style(source.display()).dim());
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub fn handle_list(
    state: &AppState,
    tag: Option<&str>,
    kind: Option<DescriptorKind>,
    json: bool,
) -> Result<()> {
    let descriptors = state.engine.list(tag, kind);

    if json {
        let out: Vec<_> = descriptors
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "kind": d.kind,
                    "version": d.version.to_string(),
                    "description": d.description,
                    "tags": d.tags,
                    "depends_on": d.depends_on,
                    "estimated_cost": d.estimated_cost,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if descriptors.is_empty() {
        println!();
        println!("  No descriptors found.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Id").fg(Color::Cyan),
            Cell::new("Kind"),
            Cell::new("Version"),
            Cell::new("Cost"),
            Cell::new("Tags"),
            Cell::new("Depends on"),
        ]);

    for d in &descriptors {
        table.add_row(vec![
            Cell::new(&d.id),
            Cell::new(d.kind).fg(kind_color(d.kind)),
            Cell::new(&d.version),
            Cell::new(format_cost(d.estimated_cost)),
            Cell::new(join_or_dash(d.tags.iter().map(String::as_str))),
            Cell::new(join_or_dash(d.depends_on.iter().map(String::as_str))),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {} descriptor(s)",
        style(descriptors.len()).bold()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// A problem that does not stop the registry from loading but will surface
/// at resolution time.
#[derive(Debug, PartialEq, serde::Serialize)]
pub struct ValidationWarning {
    pub id: String,
    pub message: String,
}

/// Load the content root without building an engine and report what was
/// found. Load failures are returned as errors; warnings are only printed.
pub async fn handle_validate(source_root: &Path, config: Option<&Path>, json: bool) -> Result<()> {
    let path = config_path(config, source_root);
    let engine_config = load_engine_config(&path).await;
    let source = FsContentSource::new(source_root);
    let timeout = Duration::from_millis(engine_config.load_timeout_ms);

    let registry = load_registry(&source, timeout, &CancellationToken::new())
        .await
        .with_context(|| format!("invalid content root {}", source_root.display()))?;

    let policy = OperationPolicy::from_config(&engine_config.policy);
    let warnings = collect_warnings(&registry, &policy);
    let counts = count_by_kind(&registry);

    if json {
        let out = serde_json::json!({
            "valid": true,
            "root": source_root.display().to_string(),
            "descriptors": registry.len(),
            "by_kind": counts,
            "tags": registry.tags().map(|(t, n)| (t.to_owned(), n)).collect::<BTreeMap<_, _>>(),
            "warnings": warnings,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} descriptor(s) loaded from {}",
        style("✓").green(),
        style(registry.len()).bold(),
        style(source_root.display()).cyan()
    );
    for (kind, count) in &counts {
        println!("    {kind}: {count}");
    }

    if warnings.is_empty() {
        println!();
        return Ok(());
    }

    println!();
    for w in &warnings {
        println!("  {} {}: {}", style("!").yellow(), style(&w.id).bold(), w.message);
    }
    println!();

    Ok(())
}

fn count_by_kind(registry: &Registry) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for kind in [DescriptorKind::Skill, DescriptorKind::Droid, DescriptorKind::Command] {
        counts.insert(kind.to_string(), registry.by_kind(kind).count());
    }
    counts
}

/// Dangling dependencies and descriptors the configured policy will always
/// reject.
fn collect_warnings(registry: &Registry, policy: &OperationPolicy) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    for d in registry.iter() {
        for dep in &d.depends_on {
            if !registry.contains(dep) {
                warnings.push(ValidationWarning {
                    id: d.id.clone(),
                    message: format!("depends on unknown descriptor '{dep}'"),
                });
            }
        }
        if let Err(violation) = policy.check(d) {
            warnings.push(ValidationWarning {
                id: d.id.clone(),
                message: violation.to_string(),
            });
        }
    }
    warnings
}

fn kind_color(kind: DescriptorKind) -> Color {
    match kind {
        DescriptorKind::Skill => Color::Green,
        DescriptorKind::Droid => Color::Yellow,
        DescriptorKind::Command => Color::Magenta,
    }
}

pub(crate) fn format_cost(cost: f64) -> String {
    format!("{cost:.2}")
}

fn join_or_dash<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = items
        .into_iter()
        .map(|s| s.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() { "-".to_owned() } else { joined }
}
