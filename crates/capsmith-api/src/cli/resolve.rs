//! `capsmith resolve`: match, resolve and optionally dispatch a plan.

use anyhow::{Result, bail};
use capsmith_core::dispatch::{CostMeter, Dispatch};
use capsmith_types::plan::{ActivationPlan, DropReason, DroppedCandidate, TaskContext};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio_util::sync::CancellationToken;

use super::descriptor::format_cost;
use crate::state::AppState;

pub fn handle_resolve(
    state: &AppState,
    text: &[String],
    ids: Vec<String>,
    budget: Option<f64>,
    dispatch: bool,
    json: bool,
) -> Result<()> {
    let mut context = TaskContext::new(text.join(" ")).with_explicit_ids(ids);
    context.budget = check_budget(budget)?;

    let plan = state.engine.resolve(&context)?;

    if dispatch {
        return run_dispatch(plan, &state.shutdown, json);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_plan(&plan);
    Ok(())
}

/// Reject budgets the resolver cannot compare against.
fn check_budget(budget: Option<f64>) -> Result<Option<f64>> {
    match budget {
        Some(b) if !b.is_finite() || b < 0.0 => {
            bail!("budget must be a non-negative number, got {b}")
        }
        other => Ok(other),
    }
}

fn print_plan(plan: &ActivationPlan) {
    println!();
    if plan.is_empty() {
        println!("  No descriptors matched.");
    } else {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#"),
                Cell::new("Id").fg(Color::Cyan),
                Cell::new("Kind"),
                Cell::new("Score"),
                Cell::new("Cost"),
                Cell::new("Cumulative"),
                Cell::new("Via"),
            ]);

        for (i, entry) in plan.entries.iter().enumerate() {
            let via = if entry.requested {
                Cell::new("match").fg(Color::Green)
            } else {
                Cell::new("dependency").fg(Color::Yellow)
            };
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&entry.id),
                Cell::new(entry.kind),
                Cell::new(format!("{:.3}", entry.score)),
                Cell::new(format_cost(entry.cost)),
                Cell::new(format_cost(entry.cumulative_cost)),
                via,
            ]);
        }
        println!("{table}");
    }

    let budget = plan
        .budget
        .map_or_else(|| "unbounded".to_owned(), format_cost);
    println!(
        "  Total cost: {} (budget {budget})",
        style(format_cost(plan.total_cost())).bold()
    );

    if !plan.dropped.is_empty() {
        println!();
        println!("  {} Dropped:", style("!").yellow());
        for dropped in &plan.dropped {
            println!("    - {}", describe_drop(dropped));
        }
    }
    println!();
}

/// One-line human rendering of a drop record.
pub(crate) fn describe_drop(dropped: &DroppedCandidate) -> String {
    let reason = match &dropped.reason {
        DropReason::BudgetExceeded {
            required,
            remaining,
        } => format!(
            "over budget (needs {}, {} left)",
            format_cost(*required),
            format_cost(*remaining)
        ),
        DropReason::Conflict { winner } => format!("conflicts with '{winner}'"),
        DropReason::DependencyDropped { dependency } => {
            format!("dependency '{dependency}' was dropped")
        }
        DropReason::PolicyDenied {
            descriptor,
            operation,
        } => format!("'{descriptor}' needs denied operation {operation}"),
        DropReason::NotInRegistry => "not in registry".to_owned(),
    };
    if dropped.cascaded.is_empty() {
        format!("{}: {reason}", dropped.id)
    } else {
        format!(
            "{}: {reason} (also left out: {})",
            dropped.id,
            dropped.cascaded.join(", ")
        )
    }
}

/// Walk the plan, printing each activation event.
fn run_dispatch(plan: ActivationPlan, shutdown: &CancellationToken, json: bool) -> Result<()> {
    let meter = plan.budget.map_or_else(CostMeter::unbounded, CostMeter::bounded);
    let mut dispatch = Dispatch::new(plan, shutdown.child_token()).with_meter(meter);

    let mut events = Vec::new();
    for event in dispatch.by_ref() {
        if !json {
            println!(
                "  {} [{}] {} {} ({})",
                style("→").cyan(),
                event.index + 1,
                event.kind,
                style(&event.id).bold(),
                format_cost(event.cumulative_cost)
            );
        }
        events.push(event);
    }
    let outcome = dispatch.outcome();

    if json {
        let out = serde_json::json!({ "events": events, "outcome": outcome });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if outcome.is_complete() {
        println!(
            "  {} {} descriptor(s) activated",
            style("✓").green(),
            outcome.completed.len()
        );
    } else {
        println!(
            "  {} {} activated, {} skipped{}",
            style("!").yellow(),
            outcome.completed.len(),
            outcome.skipped.len(),
            if outcome.cancelled { " (cancelled)" } else { "" }
        );
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_budget_rejects_negative_and_nan() {
        assert!(check_budget(Some(-1.0)).is_err());
        assert!(check_budget(Some(f64::NAN)).is_err());
        assert!(check_budget(Some(f64::INFINITY)).is_err());
        assert_eq!(check_budget(Some(0.0)).unwrap(), Some(0.0));
        assert_eq!(check_budget(None).unwrap(), None);
    }

    #[test]
    fn test_drop_lines_name_cascaded_ids() {
        let dropped = DroppedCandidate {
            id: "review".to_owned(),
            reason: DropReason::BudgetExceeded {
                required: 3.0,
                remaining: 1.0,
            },
            cascaded: vec!["git-commit".to_owned()],
        };
        assert_eq!(
            describe_drop(&dropped),
            "review: over budget (needs 3.00, 1.00 left) (also left out: git-commit)"
        );
    }

    #[test]
    fn test_conflict_drop_names_winner() {
        let dropped = DroppedCandidate {
            id: "basic".to_owned(),
            reason: DropReason::Conflict {
                winner: "pro".to_owned(),
            },
            cascaded: Vec::new(),
        };
        assert_eq!(describe_drop(&dropped), "basic: conflicts with 'pro'");
    }
}
