//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::error::ProviderError;
use crate::kinds::KindName;
use crate::reconciler::ReconcileOutcome;
use crate::resource::{ConditionStatus, Event, EventType, ManagedOf, ResourceKind};

use super::commands::OutputFormat;

/// Number of events shown by `get` in text mode.
const RECENT_EVENTS: usize = 5;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Kind-independent view of a stored resource.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    /// Resource kind.
    pub kind: KindName,
    /// Resource name.
    pub name: String,
    /// Identifier of the remote object, once known.
    pub external_name: Option<String>,
    /// Last observed condition.
    pub condition: Option<ConditionStatus>,
    /// Whether the last pass succeeded.
    pub synced: bool,
    /// Message from the last failed pass.
    pub message: Option<String>,
    /// When the resource last reconciled successfully.
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl ResourceSummary {
    /// Builds a summary of a stored resource.
    #[must_use]
    pub fn of<K: ResourceKind>(kind: KindName, resource: &ManagedOf<K>) -> Self {
        Self {
            kind,
            name: resource.name().to_string(),
            external_name: resource.external_name().map(str::to_string),
            condition: resource.status.condition,
            synced: resource.status.synced,
            message: resource.status.message.clone(),
            last_reconciled: resource.status.last_reconciled,
        }
    }
}

/// Resource status row for table display.
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "External Name")]
    external_name: String,
    #[tabled(rename = "Condition")]
    condition: String,
    #[tabled(rename = "Synced")]
    synced: String,
    #[tabled(rename = "Last Reconciled")]
    last_reconciled: String,
}

/// Event row for table display.
#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// JSON shape of a single pass result.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeJson<'a> {
    kind: KindName,
    name: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a ReconcileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of one reconciliation pass.
    #[must_use]
    pub fn format_outcome(
        &self,
        kind: KindName,
        name: &str,
        result: &Result<ReconcileOutcome, ProviderError>,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = match result {
                    Ok(outcome) => OutcomeJson {
                        kind,
                        name,
                        success: true,
                        outcome: Some(outcome),
                        error: None,
                        retryable: None,
                    },
                    Err(e) => OutcomeJson {
                        kind,
                        name,
                        success: false,
                        outcome: None,
                        error: Some(e.to_string()),
                        retryable: Some(e.is_retryable()),
                    },
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => match result {
                Ok(outcome) => format!("{} {kind}/{name}: {outcome}", "✓".green()),
                Err(e) => match e.retry_delay_secs() {
                    Some(delay) => {
                        format!("{} {kind}/{name}: {e} (retry in {delay}s)", "⚠".yellow())
                    }
                    None => format!("{} {kind}/{name}: {e}", "✗".red()),
                },
            },
        }
    }

    /// Formats the status of stored resources.
    #[must_use]
    pub fn format_status(&self, resources: &[ResourceSummary]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(resources).unwrap_or_default(),
            OutputFormat::Text => Self::format_status_text(resources),
        }
    }

    fn format_status_text(resources: &[ResourceSummary]) -> String {
        if resources.is_empty() {
            return String::from("No resources stored.\n");
        }

        let rows: Vec<StatusRow> = resources
            .iter()
            .map(|r| StatusRow {
                kind: r.kind.to_string(),
                name: r.name.clone(),
                external_name: r
                    .external_name
                    .as_deref()
                    .map_or_else(|| "-".dimmed().to_string(), |n| Self::truncate(n, 24)),
                condition: Self::format_condition(r.condition),
                synced: if r.synced {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                },
                last_reconciled: r.last_reconciled.map_or_else(
                    || "never".dimmed().to_string(),
                    |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
                ),
            })
            .collect();

        let mut output = Table::new(rows).to_string();
        output.push('\n');

        let failing: Vec<&ResourceSummary> = resources.iter().filter(|r| !r.synced).collect();
        let _ = write!(
            output,
            "\n{} resources, {} synced, {} not synced\n",
            resources.len(),
            (resources.len() - failing.len()).to_string().green(),
            failing.len().to_string().red()
        );
        for resource in failing {
            if let Some(message) = &resource.message {
                let _ = writeln!(output, "   {}/{}: {message}", resource.kind, resource.name);
            }
        }

        output
    }

    /// Formats a single stored resource.
    #[must_use]
    pub fn format_resource<K: ResourceKind>(&self, kind: KindName, resource: &ManagedOf<K>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(resource).unwrap_or_default(),
            OutputFormat::Text => {
                let summary = ResourceSummary::of::<K>(kind, resource);
                let mut output = format!("\n{kind}/{}\n\n", summary.name.bold());

                let _ = writeln!(
                    output,
                    "   External name: {}",
                    summary.external_name.as_deref().unwrap_or("-")
                );
                let _ = writeln!(
                    output,
                    "   Condition: {}",
                    Self::format_condition(summary.condition)
                );
                let _ = writeln!(output, "   Synced: {}", summary.synced);
                if let Some(message) = &summary.message {
                    let _ = writeln!(output, "   Message: {message}");
                }
                let _ = writeln!(
                    output,
                    "   Deletion policy: {:?}",
                    resource.spec.deletion_policy
                );

                let spec = serde_json::to_string_pretty(&resource.spec.for_provider)
                    .unwrap_or_default();
                let _ = write!(output, "\nForProvider:\n{spec}\n");

                if let Some(observed) = &resource.status.at_provider {
                    let observed = serde_json::to_string_pretty(observed).unwrap_or_default();
                    let _ = write!(output, "\nAtProvider:\n{observed}\n");
                }

                if !resource.status.events.is_empty() {
                    output.push_str("\nEvents:\n");
                    output.push_str(&Self::format_events(&resource.status.events));
                    output.push('\n');
                }

                output
            }
        }
    }

    fn format_events(events: &[Event]) -> String {
        let rows: Vec<EventRow> = events
            .iter()
            .rev()
            .take(RECENT_EVENTS)
            .map(|e| EventRow {
                time: e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                event_type: match e.event_type {
                    EventType::Normal => "Normal".green().to_string(),
                    EventType::Warning => "Warning".yellow().to_string(),
                },
                reason: e.reason.clone(),
                message: Self::truncate(&e.message, 60),
            })
            .collect();
        Table::new(rows).to_string()
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, resources: usize) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.errors.is_empty(),
                    "resources": resources,
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid", "✓".green());
                if resources > 0 {
                    let _ = write!(output, " ({resources} resources)");
                }
                output.push('\n');
                for warning in &result.warnings {
                    let _ = writeln!(output, "{} {warning}", "⚠".yellow());
                }
                output
            }
        }
    }

    /// Formats a condition with color.
    fn format_condition(condition: Option<ConditionStatus>) -> String {
        match condition {
            Some(ConditionStatus::Available) => "Available".green().to_string(),
            Some(c @ (ConditionStatus::Creating | ConditionStatus::Deleting)) => {
                c.to_string().yellow().to_string()
            }
            Some(ConditionStatus::Unavailable) => "Unavailable".red().to_string(),
            None => "-".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
