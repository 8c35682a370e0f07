//! Deployment step payloads
//!
//! Structured results of the deployment pipeline's steps, stored under the
//! run's `data` map.

use serde::{Deserialize, Serialize};

/// Checks performed before anything touches the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreDeploymentChecks {
    pub syntax_valid: bool,
    pub connectivity: bool,
    pub device_ready: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Checks performed once the deployment step has finished
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDeploymentChecks {
    pub device_responsive: bool,
    pub configuration_applied: bool,
    pub services_running: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PostDeploymentChecks {
    /// Everything reported healthy without contacting the device
    pub fn assumed_healthy() -> Self {
        Self {
            device_responsive: true,
            configuration_applied: true,
            services_running: true,
            ..Self::default()
        }
    }
}

/// Estimated effect of a configuration, shown for dry runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesPreview {
    pub estimated_changes: String,
    pub impact_level: ImpactLevel,
    pub requires_reboot: bool,
    pub line_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ChangesPreview {
    /// Estimates the impact of `config` from its command lines
    pub fn estimate(config: &str) -> Self {
        let commands: Vec<&str> = config
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('!'))
            .collect();

        let touches_routing = commands
            .iter()
            .any(|line| line.starts_with("router ") || line.starts_with("ip route"));
        let requires_reboot = commands
            .iter()
            .any(|line| line.starts_with("boot ") || line.starts_with("license "));

        let impact_level = if requires_reboot || touches_routing || commands.len() > 50 {
            ImpactLevel::High
        } else if commands.len() > 10
            || commands.iter().any(|line| line.starts_with("interface "))
        {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        };

        Self {
            estimated_changes: format!(
                "{} configuration command(s) would be applied",
                commands.len()
            ),
            impact_level,
            requires_reboot,
            line_count: commands.len(),
        }
    }
}

/// Payload of the deployment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub success: bool,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_preview: Option<ChangesPreview>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl DeploymentOutcome {
    pub fn preview(config: &str) -> Self {
        Self {
            success: true,
            dry_run: true,
            message: Some("Dry run - configuration was not pushed".to_string()),
            changes_preview: Some(ChangesPreview::estimate(config)),
            errors: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            dry_run: false,
            message: None,
            changes_preview: None,
            errors: vec![error.into()],
        }
    }
}
