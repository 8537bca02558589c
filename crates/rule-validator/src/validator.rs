//! Rule Validator

use crate::draft::{ActionDraft, RuleDraft};
use crate::error::ValidationError;
use rule_model::{
    ActionSpec, AlertSeverity, AutomationRule, ComparisonOperator, DeploymentId, RuleId,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum rule name length (characters)
    pub max_name_len: usize,
    /// Maximum cooldown (seconds)
    pub max_cooldown_secs: u64,
    /// Maximum actuator command length (characters)
    pub max_command_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_name_len: 200,
            max_cooldown_secs: 7 * 24 * 3600,
            max_command_len: 128,
        }
    }
}

/// Result of checking a draft without admitting it
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the draft would be admitted
    pub valid: bool,
    /// Every problem found
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Admission validator for rule drafts
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate `draft` and build the rule it describes under `id`.
    ///
    /// `last_fired_at` is never taken from a draft.
    pub fn admit(&self, draft: &RuleDraft, id: RuleId) -> Result<AutomationRule, ValidationError> {
        let name = self.validate_name(&draft.name)?;
        let sensor_deployment_id = self.validate_deployment(draft.sensor_deployment_id)?;
        let operator = self.validate_operator(&draft.operator)?;
        let threshold_value = self.validate_threshold(draft.threshold_value)?;
        let cooldown = self.validate_cooldown(draft.cooldown_seconds)?;
        let action = self.validate_action(&draft.action)?;

        debug!(
            "Admitted {} ({} action, cooldown {}s)",
            id,
            action.kind(),
            cooldown.as_secs()
        );

        Ok(AutomationRule {
            id,
            name,
            description: draft.description.trim().to_string(),
            sensor_deployment_id,
            operator,
            threshold_value,
            action,
            is_active: draft.is_active,
            cooldown,
            last_fired_at: None,
        })
    }

    /// Report every problem with `draft`
    pub fn check(&self, draft: &RuleDraft) -> ValidationResult {
        let errors = [
            self.validate_name(&draft.name).err(),
            self.validate_deployment(draft.sensor_deployment_id).err(),
            self.validate_operator(&draft.operator).err(),
            self.validate_threshold(draft.threshold_value).err(),
            self.validate_cooldown(draft.cooldown_seconds).err(),
            self.validate_action(&draft.action).err(),
        ]
        .into_iter()
        .flatten()
        .collect();

        ValidationResult::from_errors(errors)
    }

    /// Re-check an already typed rule, e.g. one restored from persistence
    pub fn validate_rule(&self, rule: &AutomationRule) -> Result<(), ValidationError> {
        self.validate_name(&rule.name)?;
        self.validate_threshold(Some(rule.threshold_value))?;
        self.validate_cooldown(rule.cooldown.as_secs())?;
        match &rule.action {
            ActionSpec::CreateAlert { title, .. } => {
                non_empty("alert_title", title)?;
            }
            ActionSpec::TriggerActuator { command, .. } => {
                self.validate_command(command)?;
            }
        }
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<String, ValidationError> {
        let name = non_empty("name", name)?;
        let len = name.chars().count();
        if len > self.config.max_name_len {
            return Err(ValidationError::TooLong {
                field: "name",
                len,
                max: self.config.max_name_len,
            });
        }
        Ok(name)
    }

    fn validate_deployment(
        &self,
        deployment: Option<DeploymentId>,
    ) -> Result<DeploymentId, ValidationError> {
        deployment.ok_or(ValidationError::MissingField("sensor_deployment_id"))
    }

    fn validate_operator(&self, raw: &str) -> Result<ComparisonOperator, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::MissingField("operator"));
        }
        raw.parse::<ComparisonOperator>()
            .map_err(|e| ValidationError::UnknownOperator(e.0))
    }

    fn validate_threshold(&self, threshold: Option<f64>) -> Result<f64, ValidationError> {
        let threshold = threshold.ok_or(ValidationError::MissingField("threshold_value"))?;
        if threshold.is_finite() {
            Ok(threshold)
        } else {
            Err(ValidationError::NonFiniteThreshold(threshold))
        }
    }

    fn validate_cooldown(&self, seconds: u64) -> Result<Duration, ValidationError> {
        if seconds > self.config.max_cooldown_secs {
            return Err(ValidationError::OutOfRange {
                field: "cooldown_seconds",
                value: seconds as f64,
                min: 0.0,
                max: self.config.max_cooldown_secs as f64,
            });
        }
        Ok(Duration::from_secs(seconds))
    }

    fn validate_command(&self, command: &str) -> Result<String, ValidationError> {
        let command = non_empty("actuator_command", command)?;
        let len = command.chars().count();
        if len > self.config.max_command_len {
            return Err(ValidationError::TooLong {
                field: "actuator_command",
                len,
                max: self.config.max_command_len,
            });
        }
        Ok(command)
    }

    fn validate_action(&self, draft: &ActionDraft) -> Result<ActionSpec, ValidationError> {
        let action_type = draft.action_type.trim().to_ascii_lowercase();
        match action_type.as_str() {
            "" => Err(ValidationError::MissingField("action_type")),
            "create_alert" | "alert" => {
                let title = draft
                    .alert_title
                    .as_deref()
                    .ok_or(ValidationError::MissingField("alert_title"))?;
                let title = non_empty("alert_title", title)?;
                let severity = draft
                    .alert_severity
                    .as_deref()
                    .ok_or(ValidationError::MissingField("alert_severity"))?
                    .parse::<AlertSeverity>()
                    .map_err(|e| ValidationError::UnknownSeverity(e.0))?;

                Ok(ActionSpec::CreateAlert {
                    title,
                    message: draft.alert_message.as_deref().unwrap_or_default().trim().to_string(),
                    severity,
                })
            }
            "trigger_actuator" | "actuator" => {
                let target_deployment_id = draft
                    .target_deployment_id
                    .ok_or(ValidationError::MissingField("target_deployment_id"))?;
                let command = draft
                    .actuator_command
                    .as_deref()
                    .ok_or(ValidationError::MissingField("actuator_command"))?;
                let command = self.validate_command(command)?;

                Ok(ActionSpec::TriggerActuator {
                    target_deployment_id,
                    command,
                    parameters: draft.command_parameters.clone().unwrap_or_default(),
                })
            }
            _ => Err(ValidationError::UnknownActionType(draft.action_type.clone())),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(trimmed.to_string())
    }
}
