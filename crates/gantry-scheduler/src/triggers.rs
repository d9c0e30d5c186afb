//! Trigger matching and evaluation.

use gantry_core::error::{Error, Result};
use gantry_core::pipeline::{PipelineDefinition, TriggerConfig, TriggerType};
use gantry_core::run::TriggerInfo;

/// Event that can start a pipeline run.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Push { git_ref: String },
    PullRequest { git_ref: String },
    Manual { actor: Option<String> },
}

impl TriggerEvent {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerEvent::Push { .. } => TriggerType::Push,
            TriggerEvent::PullRequest { .. } => TriggerType::PullRequest,
            TriggerEvent::Manual { .. } => TriggerType::Manual,
        }
    }

    pub fn git_ref(&self) -> Option<&str> {
        match self {
            TriggerEvent::Push { git_ref } | TriggerEvent::PullRequest { git_ref } => {
                Some(git_ref.as_str())
            }
            TriggerEvent::Manual { .. } => None,
        }
    }

    /// Reject malformed events before any matching happens.
    pub fn validate(&self) -> Result<()> {
        match self {
            TriggerEvent::Push { git_ref } | TriggerEvent::PullRequest { git_ref } => {
                if git_ref.is_empty() {
                    return Err(Error::MalformedEvent(format!(
                        "{:?} event carries an empty ref",
                        self.trigger_type()
                    )));
                }
                Ok(())
            }
            TriggerEvent::Manual { .. } => Ok(()),
        }
    }

    /// The record of this event carried in the `RunResult`.
    pub fn trigger_info(&self) -> TriggerInfo {
        TriggerInfo {
            trigger_type: self.trigger_type(),
            git_ref: self.git_ref().map(str::to_string),
            triggered_by: match self {
                TriggerEvent::Manual { actor } => actor.clone(),
                _ => None,
            },
        }
    }
}

/// Matcher for deciding whether a pipeline run should be created.
///
/// An event is accepted iff some declared trigger matches it: same kind, and
/// for push/pull_request an accepted-ref pattern matching the event's ref.
/// Manual rules accept any manual dispatch regardless of ref. A pipeline
/// declaring no triggers accepts nothing.
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Check whether a pipeline should be triggered by an event.
    pub fn matches(&self, pipeline: &PipelineDefinition, event: &TriggerEvent) -> bool {
        pipeline
            .triggers
            .iter()
            .any(|trigger| self.trigger_matches(trigger, event))
    }

    fn trigger_matches(&self, trigger: &TriggerConfig, event: &TriggerEvent) -> bool {
        if trigger.trigger_type != event.trigger_type() {
            return false;
        }
        match event {
            TriggerEvent::Push { git_ref } | TriggerEvent::PullRequest { git_ref } => {
                self.ref_matches(&trigger.refs, git_ref)
            }
            TriggerEvent::Manual { .. } => true,
        }
    }

    fn ref_matches(&self, patterns: &[String], git_ref: &str) -> bool {
        if patterns.is_empty() {
            return true; // Match all refs if no patterns specified
        }
        patterns.iter().any(|p| self.glob_match(p, git_ref))
    }

    fn glob_match(&self, pattern: &str, text: &str) -> bool {
        if pattern == "*" || pattern == "**" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix("/**") {
            return text.starts_with(prefix);
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            let prefix_slash = format!("{}/", prefix);
            if text.starts_with(&prefix_slash) {
                return !text[prefix_slash.len()..].contains('/');
            }
            return false;
        }
        if pattern.contains('*') {
            let parts: Vec<&str> = pattern.split('*').collect();
            if parts.len() == 2 {
                return text.starts_with(parts[0]) && text.ends_with(parts[1]);
            }
        }
        pattern == text
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}
