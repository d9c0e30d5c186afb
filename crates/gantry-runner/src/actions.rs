//! Reusable provisioning actions.
//!
//! A step that declares `uses` refers to one of these by name; the action
//! resolves the step's named parameters into the concrete command the runner
//! executes. The executor stays agnostic to what a step does: checkout,
//! interpreter setup, and dependency installation are all opaque commands by
//! the time they reach a runner.

use gantry_core::error::{Error, Result};
use std::collections::HashMap;

/// A provisioning capability addressable from a step's `uses` field.
pub trait ProvisioningAction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve named parameters into a shell command.
    fn resolve(&self, params: &HashMap<String, String>) -> Result<String>;
}

/// Check out source at a given ref into the job workspace.
///
/// Parameters: `ref` (required), `repository` (optional; defaults to the
/// `GANTRY_REPOSITORY` environment variable at run time).
struct CheckoutAction;

impl ProvisioningAction for CheckoutAction {
    fn name(&self) -> &'static str {
        "checkout"
    }

    fn resolve(&self, params: &HashMap<String, String>) -> Result<String> {
        let git_ref = params
            .get("ref")
            .ok_or_else(|| Error::Configuration("checkout requires a 'ref' parameter".into()))?;
        let repository = params
            .get("repository")
            .map(String::as_str)
            .unwrap_or("\"$GANTRY_REPOSITORY\"");

        Ok(format!(
            "git clone --depth 1 --branch {git_ref} {repository} ."
        ))
    }
}

/// Install a Python interpreter at a given version.
///
/// Parameters: `version` (required).
struct SetupPythonAction;

impl ProvisioningAction for SetupPythonAction {
    fn name(&self) -> &'static str {
        "setup-python"
    }

    fn resolve(&self, params: &HashMap<String, String>) -> Result<String> {
        let version = params.get("version").ok_or_else(|| {
            Error::Configuration("setup-python requires a 'version' parameter".into())
        })?;

        Ok(format!(
            "pyenv install --skip-existing {version} && pyenv local {version}"
        ))
    }
}

/// Install project dependencies with pip.
///
/// Parameters: `requirements` (a requirements file), `packages` (a
/// space-separated package list), `flags` (extra pip flags). At least one of
/// `requirements` or `packages` is required.
struct InstallDepsAction;

impl ProvisioningAction for InstallDepsAction {
    fn name(&self) -> &'static str {
        "install-deps"
    }

    fn resolve(&self, params: &HashMap<String, String>) -> Result<String> {
        let requirements = params.get("requirements");
        let packages = params.get("packages");
        if requirements.is_none() && packages.is_none() {
            return Err(Error::Configuration(
                "install-deps requires 'requirements' or 'packages'".into(),
            ));
        }

        let mut command = String::from("pip install");
        if let Some(flags) = params.get("flags") {
            command.push(' ');
            command.push_str(flags);
        }
        if let Some(file) = requirements {
            command.push_str(" -r ");
            command.push_str(file);
        }
        if let Some(list) = packages {
            command.push(' ');
            command.push_str(list);
        }
        Ok(command)
    }
}

/// Registry mapping `uses` names to provisioning actions.
pub struct ActionRegistry {
    actions: HashMap<&'static str, Box<dyn ProvisioningAction>>,
}

impl ActionRegistry {
    /// Registry with the built-in actions.
    pub fn builtin() -> Self {
        let mut registry = Self {
            actions: HashMap::new(),
        };
        registry.register(Box::new(CheckoutAction));
        registry.register(Box::new(SetupPythonAction));
        registry.register(Box::new(InstallDepsAction));
        registry
    }

    pub fn register(&mut self, action: Box<dyn ProvisioningAction>) {
        self.actions.insert(action.name(), action);
    }

    /// Resolve a `uses` reference into its command.
    pub fn resolve(&self, uses: &str, params: &HashMap<String, String>) -> Result<String> {
        let action = self
            .actions
            .get(uses)
            .ok_or_else(|| Error::Configuration(format!("unknown provisioning action '{uses}'")))?;
        action.resolve(params)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
