//! Target resolution.
//!
//! Resolution order:
//! 1. explicit address from the caller
//! 2. an environment variable, read once when the resolver is built
//! 3. the first host of the first recognized group in an Ansible-style
//!    YAML inventory, searched recursively
//!
//! # Graceful Degradation
//!
//! - Blank values: treated as absent
//! - Inventory file missing: `Resolution::Skip`
//! - No recognized group, or only empty groups: `Resolution::Skip`
//! - Inventory present but malformed: `PreflightError::Inventory`
//! - Address that would be read as an ssh option: `PreflightError::InvalidTarget`

use crate::config::InventorySettings;
use crate::PreflightError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where a target address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    Override,
    Environment,
    Inventory,
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFrom::Override => write!(f, "override"),
            ResolvedFrom::Environment => write!(f, "environment"),
            ResolvedFrom::Inventory => write!(f, "inventory"),
        }
    }
}

/// The host a run verifies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub user: String,
    pub port: u16,
    pub resolved_from: ResolvedFrom,
    /// Inventory host name, when resolved from inventory
    pub host_name: Option<String>,
}

impl Target {
    pub fn new(
        address: &str,
        user: &str,
        port: u16,
        resolved_from: ResolvedFrom,
    ) -> Result<Self, PreflightError> {
        let address = address.trim();
        if address.is_empty()
            || address.starts_with('-')
            || address.chars().any(|c| c.is_whitespace() || c == '@')
        {
            return Err(PreflightError::InvalidTarget(address.to_string()));
        }
        Ok(Target {
            address: address.to_string(),
            user: user.to_string(),
            port,
            resolved_from,
            host_name: None,
        })
    }

    /// `user@address` as handed to the ssh client
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Address usable as a URL host (IPv6 literals bracketed)
    pub fn url_host(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.address, self.port)
    }
}

/// Result of host resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Target),
    /// No target available; every check is skipped with this reason
    Skip(String),
}

#[derive(Debug, Default, Deserialize)]
struct InventoryGroup {
    #[serde(default)]
    hosts: Option<IndexMap<String, Option<HostVars>>>,
    #[serde(default)]
    children: Option<IndexMap<String, Option<InventoryGroup>>>,
    #[serde(default)]
    vars: Option<HostVars>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct HostVars {
    ansible_host: Option<String>,
    ansible_user: Option<String>,
    ansible_port: Option<u16>,
}

/// Resolves the target for one run
#[derive(Debug, Clone)]
pub struct HostResolver {
    explicit: Option<String>,
    env_var: String,
    env_value: Option<String>,
    environment: Option<String>,
    inventory_path: PathBuf,
    groups: Vec<String>,
    default_user: String,
    default_port: u16,
    user_override: Option<String>,
    port_override: Option<u16>,
}

impl HostResolver {
    /// Resolver without an environment-provided address
    pub fn new(settings: &InventorySettings) -> Self {
        HostResolver {
            explicit: None,
            env_var: settings.address_env.clone(),
            env_value: None,
            environment: None,
            inventory_path: settings.path.clone(),
            groups: settings.groups.clone(),
            default_user: settings.default_user.clone(),
            default_port: settings.default_port,
            user_override: None,
            port_override: None,
        }
    }

    /// Resolver that captures the configured address variable now
    pub fn from_env(settings: &InventorySettings) -> Self {
        let value = std::env::var(&settings.address_env).ok();
        Self::new(settings).with_environment_value(value)
    }

    pub fn with_explicit(mut self, address: Option<String>) -> Self {
        self.explicit = address;
        self
    }

    pub fn with_environment_value(mut self, value: Option<String>) -> Self {
        self.env_value = value;
        self
    }

    /// Environment name; its inventory group is searched first
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    /// Principal and port that win over inventory and defaults
    pub fn with_overrides(mut self, user: Option<String>, port: Option<u16>) -> Self {
        self.user_override = user;
        self.port_override = port;
        self
    }

    /// Groups in search order
    pub fn group_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        if let Some(env) = non_blank(self.environment.as_deref()) {
            order.push(env.to_string());
        }
        for group in &self.groups {
            if !order.contains(group) {
                order.push(group.clone());
            }
        }
        order
    }

    pub fn resolve(&self) -> Result<Resolution, PreflightError> {
        if let Some(address) = non_blank(self.explicit.as_deref()) {
            return self.resolved(address, None, ResolvedFrom::Override, None);
        }

        if let Some(address) = non_blank(self.env_value.as_deref()) {
            debug!(var = %self.env_var, "target taken from environment");
            return self.resolved(address, None, ResolvedFrom::Environment, None);
        }

        let path = self.inventory_path.display().to_string();
        let content = match std::fs::read_to_string(&self.inventory_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Resolution::Skip(format!(
                    "no target address: {} not set and inventory {} not found",
                    self.env_var, path
                )));
            }
            Err(e) => {
                return Err(PreflightError::Inventory {
                    path,
                    message: e.to_string(),
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Resolution::Skip(format!("inventory {} is empty", path)));
        }

        let inventory: IndexMap<String, Option<InventoryGroup>> = serde_yaml::from_str(&content)
            .map_err(|e| PreflightError::Inventory {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let order = self.group_order();
        for name in &order {
            let Some((group, inherited)) = find_group(&inventory, name, None) else {
                continue;
            };
            let Some((host, vars)) = group.hosts.as_ref().and_then(|hosts| hosts.first()) else {
                debug!(group = %name, "inventory group has no hosts");
                continue;
            };
            let vars = merge_vars(inherited, vars.as_ref());
            let address = non_blank(vars.ansible_host.as_deref()).unwrap_or(host.as_str());
            info!(group = %name, host = %host, "target taken from inventory");
            return self.resolved(address, Some(&vars), ResolvedFrom::Inventory, Some(host));
        }

        Ok(Resolution::Skip(format!(
            "no host found in groups [{}] of {}",
            order.join(", "),
            path
        )))
    }

    fn resolved(
        &self,
        address: &str,
        vars: Option<&HostVars>,
        from: ResolvedFrom,
        host_name: Option<&String>,
    ) -> Result<Resolution, PreflightError> {
        let user = self
            .user_override
            .clone()
            .or_else(|| vars.and_then(|v| v.ansible_user.clone()))
            .unwrap_or_else(|| self.default_user.clone());
        let port = self
            .port_override
            .or_else(|| vars.and_then(|v| v.ansible_port))
            .unwrap_or(self.default_port);

        let mut target = Target::new(address, &user, port, from)?;
        target.host_name = host_name.cloned();
        info!(host = %target, from = %from, "target resolved");
        Ok(Resolution::Resolved(target))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Depth-first search for a named group, carrying group vars down the path
fn find_group<'a>(
    groups: &'a IndexMap<String, Option<InventoryGroup>>,
    name: &str,
    inherited: Option<HostVars>,
) -> Option<(&'a InventoryGroup, Option<HostVars>)> {
    for (group_name, group) in groups {
        let Some(group) = group else {
            continue;
        };
        let vars = merge_vars(inherited.clone(), group.vars.as_ref());
        if group_name == name {
            return Some((group, Some(vars)));
        }
        if let Some(ref children) = group.children {
            if let Some(found) = find_group(children, name, Some(vars)) {
                return Some(found);
            }
        }
    }
    None
}

fn merge_vars(base: Option<HostVars>, overlay: Option<&HostVars>) -> HostVars {
    let mut merged = base.unwrap_or_default();
    if let Some(overlay) = overlay {
        if overlay.ansible_host.is_some() {
            merged.ansible_host = overlay.ansible_host.clone();
        }
        if overlay.ansible_user.is_some() {
            merged.ansible_user = overlay.ansible_user.clone();
        }
        if overlay.ansible_port.is_some() {
            merged.ansible_port = overlay.ansible_port;
        }
    }
    merged
}
