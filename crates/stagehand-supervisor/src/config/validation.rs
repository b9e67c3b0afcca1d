use super::*;
use crate::runtime::{parse_retries, JAVA_LOCATION_KEY, JVM_PARAMETERS_KEY, RETRIES_KEY};
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &FleetConfig) -> Result<()> {
    validate_supervisor_options(&config.supervisor)?;
    validate_group_configs(&config.groups)?;
    Ok(())
}

/// Validate supervisor options
fn validate_supervisor_options(options: &SupervisorOptions) -> Result<()> {
    if options.control_plane_port == 0 {
        return Err(anyhow!("Control plane port must be between 1 and 65535, got: 0"));
    }

    if options.performance_logging && options.performance_logging_port == 0 {
        return Err(anyhow!(
            "Performance logging port must be between 1 and 65535 when performance logging is enabled"
        ));
    }

    if options.control_plane_host.trim().is_empty() {
        return Err(anyhow!("Control plane host cannot be empty"));
    }

    if options.entry_point.trim().is_empty() {
        return Err(anyhow!("Entry point cannot be empty"));
    }

    Ok(())
}

/// Validate all group configurations
fn validate_group_configs(groups: &[GroupConfig]) -> Result<()> {
    // Check for duplicate names
    let mut names = HashSet::new();
    for group in groups {
        if !names.insert(&group.name) {
            return Err(anyhow!("Duplicate stage group name: {}", group.name));
        }

        validate_properties(&group.properties)
            .map_err(|e| anyhow!("Stage group {}: {}", group.name, e))?;

        for stage in &group.stages {
            if stage.name.trim().is_empty() {
                return Err(anyhow!("Stage group {}: stage name cannot be empty", group.name));
            }
            validate_properties(&stage.properties)
                .map_err(|e| anyhow!("Stage {} in group {}: {}", stage.name, group.name, e))?;
        }
    }

    Ok(())
}

/// Validate the types of the runtime keys in a property map
fn validate_properties(properties: &PropertyMap) -> Result<()> {
    for key in [JAVA_LOCATION_KEY, JVM_PARAMETERS_KEY] {
        match properties.get(key) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => return Err(anyhow!("{} must be a string, got: {}", key, other)),
        }
    }

    match properties.get(RETRIES_KEY) {
        None | Some(Value::Null) => {}
        Some(value) => {
            parse_retries(value).map_err(|e| anyhow!("invalid {}: {}", RETRIES_KEY, e))?;
        }
    }

    Ok(())
}
