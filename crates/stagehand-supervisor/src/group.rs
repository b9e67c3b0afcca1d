//! Stage group definitions handed to a supervisor.

use crate::config::{GroupConfig, PropertyMap, StageConfig};
use stagehand_common::{GroupName, StagingResult};
use stagehand_staging::{Artifact, DirectoryArtifactStore};
use std::fmt;
use std::sync::Arc;

/// Everything a supervisor needs to know about one stage group.
#[derive(Clone)]
pub struct StageGroupSpec {
    pub name: GroupName,
    pub stages: Vec<StageConfig>,
    pub artifacts: Vec<Arc<dyn Artifact>>,
    pub properties: PropertyMap,
}

impl StageGroupSpec {
    pub fn new(name: GroupName) -> Self {
        Self {
            name,
            stages: Vec::new(),
            artifacts: Vec::new(),
            properties: PropertyMap::new(),
        }
    }

    /// Build from configuration, loading artifacts from the group's
    /// `artifacts_directory` if one is set.
    pub async fn from_config(config: &GroupConfig) -> StagingResult<Self> {
        let artifacts = match &config.artifacts_directory {
            Some(dir) => DirectoryArtifactStore::new(dir).artifacts().await?,
            None => Vec::new(),
        };

        Ok(Self {
            name: config.name.clone(),
            stages: config.stages.clone(),
            artifacts,
            properties: config.properties.clone(),
        })
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_artifact(mut self, artifact: Arc<dyn Artifact>) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Group properties, overlaid with the stage's own properties when the
    /// group has exactly one stage.
    pub fn effective_configuration(&self) -> PropertyMap {
        let mut merged = self.properties.clone();
        if let [stage] = self.stages.as_slice() {
            for (key, value) in &stage.properties {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

impl fmt::Debug for StageGroupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageGroupSpec")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field(
                "artifacts",
                &self.artifacts.iter().map(|a| a.filename()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
