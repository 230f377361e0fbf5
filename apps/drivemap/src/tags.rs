//! EBS tag lookup through the AWS CLI.
//!
//! The CLI brings its own credential chain (the instance role at boot) and request signing.
//! All tags of a volume are fetched with one `describe-tags` call and cached, so reading
//! `DriveLabel` and `DriveLetter` costs a single process spawn per volume.

use letter_remap::{IgnorePoison, TagLookup, TagLookupError, VolumeId};
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;
use std::sync::Mutex;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTagsOutput {
    #[serde(default)]
    tags: Vec<TagDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagDescription {
    key: String,
    #[serde(default)]
    value: String,
    resource_id: String,
}

pub struct AwsCliTagLookup {
    program: String,
    region: String,
    cache: Mutex<HashMap<VolumeId, HashMap<String, String>>>,
}

impl AwsCliTagLookup {
    pub fn new(program: &str, region: &str) -> Self {
        Self {
            program: program.to_string(),
            region: region.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn args(&self, volume_id: &VolumeId) -> Vec<String> {
        vec![
            "ec2".to_string(),
            "describe-tags".to_string(),
            "--region".to_string(),
            self.region.clone(),
            "--filters".to_string(),
            format!("Name=resource-id,Values={}", volume_id),
            "--output".to_string(),
            "json".to_string(),
        ]
    }

    fn fetch(&self, volume_id: &VolumeId) -> Result<HashMap<String, String>, TagLookupError> {
        debug!("Running {} ec2 describe-tags for {}", self.program, volume_id);
        let output = Command::new(&self.program)
            .args(self.args(volume_id))
            .output()
            .map_err(|e| TagLookupError::Unavailable(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TagLookupError::Unavailable(format!(
                "describe-tags exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        parse_describe_tags(&String::from_utf8_lossy(&output.stdout), volume_id)
    }
}

impl TagLookup for AwsCliTagLookup {
    fn lookup_tag(&self, volume_id: &VolumeId, tag: &str) -> Result<Option<String>, TagLookupError> {
        if let Some(tags) = self.cache.lock_ignore_poison().get(volume_id) {
            return Ok(tags.get(tag).cloned());
        }

        let tags = self.fetch(volume_id)?;
        let value = tags.get(tag).cloned();
        self.cache.lock_ignore_poison().insert(volume_id.clone(), tags);
        Ok(value)
    }
}

/// Parses `describe-tags` JSON, keeping only tags of `volume_id`.
fn parse_describe_tags(json: &str, volume_id: &VolumeId) -> Result<HashMap<String, String>, TagLookupError> {
    let output: DescribeTagsOutput =
        serde_json::from_str(json).map_err(|e| TagLookupError::InvalidResponse(e.to_string()))?;
    Ok(output
        .tags
        .into_iter()
        .filter(|t| t.resource_id == volume_id.as_str())
        .map(|t| (t.key, t.value))
        .collect())
}
