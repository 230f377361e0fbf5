//! Boot sequence: bring disks online, converge letters and labels, run startup scripts.
//!
//! Nothing here aborts the boot. Each step logs its problems and the next one still runs;
//! startup scripts run even when the remap pass didn't converge.

use crate::config::AgentConfig;
use crate::metadata::MetadataClient;
use crate::scripts::{ScriptOutcome, ScriptRunner};
use crate::tags::AwsCliTagLookup;
use crate::windows::{PowerShell, WindowsStorage, WindowsTopology, online_disks};
use letter_remap::{
    DesiredAssignment, DryRunStorage, RemapReport, Remapper, ResolveError, ScratchLetter, StorageManager, TagLookup,
    TagNames, Topology, TopologyResolver,
};
use log::{error, info, warn};
use serde::Serialize;

/// What a boot run did, printed as JSON at the end.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootSummary {
    pub dry_run: bool,
    /// Disks brought online; `None` when the step was disabled or failed.
    pub disks_onlined: Option<usize>,
    pub region: Option<String>,
    pub report: Option<RemapReport>,
    /// Why there's no report.
    pub topology_error: Option<String>,
    pub scripts: Vec<ScriptOutcome>,
}

/// Resolves the topology, reads tags, and converges it through `storage`.
///
/// Without a tag lookup the desired assignment is empty and nothing changes.
pub fn remap_pass(
    resolver: &dyn TopologyResolver,
    storage: &dyn StorageManager,
    tags: Option<&dyn TagLookup>,
    names: &TagNames,
) -> Result<RemapReport, ResolveError> {
    let mut topology = resolver.resolve()?;
    for letter in topology.letter_collisions() {
        warn!("Letter {} is held by more than one volume", letter);
    }

    let desired = match tags {
        Some(lookup) => DesiredAssignment::from_tags(&topology, lookup, names),
        None => DesiredAssignment::new(),
    };
    info!("{} label(s) have a desired letter", desired.len());

    let scratch = ScratchLetter::choose(&topology);

    let report = Remapper::new(storage).run(&mut topology, &desired, scratch);
    log_report(&report);
    Ok(report)
}

fn log_report(report: &RemapReport) {
    for label in &report.missing_labels {
        info!("No volume carries label {:?}", label);
    }
    if report.is_converged() {
        info!("Remap converged after {} change(s)", report.mutations.len());
    } else {
        warn!(
            "Remap finished with {} failure(s) after {} change(s)",
            report.failures.len(),
            report.mutations.len()
        );
    }
}

/// Region for tag lookups: the configured one, else the instance's.
pub fn resolve_region(config: &AgentConfig) -> Option<String> {
    if let Some(region) = &config.region {
        return Some(region.clone());
    }
    let identity = MetadataClient::new(&config.metadata_endpoint, config.metadata_timeout()).and_then(|c| c.identity());
    match identity {
        Ok(identity) => {
            info!("Running on {} in {}", identity.instance_id, identity.region);
            Some(identity.region)
        }
        Err(e) => {
            warn!("No region configured and instance metadata unavailable ({}), skipping tag lookup", e);
            None
        }
    }
}

fn tag_lookup(config: &AgentConfig, region: Option<&str>) -> Option<AwsCliTagLookup> {
    region.map(|r| AwsCliTagLookup::new(&config.aws_cli, r))
}

/// Full boot run.
pub fn run(config: &AgentConfig) -> BootSummary {
    let shell = PowerShell::new(&config.powershell);
    let mut summary = BootSummary {
        dry_run: config.dry_run,
        ..Default::default()
    };

    if config.online_disks && !config.dry_run {
        match online_disks(&shell) {
            Ok(count) => summary.disks_onlined = Some(count),
            Err(e) => warn!("Couldn't list offline disks: {}", e),
        }
    }

    summary.region = resolve_region(config);
    let lookup = tag_lookup(config, summary.region.as_deref());
    let resolver = WindowsTopology::new(shell.clone());
    let windows_storage = WindowsStorage::new(shell);
    let storage: &dyn StorageManager = if config.dry_run { &DryRunStorage } else { &windows_storage };

    match remap_pass(
        &resolver,
        storage,
        lookup.as_ref().map(|l| l as &dyn TagLookup),
        &config.tag_names(),
    ) {
        Ok(report) => summary.report = Some(report),
        Err(e) => {
            error!("{}, skipping remap", e);
            summary.topology_error = Some(e.to_string());
        }
    }

    if let Some(dir) = &config.scripts_dir {
        summary.scripts = ScriptRunner::new(&config.powershell).run_all(dir);
    }
    summary
}

/// Remap pass against the real topology that only logs the changes it would make.
pub fn plan(config: &AgentConfig) -> Result<RemapReport, ResolveError> {
    let region = resolve_region(config);
    let lookup = tag_lookup(config, region.as_deref());
    let resolver = WindowsTopology::new(PowerShell::new(&config.powershell));
    remap_pass(
        &resolver,
        &DryRunStorage,
        lookup.as_ref().map(|l| l as &dyn TagLookup),
        &config.tag_names(),
    )
}

/// The volumes as the agent sees them.
pub fn topology(config: &AgentConfig) -> Result<Topology, ResolveError> {
    WindowsTopology::new(PowerShell::new(&config.powershell)).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use letter_remap::{DriveLetter, InMemoryStorage, StaticTags, Volume, VolumeRole};
    use std::net::TcpListener;

    fn l(s: &str) -> DriveLetter {
        DriveLetter::parse(s).unwrap()
    }

    struct BrokenResolver;

    impl TopologyResolver for BrokenResolver {
        fn resolve(&self) -> Result<Topology, ResolveError> {
            Err(ResolveError::EnumerationFailure("Get-Disk : Access denied".to_string()))
        }
    }

    fn storage() -> InMemoryStorage {
        InMemoryStorage::new(vec![
            Volume::new("disk0-part2", VolumeRole::Boot).with_letter(l("C")),
            Volume::new("vol-a", VolumeRole::Candidate).with_letter(l("E")).with_label("DATA"),
            Volume::new("vol-b", VolumeRole::Candidate).with_letter(l("F")).with_label("LOGS"),
        ])
    }

    #[test]
    fn test_remap_pass_converges() {
        let storage = storage();
        let tags = StaticTags::new().with_volume("vol-a", "DATA", "F").with_volume("vol-b", "LOGS", "E");

        let report = remap_pass(&storage, &storage, Some(&tags), &TagNames::default()).unwrap();

        assert!(report.is_converged());
        assert_eq!(report.moves().count(), 3);
        let after = storage.snapshot();
        assert_eq!(after.find_by_label("DATA").unwrap().letter, Some(l("F")));
        assert_eq!(after.find_by_label("LOGS").unwrap().letter, Some(l("E")));
        assert_eq!(after.find_by_label("LOGS").unwrap().id.as_str(), "vol-b");
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let storage = storage();
        let tags = StaticTags::new().with_volume("vol-a", "DATA", "F").with_volume("vol-b", "LOGS", "E");
        remap_pass(&storage, &storage, Some(&tags), &TagNames::default()).unwrap();
        storage.clear_applied();

        let report = remap_pass(&storage, &storage, Some(&tags), &TagNames::default()).unwrap();

        assert!(report.mutations.is_empty());
        assert!(storage.applied().is_empty());
    }

    #[test]
    fn test_remap_pass_without_tags_changes_nothing() {
        let storage = storage();
        let report = remap_pass(&storage, &storage, None, &TagNames::default()).unwrap();
        assert!(report.is_converged());
        assert!(report.mutations.is_empty());
        assert!(storage.applied().is_empty());
    }

    #[test]
    fn test_dry_run_storage_leaves_volumes_alone() {
        let storage = storage();
        let tags = StaticTags::new().with_volume("vol-a", "DATA", "F").with_volume("vol-b", "LOGS", "E");

        let report = remap_pass(&storage, &DryRunStorage, Some(&tags), &TagNames::default()).unwrap();

        assert_eq!(report.moves().count(), 3);
        assert!(storage.applied().is_empty());
        assert_eq!(storage.snapshot().find_by_label("DATA").unwrap().letter, Some(l("E")));
    }

    #[test]
    fn test_custom_tag_names() {
        let storage = storage();
        let tags = StaticTags::new()
            .with_tag("vol-a", "Letter", "G")
            .with_tag("vol-a", "Label", "DATA");
        let names = TagNames {
            letter: "Letter".to_string(),
            label: "Label".to_string(),
        };

        let report = remap_pass(&storage, &storage, Some(&tags), &names).unwrap();

        assert!(report.is_converged());
        assert_eq!(storage.snapshot().find_by_label("DATA").unwrap().letter, Some(l("G")));
    }

    #[test]
    fn test_resolve_failure_is_returned() {
        let storage = storage();
        let err = remap_pass(&BrokenResolver, &storage, None, &TagNames::default()).unwrap_err();
        assert!(err.to_string().contains("Access denied"));
        assert!(storage.applied().is_empty());
    }

    #[test]
    fn test_configured_region_skips_metadata() {
        let config = AgentConfig {
            region: Some("eu-central-1".to_string()),
            metadata_endpoint: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_region(&config).as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_unreachable_metadata_means_no_region() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let config = AgentConfig {
            metadata_endpoint: format!("http://127.0.0.1:{}", port),
            metadata_timeout_secs: 1,
            ..Default::default()
        };
        assert_eq!(resolve_region(&config), None);
        assert!(tag_lookup(&config, None).is_none());
    }

    #[test]
    fn test_summary_json() {
        let summary = BootSummary {
            dry_run: true,
            region: Some("us-east-1".to_string()),
            report: Some(RemapReport::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["dryRun"], true);
        assert_eq!(json["region"], "us-east-1");
        assert_eq!(json["report"]["failures"], serde_json::json!([]));
        assert_eq!(json["scripts"], serde_json::json!([]));
    }
}
