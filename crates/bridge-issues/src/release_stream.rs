//! Release-stream labeling (§4.7.1, §4.8): once a backport family's
//! membership changes, recompute which streams now hold more than one
//! member and keep exactly one "duplicate" label on all but the oldest.

use std::collections::HashMap;

use bridge_core::collaborators::IssueTracker;
use bridge_core::jdkversion::{parse_version, release_streams};
use bridge_core::types::{IssueRef, JdkVersion, ReleaseStream};

fn issue_jdk_version(issue: &IssueRef) -> Option<JdkVersion> {
    let raw = issue.fix_versions.first()?;
    let mut version = parse_version(raw)?;
    version.resolved_in_build = issue.resolved_in_build.clone();
    Some(version)
}

/// For every release stream spanning 2+ members of `family`, ensure `label`
/// is present on every member but the oldest (by `JdkVersion` order) and
/// absent from the oldest — §4.7.1's duplicate-release marker.
pub async fn label_release_stream_duplicates(
    tracker: &dyn IssueTracker,
    family: &[IssueRef],
    label: &str,
) -> anyhow::Result<()> {
    let mut by_stream: HashMap<ReleaseStream, Vec<(&IssueRef, JdkVersion)>> = HashMap::new();
    for issue in family {
        let Some(version) = issue_jdk_version(issue) else { continue };
        for stream in release_streams(&version) {
            by_stream.entry(stream).or_default().push((issue, version.clone()));
        }
    }

    for members in by_stream.into_values() {
        if members.len() < 2 {
            continue;
        }
        let mut sorted = members;
        sorted.sort_by(|a, b| a.1.cmp(&b.1));

        let (oldest, _) = sorted[0];
        if oldest.labels.contains(label) {
            tracker.remove_labels(&oldest.id, std::slice::from_ref(&label.to_string())).await?;
        }
        for (issue, _) in &sorted[1..] {
            if !issue.labels.contains(label) {
                tracker.add_labels(&issue.id, std::slice::from_ref(&label.to_string())).await?;
            }
        }
    }

    Ok(())
}
