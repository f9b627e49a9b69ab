//! JdkVersion parsing, release-stream derivation (§4.7.1), and
//! resolved-in-build precedence (§4.7.2).

use crate::types::{JdkVersion, ReleaseStream};

/// A fix-version string is "scratch" (no real version) if absent, starts
/// with "tbd", or is "unknown" (case-insensitive).
pub fn is_scratch_version(v: &str) -> bool {
    let lower = v.trim().to_lowercase();
    lower.is_empty() || lower.starts_with("tbd") || lower == "unknown"
}

/// Parse a dotted/hyphenated version string such as `"17.0.2"`,
/// `"11-pool"`, `"9+updates-openjdk"` into its numeric/opt components.
/// Non-numeric feature-suffix tokens become `opt`.
pub fn parse_version(raw: &str) -> Option<JdkVersion> {
    let raw = raw.trim();
    if is_scratch_version(raw) {
        return None;
    }

    // Split a trailing "-pool"/"-open"/other opt suffix, if present.
    let (core, opt) = match raw.split_once('-') {
        Some((c, o)) => (c, Some(o.to_string())),
        None => (raw, None),
    };

    let mut parts = core.split('.');
    let feature: u32 = parts.next()?.parse().ok()?;
    let interim = parts.next().and_then(|p| p.parse().ok());
    let update = parts.next().and_then(|p| p.parse().ok());
    let patch = parts.next().and_then(|p| p.parse().ok());

    Some(JdkVersion { feature, interim, update, patch, opt, resolved_in_build: None })
}

/// Parse a resolved-in-build value, e.g. `"b12"` -> `Some(12)`. `"master"`
/// and `"team"` and anything non-numeric return `None`.
fn parse_build_number(resolved_in_build: &str) -> Option<u32> {
    resolved_in_build.strip_prefix('b').and_then(|n| n.parse().ok())
}

/// §4.7.1: the set of release streams a JdkVersion belongs to.
pub fn release_streams(v: &JdkVersion) -> Vec<ReleaseStream> {
    if v.feature >= 9 {
        return release_streams_modern(v);
    }
    if v.feature == 7 || v.feature == 8 {
        return release_streams_legacy(v);
    }
    Vec::new()
}

fn release_streams_modern(v: &JdkVersion) -> Vec<ReleaseStream> {
    let feature = v.feature;
    match v.update {
        None => vec![
            ReleaseStream("features".to_string()),
            ReleaseStream(format!("{feature}+updates-oracle")),
            ReleaseStream(format!("{feature}+updates-openjdk")),
        ],
        Some(u) if u == 1 || u == 2 => vec![
            ReleaseStream(format!("{feature}+updates-oracle")),
            ReleaseStream(format!("{feature}+updates-openjdk")),
        ],
        Some(_) => {
            let is_oracle = v.opt.as_deref() == Some("oracle");
            if is_oracle {
                if v.patch.is_some() {
                    vec![ReleaseStream(format!("{feature}+bpr"))]
                } else {
                    vec![ReleaseStream(format!("{feature}+updates-oracle"))]
                }
            } else {
                vec![ReleaseStream(format!("{feature}+updates-openjdk"))]
            }
        }
    }
}

fn release_streams_legacy(v: &JdkVersion) -> Vec<ReleaseStream> {
    let feature = v.feature;
    let Some(rib) = v.resolved_in_build.as_deref() else {
        return vec![ReleaseStream(feature.to_string())];
    };
    if rib.eq_ignore_ascii_case("team") {
        return Vec::new();
    }
    let Some(n) = parse_build_number(rib) else {
        return vec![ReleaseStream(feature.to_string())];
    };
    if n < 31 {
        vec![ReleaseStream(feature.to_string())]
    } else if n < 60 {
        vec![ReleaseStream(format!("{feature}+bpr"))]
    } else {
        Vec::new()
    }
}

/// §4.7.2: decide whether `current` may be overwritten by `candidate`.
pub fn should_overwrite_resolved_in_build(current: Option<&str>, candidate: &str) -> bool {
    if candidate.eq_ignore_ascii_case("team") {
        return false;
    }
    match current {
        None => true,
        Some(cur) if cur.eq_ignore_ascii_case("team") => true,
        Some(cur) if cur.eq_ignore_ascii_case("master") => candidate.eq_ignore_ascii_case("master"),
        Some(cur) => match (parse_build_number(cur), parse_build_number(candidate)) {
            (Some(cur_n), Some(cand_n)) => cand_n < cur_n,
            _ => candidate.eq_ignore_ascii_case(cur),
        },
    }
}

/// Drop streams that would contain fewer than 2 issues — §4.7.1's
/// "singleton streams are dropped" rule, applied once the caller has
/// counted membership per stream key.
pub fn drop_singleton_streams<K: Eq + std::hash::Hash + Clone>(
    counts: std::collections::HashMap<K, usize>,
) -> std::collections::HashSet<K> {
    counts.into_iter().filter(|(_, n)| *n >= 2).map(|(k, _)| k).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(feature: u32, update: Option<u32>) -> JdkVersion {
        JdkVersion { feature, interim: None, update, patch: None, opt: None, resolved_in_build: None }
    }

    #[test]
    fn scratch_versions_recognized() {
        assert!(is_scratch_version(""));
        assert!(is_scratch_version("tbd_major"));
        assert!(is_scratch_version("Unknown"));
        assert!(!is_scratch_version("17.0.2"));
    }

    #[test]
    fn parse_version_maps_feature_interim_update_patch_in_order() {
        let parsed = parse_version("17.0.2.1").unwrap();
        assert_eq!(parsed.feature, 17);
        assert_eq!(parsed.interim, Some(0));
        assert_eq!(parsed.update, Some(2));
        assert_eq!(parsed.patch, Some(1));
    }

    #[test]
    fn parse_version_of_a_real_update_release_feeds_the_update_tier_streams() {
        // "11.0.1" is feature=11, interim=0, update=1 - §4.7.1's update ∈
        // {1,2} branch, not the no-update three-stream branch.
        let parsed = parse_version("11.0.1").unwrap();
        assert_eq!(parsed.update, Some(1));
        assert_eq!(
            release_streams(&parsed),
            vec![ReleaseStream("11+updates-oracle".into()), ReleaseStream("11+updates-openjdk".into())]
        );
    }

    #[test]
    fn modern_feature_no_update_yields_three_streams() {
        let streams = release_streams(&v(17, None));
        assert_eq!(streams.len(), 3);
        assert!(streams.contains(&ReleaseStream("features".into())));
        assert!(streams.contains(&ReleaseStream("17+updates-oracle".into())));
        assert!(streams.contains(&ReleaseStream("17+updates-openjdk".into())));
    }

    #[test]
    fn modern_feature_update_one_or_two_yields_two_streams() {
        assert_eq!(release_streams(&v(17, Some(1))).len(), 2);
        assert_eq!(release_streams(&v(17, Some(2))).len(), 2);
    }

    #[test]
    fn modern_feature_update_above_two_non_oracle_yields_openjdk_stream_only() {
        let streams = release_streams(&v(11, Some(9)));
        assert_eq!(streams, vec![ReleaseStream("11+updates-openjdk".into())]);
    }

    #[test]
    fn modern_feature_update_above_two_oracle_with_patch_yields_bpr() {
        let mut version = v(11, Some(9));
        version.opt = Some("oracle".to_string());
        version.patch = Some(1);
        assert_eq!(release_streams(&version), vec![ReleaseStream("11+bpr".into())]);
    }

    #[test]
    fn legacy_feature_no_resolved_in_build_yields_bare_stream() {
        assert_eq!(release_streams(&v(8, None)), vec![ReleaseStream("8".into())]);
    }

    #[test]
    fn legacy_feature_low_build_number_yields_bare_stream() {
        let mut version = v(8, None);
        version.resolved_in_build = Some("b10".to_string());
        assert_eq!(release_streams(&version), vec![ReleaseStream("8".into())]);
    }

    #[test]
    fn legacy_feature_mid_build_number_yields_bpr_stream() {
        let mut version = v(8, None);
        version.resolved_in_build = Some("b45".to_string());
        assert_eq!(release_streams(&version), vec![ReleaseStream("8+bpr".into())]);
    }

    #[test]
    fn legacy_feature_high_build_number_is_ignored() {
        let mut version = v(8, None);
        version.resolved_in_build = Some("b61".to_string());
        assert!(release_streams(&version).is_empty());
    }

    #[test]
    fn legacy_feature_team_build_is_ignored() {
        let mut version = v(8, None);
        version.resolved_in_build = Some("team".to_string());
        assert!(release_streams(&version).is_empty());
    }

    #[test]
    fn resolved_in_build_never_overwritten_with_team() {
        assert!(!should_overwrite_resolved_in_build(Some("b10"), "team"));
        assert!(!should_overwrite_resolved_in_build(None, "team"));
    }

    #[test]
    fn master_only_overwrites_team() {
        assert!(should_overwrite_resolved_in_build(Some("team"), "master"));
        assert!(!should_overwrite_resolved_in_build(Some("b10"), "master"));
    }

    #[test]
    fn numbered_build_overwritten_only_by_lower_number() {
        assert!(should_overwrite_resolved_in_build(Some("b20"), "b15"));
        assert!(!should_overwrite_resolved_in_build(Some("b10"), "b15"));
    }

    #[test]
    fn unset_is_always_overwritable() {
        assert!(should_overwrite_resolved_in_build(None, "b15"));
    }
}
