//! Keyed aggregation of well features into groups with mean/SD/SEM/CV.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::config::{DiagnosisConfig, SampleRole, ThresholdType};
use crate::error::ConfigError;
use crate::features::{Feature, FeatureSet};
use crate::math::stats::{cv_percent, mean, sample_sd, sem};
use crate::plate::{WellDataStore, WellId, WellLabel, WellType};

pub const ALL_WELLS_GROUP: &str = "All Wells";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Ok,
    NoData,
    NoValidValues,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeatureSummary {
    pub n: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub sem: Option<f64>,
    pub cv: Option<f64>,
    pub values: Vec<f64>,
}

impl FeatureSummary {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            n: values.len(),
            mean: mean(&values),
            sd: sample_sd(&values),
            sem: sem(&values),
            cv: cv_percent(&values),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<WellId>,
    pub status: GroupStatus,
    pub summaries: BTreeMap<Feature, FeatureSummary>,
}

impl Group {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            status: GroupStatus::NoData,
            summaries: BTreeMap::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == GroupStatus::Ok
    }

    pub fn summary(&self, feature: Feature) -> Option<&FeatureSummary> {
        self.summaries.get(&feature)
    }

    pub fn mean(&self, feature: Feature) -> Option<f64> {
        self.summary(feature).and_then(|s| s.mean)
    }

    pub fn cv(&self, feature: Feature) -> Option<f64> {
        self.summary(feature).and_then(|s| s.cv)
    }

    pub fn n(&self, feature: Feature) -> usize {
        self.summary(feature).map(|s| s.n).unwrap_or(0)
    }
}

/// Builds one group from its members. Only non-null values enter the
/// statistics; status is judged on peak height.
pub fn summarize(name: impl Into<String>, members: Vec<WellId>, features: &FeatureSet) -> Group {
    let mut summaries = BTreeMap::new();
    for feature in Feature::ALL {
        let values: Vec<f64> = members
            .iter()
            .filter_map(|id| features.get(id).and_then(|f| f.value(feature)))
            .collect();
        summaries.insert(feature, FeatureSummary::from_values(values));
    }
    let status = if members.is_empty() {
        GroupStatus::NoData
    } else if summaries
        .get(&Feature::PeakHeight)
        .is_none_or(|s| s.n == 0)
    {
        GroupStatus::NoValidValues
    } else {
        GroupStatus::Ok
    };
    Group {
        name: name.into(),
        members,
        status,
        summaries,
    }
}

/// Groups every well by `key_fn`; wells mapped to `None` are left out.
pub fn aggregate<K, F>(features: &FeatureSet, store: &WellDataStore, key_fn: F) -> BTreeMap<K, Group>
where
    K: Ord + Clone + fmt::Display,
    F: Fn(&WellId, Option<&WellLabel>) -> Option<K>,
{
    let mut members: BTreeMap<K, Vec<WellId>> = BTreeMap::new();
    for well in store.wells() {
        if let Some(key) = key_fn(&well.id, well.label.as_ref()) {
            members.entry(key).or_default().push(well.id);
        }
    }
    members
        .into_iter()
        .map(|(key, ids)| {
            let group = summarize(key.to_string(), ids, features);
            (key, group)
        })
        .collect()
}

/// `agonist | concentration | sample_id` over the non-empty parts.
pub fn label_key(label: &WellLabel) -> Option<String> {
    let parts: Vec<&str> = [
        label.agonist.as_str(),
        label.concentration.as_str(),
        label.sample_id.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// Display-oriented grouping by label. An unlabeled plate collapses into a
/// single "All Wells" group.
pub fn aggregate_by_label(features: &FeatureSet, store: &WellDataStore) -> BTreeMap<String, Group> {
    let groups = aggregate(features, store, |_, label| label.and_then(label_key));
    if !groups.is_empty() {
        return groups;
    }
    let all: Vec<WellId> = store.wells().map(|w| w.id).collect();
    let mut out = BTreeMap::new();
    out.insert(
        ALL_WELLS_GROUP.to_string(),
        summarize(ALL_WELLS_GROUP, all, features),
    );
    out
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKey {
    Sample(String),
    PositiveControl,
    Ntc,
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKey::Sample(id) => write!(f, "{}", id),
            SampleKey::PositiveControl => f.write_str("positive_control"),
            SampleKey::Ntc => f.write_str("ntc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiagKey {
    pub sample: SampleKey,
    pub well_type: WellType,
}

impl DiagKey {
    pub fn new(sample: SampleKey, well_type: WellType) -> Self {
        Self { sample, well_type }
    }
}

impl fmt::Display for DiagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.sample, self.well_type)
    }
}

fn test_sample_id(well: &WellId, label: Option<&WellLabel>) -> String {
    match label {
        Some(l) if !l.sample_id.trim().is_empty() => l.sample_id.trim().to_string(),
        _ => format!("column {}", well.column()),
    }
}

/// Sample id of a labeled ATP, ionomycin or buffer well, if it names one.
fn labeled_sample(label: Option<&WellLabel>) -> Option<&WellLabel> {
    label.filter(|l| !l.sample_id.trim().is_empty() && l.well_type != WellType::Unlabeled)
}

/// Diagnostic key of a well, from its column role and its label (falling
/// back to the row position for the well type). Wells outside the assigned
/// columns are keyed by their label's sample id and well type.
pub fn diagnostic_key(
    well: &WellId,
    label: Option<&WellLabel>,
    cfg: &DiagnosisConfig,
) -> Option<DiagKey> {
    let Some(role) = cfg.role_of(well) else {
        let l = labeled_sample(label)?;
        if l.well_type == WellType::Buffer && !cfg.include_buffer {
            return None;
        }
        return Some(DiagKey::new(
            SampleKey::Sample(l.sample_id.trim().to_string()),
            l.well_type,
        ));
    };
    let well_type = match label.map(|l| l.well_type) {
        Some(t) if t != WellType::Unlabeled => t,
        _ => cfg.expected_type(well)?,
    };
    if well_type == WellType::Buffer && !cfg.include_buffer {
        return None;
    }
    let sample = match role {
        SampleRole::Test => SampleKey::Sample(test_sample_id(well, label)),
        SampleRole::Ntc => SampleKey::Ntc,
        SampleRole::PositiveControl => SampleKey::PositiveControl,
    };
    Some(DiagKey::new(sample, well_type))
}

/// Diagnosis-oriented grouping. Groups the downstream steps expect are
/// seeded so a missing control shows up as `no_data` rather than vanishing.
pub fn aggregate_diagnostic(
    features: &FeatureSet,
    store: &WellDataStore,
    cfg: &DiagnosisConfig,
) -> BTreeMap<DiagKey, Group> {
    let mut groups = aggregate(features, store, |id, label| diagnostic_key(id, label, cfg));

    let mut expected: Vec<DiagKey> = Vec::new();
    for sample in sample_ids(&groups) {
        expected.push(DiagKey::new(SampleKey::Sample(sample.clone()), WellType::Atp));
        expected.push(DiagKey::new(SampleKey::Sample(sample.clone()), WellType::Ionomycin));
        if cfg.include_buffer {
            expected.push(DiagKey::new(SampleKey::Sample(sample), WellType::Buffer));
        }
    }
    if !cfg.positive_control_columns.is_empty()
        || cfg.threshold_type == ThresholdType::PositiveControl
    {
        expected.push(DiagKey::new(SampleKey::PositiveControl, WellType::Atp));
        expected.push(DiagKey::new(SampleKey::PositiveControl, WellType::Ionomycin));
    }
    if !cfg.ntc_columns.is_empty() {
        expected.push(DiagKey::new(SampleKey::Ntc, WellType::Atp));
    }
    for key in expected {
        let name = key.to_string();
        groups.entry(key).or_insert_with(|| Group::empty(name));
    }
    groups
}

/// Test sample ids present in a diagnostic grouping, sorted.
pub fn sample_ids(groups: &BTreeMap<DiagKey, Group>) -> BTreeSet<String> {
    groups
        .keys()
        .filter_map(|k| match &k.sample {
            SampleKey::Sample(id) => Some(id.clone()),
            _ => None,
        })
        .collect()
}

/// Rejects layouts where a test sample id also labels positive-control wells.
pub fn check_roles(store: &WellDataStore, cfg: &DiagnosisConfig) -> Result<(), ConfigError> {
    let mut test_ids = BTreeSet::new();
    let mut pc_ids = BTreeSet::new();
    for well in store.wells() {
        match cfg.role_of(&well.id) {
            Some(SampleRole::Test) => {
                test_ids.insert(test_sample_id(&well.id, well.label.as_ref()));
            }
            None => {
                if let Some(label) = labeled_sample(well.label.as_ref()) {
                    test_ids.insert(label.sample_id.trim().to_string());
                }
            }
            Some(SampleRole::PositiveControl) => {
                if let Some(label) = &well.label {
                    let id = label.sample_id.trim();
                    if !id.is_empty() {
                        pc_ids.insert(id.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    match test_ids.intersection(&pc_ids).next() {
        Some(sample_id) => Err(ConfigError::SelfReferentialControl {
            sample_id: sample_id.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::WellFeatures;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    fn store_with(labels: &[(&str, Option<WellLabel>)]) -> WellDataStore {
        let mut store = WellDataStore::new(1.0);
        for (well, label) in labels {
            store.insert_raw(id(well), vec![1.0; 4]).unwrap();
            store.set_label(id(well), label.clone()).unwrap();
        }
        store
    }

    fn features_with(peaks: &[(&str, Option<f64>)]) -> FeatureSet {
        let mut set = FeatureSet::default();
        for (well, peak) in peaks {
            set.wells.insert(
                id(well),
                WellFeatures {
                    peak_height: *peak,
                    ..WellFeatures::empty(id(well))
                },
            );
        }
        set
    }

    #[test]
    fn label_key_joins_present_parts() {
        let l = WellLabel::new("ATP", "4026").with_concentration("100 µM");
        assert_eq!(label_key(&l).unwrap(), "ATP | 100 µM | 4026");
        let only_sample = WellLabel::new("", "498");
        assert_eq!(label_key(&only_sample).unwrap(), "498");
        assert_eq!(label_key(&WellLabel::new("", "")), None);
    }

    #[test]
    fn unlabeled_plate_is_all_wells() {
        let store = store_with(&[("A1", None), ("A2", None)]);
        let features = features_with(&[("A1", Some(1.0)), ("A2", Some(2.0))]);
        let groups = aggregate_by_label(&features, &store);
        let all = groups.get(ALL_WELLS_GROUP).unwrap();
        assert_eq!(all.members.len(), 2);
        assert_eq!(all.mean(Feature::PeakHeight), Some(1.5));
    }

    #[test]
    fn replicate_statistics() {
        let store = store_with(&[
            ("A1", Some(WellLabel::new("ATP", "s1"))),
            ("B1", Some(WellLabel::new("ATP", "s1"))),
        ]);
        let features = features_with(&[("A1", Some(1.0)), ("B1", Some(1.2))]);
        let groups = aggregate_by_label(&features, &store);
        let g = groups.get("ATP | s1").unwrap();
        assert!(g.is_ok());
        let s = g.summary(Feature::PeakHeight).unwrap();
        assert_eq!(s.n, 2);
        assert!((s.mean.unwrap() - 1.1).abs() < 1e-12);
        assert!((s.cv.unwrap() - 12.856).abs() < 1e-3);
        assert!((s.sem.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn null_values_excluded_and_status_reported() {
        let store = store_with(&[
            ("A1", Some(WellLabel::new("ATP", "s1"))),
            ("B1", Some(WellLabel::new("ATP", "s1"))),
            ("C1", Some(WellLabel::new("Ionomycin", "s1"))),
        ]);
        let features = features_with(&[("A1", Some(2.0)), ("B1", None), ("C1", None)]);
        let groups = aggregate_by_label(&features, &store);
        let atp = groups.get("ATP | s1").unwrap();
        assert_eq!(atp.n(Feature::PeakHeight), 1);
        assert_eq!(atp.summary(Feature::PeakHeight).unwrap().sem, Some(0.0));
        let iono = groups.get("Ionomycin | s1").unwrap();
        assert_eq!(iono.status, GroupStatus::NoValidValues);
        assert_eq!(Group::empty("x").status, GroupStatus::NoData);
    }

    #[test]
    fn diagnostic_keys_follow_roles() {
        let cfg = DiagnosisConfig {
            sample_columns: vec![1],
            positive_control_columns: vec![12],
            ..DiagnosisConfig::default()
        };
        let labeled = WellLabel::new("ATP", "P-01");
        assert_eq!(
            diagnostic_key(&id("A1"), Some(&labeled), &cfg),
            Some(DiagKey::new(SampleKey::Sample("P-01".into()), WellType::Atp))
        );
        assert_eq!(
            diagnostic_key(&id("E1"), None, &cfg),
            Some(DiagKey::new(SampleKey::Sample("column 1".into()), WellType::Ionomycin))
        );
        assert_eq!(
            diagnostic_key(&id("F12"), None, &cfg),
            Some(DiagKey::new(SampleKey::PositiveControl, WellType::Ionomycin))
        );
        assert_eq!(diagnostic_key(&id("A5"), None, &cfg), None);
    }

    #[test]
    fn labeled_wells_outside_columns_keyed_by_sample() {
        let cfg = DiagnosisConfig::default();
        let iono = WellLabel::new("Ionomycin", " P-02 ");
        assert_eq!(
            diagnostic_key(&id("E5"), Some(&iono), &cfg),
            Some(DiagKey::new(SampleKey::Sample("P-02".into()), WellType::Ionomycin))
        );
        let no_sample = WellLabel::new("ATP", "");
        assert_eq!(diagnostic_key(&id("A5"), Some(&no_sample), &cfg), None);
        let other = WellLabel::new("Carbachol", "P-02");
        assert_eq!(diagnostic_key(&id("B5"), Some(&other), &cfg), None);
        let buffer = WellLabel::new("Buffer", "P-02");
        let no_buffer = DiagnosisConfig {
            include_buffer: false,
            ..DiagnosisConfig::default()
        };
        assert_eq!(diagnostic_key(&id("G5"), Some(&buffer), &no_buffer), None);
    }

    #[test]
    fn diagnostic_aggregation_seeds_missing_controls() {
        let cfg = DiagnosisConfig {
            sample_columns: vec![1],
            threshold_type: ThresholdType::PositiveControl,
            ..DiagnosisConfig::default()
        };
        let store = store_with(&[("A1", None), ("E1", None)]);
        let features = features_with(&[("A1", Some(0.5)), ("E1", Some(1.0))]);
        let groups = aggregate_diagnostic(&features, &store, &cfg);
        let pc = groups
            .get(&DiagKey::new(SampleKey::PositiveControl, WellType::Ionomycin))
            .unwrap();
        assert_eq!(pc.status, GroupStatus::NoData);
        let buffer = groups
            .get(&DiagKey::new(SampleKey::Sample("column 1".into()), WellType::Buffer))
            .unwrap();
        assert!(buffer.members.is_empty());
        assert_eq!(sample_ids(&groups).len(), 1);
    }

    #[test]
    fn labeled_sample_cannot_be_its_own_control() {
        let cfg = DiagnosisConfig {
            positive_control_columns: vec![12],
            ..DiagnosisConfig::default()
        };
        let store = store_with(&[
            ("A3", Some(WellLabel::new("ATP", "S1"))),
            ("A12", Some(WellLabel::new("ATP", "S1"))),
        ]);
        assert!(matches!(
            check_roles(&store, &cfg),
            Err(ConfigError::SelfReferentialControl { .. })
        ));
    }

    #[test]
    fn self_referential_control_rejected() {
        let cfg = DiagnosisConfig {
            sample_columns: vec![1],
            positive_control_columns: vec![2],
            ..DiagnosisConfig::default()
        };
        let store = store_with(&[
            ("A1", Some(WellLabel::new("ATP", "S1"))),
            ("A2", Some(WellLabel::new("ATP", "S1"))),
        ]);
        assert_eq!(
            check_roles(&store, &cfg),
            Err(ConfigError::SelfReferentialControl {
                sample_id: "S1".into()
            })
        );
    }
}
