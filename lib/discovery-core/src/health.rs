//! Health check records and passing-set comparison

use serde::{Deserialize, Deserializer, Serialize};

/// A point-in-time health signal reported by the registry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(default)]
    pub node: String,
    #[serde(rename = "CheckID", default)]
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub output: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_tags: Vec<String>,
}

impl HealthCheck {
    /// Compare identity, status and tags. `notes` and `output` are ignored.
    pub fn matches(&self, other: &HealthCheck) -> bool {
        self.node == other.node
            && self.check_id == other.check_id
            && self.name == other.name
            && self.status == other.status
            && self.service_id == other.service_id
            && self.service_name == other.service_name
            && self.service_tags == other.service_tags
    }
}

/// Keep the checks whose status is one of `statuses`
pub fn passing_checks<'a, I>(checks: I, statuses: &[String]) -> Vec<HealthCheck>
where
    I: IntoIterator<Item = &'a HealthCheck>,
{
    checks
        .into_iter()
        .filter(|check| statuses.iter().any(|s| *s == check.status))
        .cloned()
        .collect()
}

/// Set equality by bidirectional containment, ignoring member order
pub fn checks_equal(old: &[HealthCheck], new: &[HealthCheck]) -> bool {
    let contained = |a: &[HealthCheck], b: &[HealthCheck]| {
        a.iter().all(|check| b.iter().any(|other| other.matches(check)))
    };
    contained(old, new) && contained(new, old)
}

/// Treat a JSON `null` as the type's default value
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
