use serde::Serialize;
use serde_json::Value;

/// One analysis or team as the data subsystem reports it. `detail` is the
/// full record; the hub only needs `id` to filter by access rights.
#[derive(Clone, Debug, Serialize)]
pub struct ResourceRecord {
    pub id: String,
    #[serde(flatten)]
    pub detail: Value,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, detail: Value) -> Self {
        ResourceRecord {
            id: id.into(),
            detail,
        }
    }
}

/// Full business-data snapshot handed over by the data subsystem.
/// `team_tree` is the folder structure keyed by team id.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SnapshotData {
    pub analyses: Vec<ResourceRecord>,
    pub teams: Vec<ResourceRecord>,
    pub team_tree: Value,
}
