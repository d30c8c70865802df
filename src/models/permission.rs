/// Permissions the hub asks the authorization subsystem about. The relational
/// side owns the role/permission tables; these are only lookup keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewAnalysis,
    ViewTeam,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewAnalysis => "analysis.view",
            Permission::ViewTeam => "team.view",
        }
    }
}
