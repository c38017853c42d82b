use std::fmt;
use std::str::FromStr;

/// Collections exposed by the marketplace backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Businesses,
    Professionals,
    Ads,
    Users,
    Roles,
    Reports,
    Notifications,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::Businesses,
        Resource::Professionals,
        Resource::Ads,
        Resource::Users,
        Resource::Roles,
        Resource::Reports,
        Resource::Notifications,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Resource::Businesses => "businesses",
            Resource::Professionals => "professionals",
            Resource::Ads => "ads",
            Resource::Users => "users",
            Resource::Roles => "roles",
            Resource::Reports => "reports",
            Resource::Notifications => "notifications",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Resource::Businesses => "Businesses",
            Resource::Professionals => "Professionals",
            Resource::Ads => "Ads",
            Resource::Users => "Users",
            Resource::Roles => "Roles",
            Resource::Reports => "Reports",
            Resource::Notifications => "Notifications",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Resource::ALL
            .into_iter()
            .find(|r| r.path() == name)
            .ok_or_else(|| format!("Unknown resource: {}", s))
    }
}
