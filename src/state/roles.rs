/// Authorization role attached to an account and copied onto its user at
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Member,
    Moderator,
    Admin,
    Owner,
}

impl Role {
    /// Parse a role name. Unknown names default to Member.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Role::Owner,
            "admin" => Role::Admin,
            "moderator" => Role::Moderator,
            _ => Role::Member,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Member => "member",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::Member);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("owner"), Role::Owner);
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse("moderator"), Role::Moderator);
        assert_eq!(Role::parse("unknown"), Role::Member);
        assert_eq!(Role::parse(Role::Admin.as_str()), Role::Admin);
    }
}
