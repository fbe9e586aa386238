use crate::error::LinkedEventsError;
use crate::models::Organization;

/// Outcome of checking whether a caller may publish events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The caller belongs to exactly one organization, which publishes.
    Authorized { publisher: String },
    Unauthenticated,
    NoOrganization,
    MultipleOrganizations,
}

impl Authorization {
    /// Decide from the caller (if any) and the organizations they belong to.
    pub fn resolve(user_id: Option<&str>, organizations: &[Organization]) -> Self {
        if user_id.is_none() {
            return Authorization::Unauthenticated;
        }
        match organizations {
            [] => Authorization::NoOrganization,
            [organization] => Authorization::Authorized {
                publisher: organization.id.clone(),
            },
            _ => Authorization::MultipleOrganizations,
        }
    }

    /// Publisher id, or the matching client error.
    pub fn publisher(self) -> Result<String, LinkedEventsError> {
        match self {
            Authorization::Authorized { publisher } => Ok(publisher),
            Authorization::Unauthenticated => Err(LinkedEventsError::Unauthenticated),
            Authorization::NoOrganization => Err(LinkedEventsError::NoOrganization),
            Authorization::MultipleOrganizations => Err(LinkedEventsError::MultipleOrganizations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(id: &str) -> Organization {
        Organization {
            id: id.into(),
            name: format!("Organization {id}"),
            data_source: "system".into(),
        }
    }

    #[test]
    fn test_single_organization_publishes() {
        let auth = Authorization::resolve(Some("alice"), &[org("org:1")]);
        assert_eq!(auth, Authorization::Authorized { publisher: "org:1".into() });
        assert_eq!(auth.publisher().unwrap(), "org:1");
    }

    #[test]
    fn test_anonymous_caller() {
        let auth = Authorization::resolve(None, &[org("org:1")]);
        assert_eq!(auth, Authorization::Unauthenticated);
        assert!(matches!(auth.publisher(), Err(LinkedEventsError::Unauthenticated)));
    }

    #[test]
    fn test_zero_or_many_organizations() {
        assert_eq!(Authorization::resolve(Some("bob"), &[]), Authorization::NoOrganization);
        assert_eq!(
            Authorization::resolve(Some("bob"), &[org("org:1"), org("org:2")]),
            Authorization::MultipleOrganizations
        );
        let err = Authorization::MultipleOrganizations.publisher().unwrap_err();
        assert_eq!(
            err.to_string(),
            "User is connected to multiple organizations. This is currently not supported."
        );
    }
}
