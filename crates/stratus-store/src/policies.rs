use anyhow::Result;

use stratus_core::agent::Agent;
use stratus_core::errortypes::ErrorData;
use stratus_core::policy::{Decision, Policy, Scope};
use stratus_core::user::User;

use crate::database::Database;
use crate::{nodes, users};

/// Validate a policy record. Secondary device authentication requires at
/// least one node with an admin domain configured.
pub fn validate(db: &Database, policy: &Policy) -> Result<Option<ErrorData>> {
    if policy.admin_device_secondary || policy.user_device_secondary {
        let has_user_node = nodes::get_all(db)?
            .iter()
            .any(|node| !node.admin_domain.is_empty());

        if !has_user_node {
            return Ok(Some(ErrorData::new(
                "user_node_unavailable",
                "At least one node must have a user domain configured \
                 to use secondary device authentication",
            )));
        }
    }

    Ok(None)
}

/// Apply an evaluation decision: a Disable decision commits the single
/// `disabled` field on the user before reporting `unauthorized`.
fn apply(db: &Database, usr: &mut User, decision: Decision) -> Result<Option<ErrorData>> {
    match decision {
        Decision::Allow => Ok(None),
        Decision::Deny { error, message } => Ok(Some(ErrorData::new(&error, &message))),
        Decision::Disable => {
            usr.disabled = true;
            users::commit_fields(db, usr, &["disabled"])?;
            Ok(Some(ErrorData::new("unauthorized", "Not authorized")))
        }
    }
}

/// Evaluate the full rule set, network rules included, for an admin
/// login.
pub fn validate_admin(
    db: &Database,
    policy: &Policy,
    usr: &mut User,
    agent: &Agent,
) -> Result<Option<ErrorData>> {
    apply(db, usr, policy.evaluate(agent, Scope::Admin))
}

/// Evaluate the reduced rule set (no network whitelist/blacklist) for a
/// user login.
pub fn validate_user(
    db: &Database,
    policy: &Policy,
    usr: &mut User,
    agent: &Agent,
) -> Result<Option<ErrorData>> {
    apply(db, usr, policy.evaluate(agent, Scope::User))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::net::IpAddr;
    use stratus_core::node::{HypervisorKind, Node};
    use stratus_core::policy::{BLACKLIST_NETWORKS, Rule, WHITELIST_NETWORKS};
    use uuid::Uuid;

    fn policy_with(rules: Vec<Rule>) -> Policy {
        let rules: BTreeMap<String, Rule> =
            rules.into_iter().map(|r| (r.kind.clone(), r)).collect();
        Policy {
            id: Uuid::new_v4(),
            name: "office".to_string(),
            roles: vec![],
            rules,
            admin_secondary: None,
            user_secondary: None,
            admin_device_secondary: false,
            user_device_secondary: false,
        }
    }

    fn seed_user(db: &Database) -> User {
        let usr = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            disabled: false,
        };
        db.users().insert(&usr).unwrap();
        usr
    }

    fn agent(ip: &str) -> Agent {
        Agent {
            ip: ip.parse::<IpAddr>().unwrap(),
            ..Agent::default()
        }
    }

    #[test]
    fn test_blacklist_disable_commits_user() {
        let db = Database::new();
        let mut usr = seed_user(&db);
        let policy = policy_with(vec![Rule {
            kind: BLACKLIST_NETWORKS.to_string(),
            disable: true,
            values: vec!["10.9.0.0/24".to_string()],
        }]);

        let err_data = validate_admin(&db, &policy, &mut usr, &agent("10.9.0.5"))
            .unwrap()
            .unwrap();
        assert_eq!(err_data.error, "unauthorized");
        assert!(users::get(&db, usr.id).unwrap().disabled);

        // A second matching login still reports unauthorized.
        let err_data = validate_admin(&db, &policy, &mut usr, &agent("10.9.0.5"))
            .unwrap()
            .unwrap();
        assert_eq!(err_data.error, "unauthorized");
    }

    #[test]
    fn test_user_scope_skips_network_rules() {
        let db = Database::new();
        let mut usr = seed_user(&db);
        let policy = policy_with(vec![Rule {
            kind: WHITELIST_NETWORKS.to_string(),
            disable: false,
            values: vec!["10.0.0.0/24".to_string()],
        }]);

        assert!(
            validate_user(&db, &policy, &mut usr, &agent("10.9.0.5"))
                .unwrap()
                .is_none()
        );
        assert!(
            validate_admin(&db, &policy, &mut usr, &agent("10.9.0.5"))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_device_secondary_requires_user_node() {
        let db = Database::new();
        let mut policy = policy_with(vec![]);
        policy.admin_device_secondary = true;

        let err_data = validate(&db, &policy).unwrap().unwrap();
        assert_eq!(err_data.error, "user_node_unavailable");

        db.nodes()
            .insert(&Node {
                id: Uuid::new_v4(),
                name: "hv1".to_string(),
                zone: None,
                hypervisor: HypervisorKind::Kvm,
                admin_domain: "admin.example.com".to_string(),
                cpu_units_res: 0,
                memory_units_res: 0.0,
            })
            .unwrap();

        assert!(validate(&db, &policy).unwrap().is_none());
    }
}
