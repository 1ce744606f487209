use fabrica_core::auth::SYSTEM_ACTOR;
use fabrica_core::{Principal, ServiceError};

use crate::model::{DocState, Lifecycle, Rule};

/// Permission of rules only background jobs may run, as
/// [`Principal::system`]. No grant, not even `*` or root, matches it.
pub const SYSTEM_PERMISSION: &str = "system";

/// Find the rule for `action` from `current`.
///
/// - No rule names the action: `Validation` (unknown action).
/// - Rules exist but none starts at `current`: `InvalidTransition`.
pub fn resolve<S: DocState>(
    rules: &'static [Rule<S>],
    kind: &str,
    current: S,
    action: &str,
) -> Result<&'static Rule<S>, ServiceError> {
    let mut known = false;
    for rule in rules.iter().filter(|r| r.action == action) {
        known = true;
        if rule.from.contains(&current) {
            if rule.to.is_empty() {
                return Err(ServiceError::Internal(format!(
                    "rule {action} of {kind} has no target status"
                )));
            }
            return Ok(rule);
        }
    }

    if !known {
        return Err(ServiceError::Validation(format!("unknown action '{action}' for {kind}")));
    }
    Err(ServiceError::InvalidTransition(format!(
        "cannot {action} {kind} in status {current}"
    )))
}

/// Actions that can be taken from `current`, in table order.
pub fn available_actions<S: DocState>(rules: &'static [Rule<S>], current: S) -> Vec<&'static str> {
    let mut actions: Vec<&'static str> = Vec::new();
    for rule in rules.iter().filter(|r| r.from.contains(&current)) {
        if !actions.contains(&rule.action) {
            actions.push(rule.action);
        }
    }
    actions
}

/// Whether `principal` may run `rule`.
pub fn may_run<S: DocState>(principal: &Principal, rule: &Rule<S>) -> bool {
    if rule.permission == SYSTEM_PERMISSION {
        return principal.root && principal.user_id == SYSTEM_ACTOR;
    }
    principal.allows(rule.permission)
}

/// [`may_run`] as a `PermissionDenied` error.
pub fn require_rule<S: DocState>(
    principal: &Principal,
    kind: &str,
    rule: &Rule<S>,
) -> Result<(), ServiceError> {
    if may_run(principal, rule) {
        return Ok(());
    }
    Err(ServiceError::PermissionDenied(format!(
        "{} may not {} {kind}",
        principal.user_id, rule.action
    )))
}

/// Every permission string a lifecycle checks, without duplicates.
/// System-only rules are left out: nobody can be granted them.
pub fn permissions_of<L: Lifecycle>() -> Vec<&'static str> {
    let mut perms = vec![L::CREATE_PERMISSION, L::READ_PERMISSION, L::UPDATE_PERMISSION];
    for rule in L::RULES {
        if rule.permission != SYSTEM_PERMISSION && !perms.contains(&rule.permission) {
            perms.push(rule.permission);
        }
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::doc_state! {
        pub enum GateStatus {
            Closed = "CLOSED",
            Open = "OPEN",
            Locked = "LOCKED",
        }
        terminal = [Locked];
    }

    const RULES: &[Rule<GateStatus>] = &[
        Rule {
            action: "open",
            from: &[GateStatus::Closed],
            to: &[GateStatus::Open],
            permission: "gate:open",
        },
        Rule {
            action: "close",
            from: &[GateStatus::Open],
            to: &[GateStatus::Closed, GateStatus::Locked],
            permission: "gate:close",
        },
        Rule {
            action: "lock",
            from: &[GateStatus::Closed],
            to: &[GateStatus::Locked],
            permission: "gate:lock",
        },
    ];

    #[test]
    fn resolves_allowed_transition() {
        let rule = resolve(RULES, "gate", GateStatus::Closed, "open").unwrap();
        assert_eq!(rule.to, &[GateStatus::Open]);
        assert_eq!(rule.permission, "gate:open");
    }

    #[test]
    fn rejects_from_wrong_status() {
        let err = resolve(RULES, "gate", GateStatus::Open, "open").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        assert_eq!(err.to_string(), "cannot open gate in status OPEN");
    }

    #[test]
    fn rejects_unknown_action() {
        let err = resolve(RULES, "gate", GateStatus::Open, "paint").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn terminal_state_has_no_actions() {
        assert!(available_actions(RULES, GateStatus::Locked).is_empty());
        assert_eq!(available_actions(RULES, GateStatus::Closed), vec!["open", "lock"]);
    }

    #[test]
    fn permission_catalog() {
        use crate::engine::tests::Ticket;
        assert_eq!(
            permissions_of::<Ticket>(),
            vec![
                "test:ticket:create",
                "test:ticket:read",
                "test:ticket:update",
                "test:ticket:assign",
                "test:ticket:finish",
            ]
        );
    }

    #[test]
    fn system_rules_need_the_system_principal() {
        let expire = Rule {
            action: "expire",
            from: &[GateStatus::Open],
            to: &[GateStatus::Locked],
            permission: SYSTEM_PERMISSION,
        };
        let mut root = Principal::system("c1");
        root.user_id = "root".into();
        let admin = Principal {
            user_id: "ana".into(),
            company_id: "c1".into(),
            permissions: vec!["*".into()],
            root: false,
            view_mode: Default::default(),
        };

        assert!(may_run(&Principal::system("c1"), &expire));
        assert!(!may_run(&root, &expire));
        assert!(!may_run(&admin, &expire));
        let err = require_rule(&admin, "gate", &expire).unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
        assert!(may_run(&admin, &RULES[0]));
    }
}
