mod host;
mod identity;
mod privileges;
mod profiles;
mod resources;
mod volumes;

use super::Rule;

/// Returns the built-in rule catalogue in evaluation order.
pub fn all_rules() -> Vec<Rule> {
    vec![
        host::HOST_NETWORK,
        host::HOST_PID,
        host::HOST_IPC,
        privileges::PRIVILEGED,
        privileges::CAP_SYS_ADMIN,
        volumes::DOCKER_SOCK,
        host::HOST_ALIASES,
        privileges::ALLOW_PRIVILEGE_ESCALATION,
        profiles::SECCOMP_UNCONFINED,
        privileges::READ_ONLY_ROOT_FILESYSTEM,
        identity::RUN_AS_NON_ROOT,
        identity::RUN_AS_USER,
        identity::RUN_AS_GROUP,
        privileges::CAP_DROP_ANY,
        privileges::CAP_DROP_ALL,
        resources::REQUESTS_CPU,
        resources::LIMITS_CPU,
        resources::REQUESTS_MEMORY,
        resources::LIMITS_MEMORY,
        identity::SERVICE_ACCOUNT_NAME,
        profiles::SECCOMP_ANY,
        profiles::APPARMOR_ANY,
        volumes::VOLUME_CLAIM_ACCESS_MODE_READ_WRITE_ONCE,
        volumes::VOLUME_CLAIM_REQUESTS_STORAGE,
        identity::AUTOMOUNT_SERVICE_ACCOUNT_TOKEN,
        host::HOST_USERS,
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use serde_json::Value;

    use super::*;

    pub(crate) fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn rule_ids_are_unique() {
        let rules = all_rules();
        let ids: HashSet<_> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn every_rule_targets_at_least_one_kind() {
        assert!(all_rules().iter().all(|r| !r.kinds.is_empty()));
    }

    #[test]
    fn advise_weights_only_on_hardening_rules() {
        for rule in all_rules().iter().filter(|r| r.advise != 0) {
            assert!(rule.points > 0, "{} carries advise weight", rule.id);
        }
    }

    #[test]
    fn predicates_are_total_over_odd_documents() {
        let odd = [
            parse("kind: Pod"),
            parse("kind: Pod\nspec: 7"),
            parse("kind: Deployment\nspec:\n  template: []"),
            parse("kind: StatefulSet\nspec:\n  volumeClaimTemplates: {}\n  template:\n    spec:\n      containers: [1, \"x\", null]"),
            parse("kind: DaemonSet\nmetadata:\n  annotations: [1]\nspec:\n  template:\n    metadata:\n      annotations: 3\n    spec:\n      containers:\n        - securityContext: 9"),
        ];
        for doc in &odd {
            for rule in all_rules() {
                let count = (rule.predicate)(doc);
                // vacuous passes are the only non-zero counts possible here
                assert!(count <= 1, "{} counted {count}", rule.id);
            }
        }
    }
}
