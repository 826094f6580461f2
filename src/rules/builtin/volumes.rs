use serde_json::Value;

use crate::manifest::Node;
use crate::rules::context::pod_spec;
use crate::rules::{Rule, DEFAULT_KINDS};

const DOCKER_SOCKET: &str = "/var/run/docker.sock";
const STATEFUL_SET: &[&str] = &["StatefulSet"];

pub const DOCKER_SOCK: Rule = Rule {
    id: "DockerSock",
    selector: "volumes[] .hostPath .path == /var/run/docker.sock",
    reason: "Mounting the docker.socket leaks information about other containers and can allow container breakout",
    link: "",
    kinds: DEFAULT_KINDS,
    points: -9,
    advise: 0,
    predicate: docker_sock,
};

pub const VOLUME_CLAIM_ACCESS_MODE_READ_WRITE_ONCE: Rule = Rule {
    id: "VolumeClaimAccessModeReadWriteOnce",
    selector: ".spec .volumeClaimTemplates[] .spec .accessModes | index(\"ReadWriteOnce\")",
    reason: "Setting the access mode of ReadWriteOnce on volumeClaimTemplates (if any exist) allows only one node to mount the persistentVolume",
    link: "",
    kinds: STATEFUL_SET,
    points: 1,
    advise: 0,
    predicate: volume_claim_access_mode_read_write_once,
};

pub const VOLUME_CLAIM_REQUESTS_STORAGE: Rule = Rule {
    id: "VolumeClaimRequestsStorage",
    selector: ".spec .volumeClaimTemplates[] .spec .resources .requests .storage",
    reason: "Setting a storage request on volumeClaimTemplates (if any exist) allows for the StatefulSet's PVCs to be bound to appropriately sized PVs",
    link: "",
    kinds: STATEFUL_SET,
    points: 1,
    advise: 0,
    predicate: volume_claim_requests_storage,
};

fn docker_sock(document: &Value) -> usize {
    pod_spec(document)
        .at("volumes")
        .count_where(|v| v.at("hostPath.path").as_str() == Some(DOCKER_SOCKET))
}

fn claim_templates(document: &Value) -> Node<'_> {
    Node::new(document).at("spec.volumeClaimTemplates")
}

// A StatefulSet without claim templates passes vacuously.
fn volume_claim_access_mode_read_write_once(document: &Value) -> usize {
    let templates = claim_templates(document);
    let all_rwo = templates
        .items()
        .all(|t| t.at("spec.accessModes").contains_str("ReadWriteOnce"));
    usize::from(all_rwo)
}

fn volume_claim_requests_storage(document: &Value) -> usize {
    let templates = claim_templates(document);
    if templates.count() == 0 {
        return 1;
    }
    templates.count_where(|t| t.at("spec.resources.requests.storage").is_present())
}
