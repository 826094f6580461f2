use serde_json::Value;

use crate::rules::context::{pod_spec, workload_containers};
use crate::rules::{Rule, DEFAULT_KINDS};

pub const REQUESTS_CPU: Rule = Rule {
    id: "RequestsCPU",
    selector: "containers[] .resources .requests .cpu",
    reason: "Enforcing CPU requests aids a fair balancing of resources across the cluster",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: requests_cpu,
};

pub const LIMITS_CPU: Rule = Rule {
    id: "LimitsCPU",
    selector: "containers[] .resources .limits .cpu",
    reason: "Enforcing CPU limits prevents DOS via resource exhaustion",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: limits_cpu,
};

pub const REQUESTS_MEMORY: Rule = Rule {
    id: "RequestsMemory",
    selector: "containers[] .resources .requests .memory",
    reason: "Enforcing memory requests aids a fair balancing of resources across the cluster",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: requests_memory,
};

pub const LIMITS_MEMORY: Rule = Rule {
    id: "LimitsMemory",
    selector: "containers[] .resources .limits .memory",
    reason: "Enforcing memory limits prevents DOS via resource exhaustion",
    link: "",
    kinds: DEFAULT_KINDS,
    points: 1,
    advise: 0,
    predicate: limits_memory,
};

fn count_resource(document: &Value, path: &str) -> usize {
    workload_containers(pod_spec(document))
        .filter(|c| c.at(path).is_present())
        .count()
}

fn requests_cpu(document: &Value) -> usize {
    count_resource(document, "resources.requests.cpu")
}

fn limits_cpu(document: &Value) -> usize {
    count_resource(document, "resources.limits.cpu")
}

fn requests_memory(document: &Value) -> usize {
    count_resource(document, "resources.requests.memory")
}

fn limits_memory(document: &Value) -> usize {
    count_resource(document, "resources.limits.memory")
}
