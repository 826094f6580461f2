//! in-toto link metadata for a scan: the scanned manifest is the material,
//! each report is a product.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::rules::Report;

pub const STEP_NAME: &str = "kubesec";

/// Digest set for one artifact, keyed by algorithm.
pub type Hashes = BTreeMap<String, String>;

/// Unsigned in-toto link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "_type")]
    pub kind: String,
    pub name: String,
    pub materials: BTreeMap<String, Hashes>,
    pub products: BTreeMap<String, Hashes>,
    pub byproducts: BTreeMap<String, serde_json::Value>,
    pub command: Vec<String>,
    pub environment: BTreeMap<String, serde_json::Value>,
}

fn sha256(bytes: &[u8]) -> Hashes {
    let digest = hex::encode(Sha256::digest(bytes));
    BTreeMap::from([("sha256".to_string(), digest)])
}

/// Build the link for `reports` produced from `original` (named `source`).
///
/// The material digest covers the input with a trailing newline; each
/// product digest covers the report's compact JSON form.
pub fn generate_link(source: &str, reports: &[Report], original: &[u8]) -> Result<Link> {
    let mut material = original.to_vec();
    if !material.ends_with(b"\n") {
        material.push(b'\n');
    }

    let mut products = BTreeMap::new();
    for report in reports {
        let serialized = serde_json::to_vec(report)?;
        products.insert(report.object.clone(), sha256(&serialized));
    }

    Ok(Link {
        kind: "link".to_string(),
        name: STEP_NAME.to_string(),
        materials: BTreeMap::from([(source.to_string(), sha256(&material))]),
        products,
        byproducts: BTreeMap::new(),
        command: Vec::new(),
        environment: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(object: &str) -> Report {
        Report {
            object: object.into(),
            valid: true,
            file_name: "pod.yaml".into(),
            ..Report::default()
        }
    }

    #[test]
    fn material_digest_includes_trailing_newline() {
        let with = generate_link("pod.yaml", &[], b"kind: Pod\n").unwrap();
        let without = generate_link("pod.yaml", &[], b"kind: Pod").unwrap();
        assert_eq!(with.materials, without.materials);

        let expected = hex::encode(Sha256::digest(b"kind: Pod\n"));
        assert_eq!(with.materials["pod.yaml"]["sha256"], expected);
    }

    #[test]
    fn one_product_per_report() {
        let reports = vec![report("Pod/a.default"), report("Pod/b.default")];
        let link = generate_link("pod.yaml", &reports, b"").unwrap();
        assert_eq!(link.products.len(), 2);

        let expected = hex::encode(Sha256::digest(serde_json::to_vec(&reports[0]).unwrap()));
        assert_eq!(link.products["Pod/a.default"]["sha256"], expected);
    }

    #[test]
    fn serializes_as_link_metadata() {
        let link = generate_link("STDIN", &[report("Pod/a.default")], b"x").unwrap();
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["_type"], "link");
        assert_eq!(json["name"], "kubesec");
        assert_eq!(json["command"], serde_json::json!([]));
        assert!(json["materials"]["STDIN"]["sha256"].is_string());
    }
}
