use serde::Serialize;

use crate::error::Result;

pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Report;

    #[test]
    fn uses_wire_field_names() {
        let reports = vec![Report {
            object: "Pod/a.default".into(),
            file_name: "a.yaml".into(),
            score: 3,
            ..Report::default()
        }];
        let out = render(&reports).unwrap();
        assert!(out.contains("fileName: a.yaml"));
        assert!(out.contains("score: 3"));
        assert!(!out.contains("message"));
    }
}
