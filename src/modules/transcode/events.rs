use serde::{Deserialize, Serialize};

/// Message published once per uploaded asset. `name` is the key of the input
/// object in the incoming bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
}

impl JobDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_a_bare_name() {
        let json = serde_json::to_string(&JobDescriptor::new("movie.mp4")).unwrap();
        assert_eq!(json, r#"{"name":"movie.mp4"}"#);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let job: JobDescriptor =
            serde_json::from_str(r#"{"name":"movie.mp4","bucket":"incoming"}"#).unwrap();
        assert_eq!(job.name, "movie.mp4");
    }
}
