//! Test case model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::DEFAULT_TEST_CASE_POINTS;

/// A single input/expected-output pair of a problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub problem_id: Uuid,
    #[serde(default)]
    pub name: String,
    /// Arguments for the entry point; an array is spread positionally
    pub input: Value,
    pub expected_output: Value,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default = "default_points")]
    pub points: u32,
    pub order: i32,
}

fn default_points() -> u32 {
    DEFAULT_TEST_CASE_POINTS
}

impl TestCase {
    /// Display name, falling back to the order
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Test {}", self.order)
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_deserializing() {
        let value = json!({"input": [1], "expected_output": 1, "order": 1});
        let tc: TestCase = serde_json::from_value(value).unwrap();
        assert_eq!(tc.points, DEFAULT_TEST_CASE_POINTS);
        assert!(!tc.is_hidden);
        assert_eq!(tc.display_name(), "Test 1");
    }

    #[test]
    fn test_named_case_keeps_its_name() {
        let tc: TestCase = serde_json::from_value(
            json!({"name": "Sample", "input": 2, "expected_output": 4, "order": 7}),
        )
        .unwrap();
        assert_eq!(tc.display_name(), "Sample");
    }
}
