//! Literal attributes embedded on source nodes
//!
//! Attribute accessors follow the same shape as the node-attribute helpers
//! in typical graph IRs: name lookup, typed getters with defaults, and a
//! hard-failing variant for attributes a converter cannot do without.

use crate::error::{ConvertError, ConvertResult};
use crate::value::Constant;

use super::SourceNode;

/// A named literal attribute on a source node
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Literal payload
    pub value: Constant,
}

impl Attribute {
    /// Create an attribute
    pub fn new(name: impl Into<String>, value: Constant) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl SourceNode {
    /// Get an attribute payload by name
    pub fn attr(&self, name: &str) -> Option<&Constant> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// Get a required attribute, failing with `MissingAttribute`
    pub fn required_attr(&self, name: &str) -> ConvertResult<&Constant> {
        self.attr(name)
            .ok_or_else(|| ConvertError::MissingAttribute {
                op: self.op.as_str().to_string(),
                name: name.to_string(),
            })
    }

    /// Get an integer attribute with a default
    pub fn attr_int(&self, name: &str, default: i64) -> i64 {
        self.attr(name).and_then(Constant::as_int).unwrap_or(default)
    }

    /// Get a required integer attribute
    pub fn required_attr_int(&self, name: &str) -> ConvertResult<i64> {
        self.required_attr(name)?
            .as_int()
            .ok_or_else(|| ConvertError::InvalidNode {
                op: self.op.as_str().to_string(),
                reason: format!("attribute '{name}' is not an integer"),
            })
    }

    /// Get a required string attribute
    pub fn required_attr_str(&self, name: &str) -> ConvertResult<&str> {
        self.required_attr(name)?
            .as_str()
            .ok_or_else(|| ConvertError::InvalidNode {
                op: self.op.as_str().to_string(),
                reason: format!("attribute '{name}' is not a string"),
            })
    }

    /// Check whether an attribute is present
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_attrs() -> SourceNode {
        let mut node = SourceNode::new("prim::GetAttr", &[], &[]);
        node.attrs.push(Attribute::new("name", Constant::Str("weight".into())));
        node.attrs.push(Attribute::new("chunks", Constant::Int(3)));
        node
    }

    #[test]
    fn test_attr_lookup() {
        let node = node_with_attrs();
        assert!(node.has_attr("name"));
        assert!(!node.has_attr("axis"));
        assert_eq!(node.attr_int("chunks", 0), 3);
        assert_eq!(node.attr_int("missing", 9), 9);
    }

    #[test]
    fn test_required_attr_missing() {
        let node = node_with_attrs();
        let err = node.required_attr("dim").unwrap_err();
        assert!(matches!(err, ConvertError::MissingAttribute { .. }));
        assert!(err.to_string().contains("dim"));
    }

    #[test]
    fn test_required_attr_wrong_type() {
        let node = node_with_attrs();
        assert!(node.required_attr_int("name").is_err());
        assert_eq!(node.required_attr_str("name").unwrap(), "weight");
    }
}
