use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Request header selecting the view mode.
pub const VIEW_MODE_HEADER: &str = "x-view-mode";

/// Document visibility mode.
///
/// `T1` (standard) callers only see T1 documents. `T2` (extended) callers
/// see both sets; documents created in T2 mode are stored as T2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    #[serde(rename = "T1")]
    Standard,
    #[serde(rename = "T2")]
    Extended,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "T1",
            Self::Extended => "T2",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ServiceError> {
        match s.trim() {
            "T1" | "t1" => Ok(Self::Standard),
            "T2" | "t2" => Ok(Self::Extended),
            other => Err(ServiceError::Validation(format!("unknown view mode '{other}'"))),
        }
    }

    /// Document modes visible from this mode.
    pub fn visible(&self) -> &'static [ViewMode] {
        match self {
            Self::Standard => &[ViewMode::Standard],
            Self::Extended => &[ViewMode::Standard, ViewMode::Extended],
        }
    }

    pub fn can_see(&self, doc_mode: ViewMode) -> bool {
        self.visible().contains(&doc_mode)
    }

    /// Build a `column IN (?n, ...)` filter starting at parameter index `first`.
    ///
    /// Returns the clause and the text values to bind, in order.
    pub fn sql_filter(&self, column: &str, first: usize) -> (String, Vec<String>) {
        let modes = self.visible();
        let placeholders: Vec<String> = (0..modes.len())
            .map(|i| format!("?{}", first + i))
            .collect();
        let clause = format!("{column} IN ({})", placeholders.join(", "));
        let values = modes.iter().map(|m| m.as_str().to_string()).collect();
        (clause, values)
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility() {
        assert!(ViewMode::Standard.can_see(ViewMode::Standard));
        assert!(!ViewMode::Standard.can_see(ViewMode::Extended));
        assert!(ViewMode::Extended.can_see(ViewMode::Standard));
        assert!(ViewMode::Extended.can_see(ViewMode::Extended));
    }

    #[test]
    fn parse_and_serde() {
        assert_eq!(ViewMode::parse("T2").unwrap(), ViewMode::Extended);
        assert!(ViewMode::parse("T3").is_err());
        assert_eq!(serde_json::to_string(&ViewMode::Standard).unwrap(), "\"T1\"");
        let back: ViewMode = serde_json::from_str("\"T2\"").unwrap();
        assert_eq!(back, ViewMode::Extended);
    }

    #[test]
    fn sql_filter_placeholders() {
        let (clause, values) = ViewMode::Extended.sql_filter("view_mode", 3);
        assert_eq!(clause, "view_mode IN (?3, ?4)");
        assert_eq!(values, vec!["T1".to_string(), "T2".to_string()]);

        let (clause, values) = ViewMode::Standard.sql_filter("d.view_mode", 1);
        assert_eq!(clause, "d.view_mode IN (?1)");
        assert_eq!(values, vec!["T1".to_string()]);
    }
}
