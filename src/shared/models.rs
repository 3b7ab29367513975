use serde::{Deserialize, Serialize};

/// User-visible notification payload. Every success and every error the
/// server reports to the admin UI goes through this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub variant: NoticeVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
            variant: NoticeVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
            variant: NoticeVariant::Destructive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_serialization() {
        let notice = Notice::destructive("Cannot remove", "At least one is required");
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"destructive\""));
        assert!(json.contains("Cannot remove"));
    }

    #[test]
    fn test_notice_without_description() {
        let notice = Notice {
            title: "Saved".to_string(),
            description: None,
            variant: NoticeVariant::Default,
        };
        let json = serde_json::to_string(&notice).unwrap();
        assert!(!json.contains("description"));
    }
}
