//! Listing page size configuration.

use serde::Deserialize;

/// Page sizes for paginated listings.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Chat messages per page (default: 50).
    #[serde(default = "default_messages_per_page")]
    pub messages_per_page: i64,
    /// Communities per listing page (default: 12).
    #[serde(default = "default_communities_per_page")]
    pub communities_per_page: i64,
    /// Community members per page (default: 20).
    #[serde(default = "default_members_per_page")]
    pub members_per_page: i64,
    /// Members shown on a community detail page (default: 10).
    #[serde(default = "default_detail_members")]
    pub detail_members: i64,
    /// Campus updates per page (default: 10).
    #[serde(default = "default_campus_updates_per_page")]
    pub campus_updates_per_page: i64,
    /// Questions per home feed page (default: 5).
    #[serde(default = "default_questions_per_page")]
    pub questions_per_page: i64,
    /// Hot topics shown above the home feed (default: 3).
    #[serde(default = "default_hot_topics")]
    pub hot_topics: i64,
    /// Questions in the bountied, hot and per-tag listings (default: 50).
    #[serde(default = "default_home_questions")]
    pub home_questions: i64,
    /// Rows per profile activity tab page (default: 10).
    #[serde(default = "default_activity_per_page")]
    pub activity_per_page: i64,
    /// Suggested chat partners returned (default: 10).
    #[serde(default = "default_suggested_users")]
    pub suggested_users: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages_per_page: default_messages_per_page(),
            communities_per_page: default_communities_per_page(),
            members_per_page: default_members_per_page(),
            detail_members: default_detail_members(),
            campus_updates_per_page: default_campus_updates_per_page(),
            questions_per_page: default_questions_per_page(),
            hot_topics: default_hot_topics(),
            home_questions: default_home_questions(),
            activity_per_page: default_activity_per_page(),
            suggested_users: default_suggested_users(),
        }
    }
}

impl LimitsConfig {
    /// All page sizes with their config keys, for validation.
    pub fn named(&self) -> [(&'static str, i64); 10] {
        [
            ("messages_per_page", self.messages_per_page),
            ("communities_per_page", self.communities_per_page),
            ("members_per_page", self.members_per_page),
            ("detail_members", self.detail_members),
            ("campus_updates_per_page", self.campus_updates_per_page),
            ("questions_per_page", self.questions_per_page),
            ("hot_topics", self.hot_topics),
            ("home_questions", self.home_questions),
            ("activity_per_page", self.activity_per_page),
            ("suggested_users", self.suggested_users),
        ]
    }
}

fn default_messages_per_page() -> i64 {
    50
}

fn default_communities_per_page() -> i64 {
    12
}

fn default_members_per_page() -> i64 {
    20
}

fn default_detail_members() -> i64 {
    10
}

fn default_campus_updates_per_page() -> i64 {
    10
}

fn default_questions_per_page() -> i64 {
    5
}

fn default_hot_topics() -> i64 {
    3
}

fn default_home_questions() -> i64 {
    50
}

fn default_activity_per_page() -> i64 {
    10
}

fn default_suggested_users() -> i64 {
    10
}
