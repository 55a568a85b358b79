//! Unread badge classification
//!
//! A thread's badge is derived from the three unread sets on its parent
//! subscription. Mentions of the current user win over group mentions,
//! which win over a plain unread reply.

use serde::{Deserialize, Serialize};

use crate::types::ParentSubscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnreadBadge {
    None,
    MentionsMe,
    MentionsGroup,
    GeneralUnread,
}

impl UnreadBadge {
    /// Short label for plain-text rendering
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::MentionsMe => "@",
            Self::MentionsGroup => "@all",
            Self::GeneralUnread => "*",
        }
    }

    pub fn is_unread(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Badge for `item_id` given the latest subscription snapshot
pub fn classify(item_id: &str, subscription: Option<&ParentSubscription>) -> UnreadBadge {
    let Some(sub) = subscription else {
        return UnreadBadge::None;
    };

    if sub.unread_mentioning_me.contains(item_id) {
        UnreadBadge::MentionsMe
    } else if sub.unread_mentioning_group.contains(item_id) {
        UnreadBadge::MentionsGroup
    } else if sub.unread_all.contains(item_id) {
        UnreadBadge::GeneralUnread
    } else {
        UnreadBadge::None
    }
}
