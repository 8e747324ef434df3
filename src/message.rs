//! Point-in-time view of a chat message, independent of the Discord wire model.

/// A reaction currently present on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSnapshot {
    /// Emoji identifier: the unicode character, or the name of a custom emoji.
    pub emoji: String,
    /// True if the bot itself is one of the reactors.
    pub me: bool,
}

impl ReactionSnapshot {
    pub fn new(emoji: impl Into<String>, me: bool) -> Self {
        Self {
            emoji: emoji.into(),
            me,
        }
    }
}

/// A full read of a chat message, as used by rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: String,
    pub channel_id: String,
    /// Guild (server) id; `None` for direct messages.
    pub guild_id: Option<String>,
    pub author_id: String,
    pub content: String,
    /// Ids of mentioned users.
    pub mentions: Vec<String>,
    /// Ids of mentioned roles.
    pub mention_roles: Vec<String>,
    pub reactions: Vec<ReactionSnapshot>,
}

impl MessageSnapshot {
    /// Web link back to the message.
    pub fn link(&self) -> String {
        match self.guild_id.as_deref().filter(|g| !g.is_empty()) {
            Some(guild) => format!(
                "https://discord.com/channels/{}/{}/{}",
                guild, self.channel_id, self.id
            ),
            None => format!(
                "https://discord.com/channels/@me/{}/{}",
                self.channel_id, self.id
            ),
        }
    }

    /// Reactions the bot itself added.
    pub fn own_reactions(&self) -> impl Iterator<Item = &ReactionSnapshot> {
        self.reactions.iter().filter(|r| r.me)
    }
}
