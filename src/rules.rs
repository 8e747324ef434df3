//! Rule matching: condition evaluation, first-match selection, and the
//! previously-notified baseline derived from the bot's own reactions.
//!
//! Everything here is pure. The only side effect is debug logging of each
//! condition's outcome.
//!
//! # Example
//!
//! ```
//! use discord2pushover::config::{Rule, RuleActions, RuleConditions};
//! use discord2pushover::message::MessageSnapshot;
//! use discord2pushover::rules::select;
//!
//! let rules = vec![Rule::new(
//!     "ops",
//!     RuleConditions { channel_id: Some("C1".into()), ..Default::default() },
//!     RuleActions::default(),
//! )];
//! let msg = MessageSnapshot { channel_id: "C1".into(), ..Default::default() };
//!
//! let (rule, index) = select(&msg, &rules, Some("bot")).unwrap();
//! assert_eq!((rule.name.as_str(), index), ("ops", 0));
//! ```

use tracing::debug;

use crate::config::{Rule, RuleConditions};
use crate::message::MessageSnapshot;
use crate::priority::PriorityOrder;

/// Test every active condition of `conditions` against `message` (AND).
///
/// `bot_id` is the bot's own user id; when it is unknown, conditions that
/// depend on it fail closed.
pub fn evaluate(
    message: &MessageSnapshot,
    conditions: &RuleConditions,
    bot_id: Option<&str>,
    rule_name: &str,
) -> bool {
    if let Some(channel_id) = conditions.channel_id.as_deref().filter(|c| !c.is_empty()) {
        if message.channel_id != channel_id {
            debug!(
                rule_name = %rule_name,
                message_id = %message.id,
                message_channel = %message.channel_id,
                rule_channel = %channel_id,
                "Condition failed (channelId)"
            );
            return false;
        }
        debug!(rule_name = %rule_name, message_id = %message.id, "Condition passed (channelId)");
    }

    if !conditions.message_has_emoji.is_empty()
        && !has_qualifying_reaction(message, conditions, rule_name)
    {
        debug!(
            rule_name = %rule_name,
            message_id = %message.id,
            required = ?conditions.message_has_emoji,
            "Condition failed (messageHasEmoji): none of the required emojis were found"
        );
        return false;
    }

    if !conditions.content_includes.is_empty() {
        let content = message.content.to_lowercase();
        if let Some(missing) = conditions
            .content_includes
            .iter()
            .find(|keyword| !content.contains(&keyword.to_lowercase()))
        {
            debug!(
                rule_name = %rule_name,
                message_id = %message.id,
                keyword = %missing,
                "Condition failed (contentIncludes): keyword not found"
            );
            return false;
        }
        debug!(rule_name = %rule_name, message_id = %message.id, "Condition passed (contentIncludes)");
    }

    if conditions.react_to_at_mention {
        let Some(bot_id) = bot_id else {
            debug!(
                rule_name = %rule_name,
                message_id = %message.id,
                "Condition failed (reactToAtMention): bot identity unknown"
            );
            return false;
        };
        if !message.mentions.iter().any(|id| id == bot_id) {
            debug!(
                rule_name = %rule_name,
                message_id = %message.id,
                bot_id = %bot_id,
                "Condition failed (reactToAtMention): bot was not mentioned"
            );
            return false;
        }
        debug!(rule_name = %rule_name, message_id = %message.id, "Condition passed (reactToAtMention)");
    }

    if !conditions.specific_mentions.is_empty() {
        let found = conditions.specific_mentions.iter().find(|wanted| {
            message.mentions.iter().any(|id| id == *wanted)
                || message.mention_roles.iter().any(|id| id == *wanted)
        });
        match found {
            Some(id) => debug!(
                rule_name = %rule_name,
                message_id = %message.id,
                mention = %id,
                "Condition passed (specificMentions)"
            ),
            None => {
                debug!(
                    rule_name = %rule_name,
                    message_id = %message.id,
                    required = ?conditions.specific_mentions,
                    "Condition failed (specificMentions): none of the users/roles were mentioned"
                );
                return false;
            }
        }
    }

    debug!(rule_name = %rule_name, message_id = %message.id, "All active conditions passed");
    true
}

/// ANY-of search over (reactions × required emoji names).
///
/// With `reactToAtMention` set, a reaction added by the bot is only evidence
/// of an earlier notification and does not count as a trigger.
fn has_qualifying_reaction(
    message: &MessageSnapshot,
    conditions: &RuleConditions,
    rule_name: &str,
) -> bool {
    let ignore_own = conditions.react_to_at_mention;

    for reaction in &message.reactions {
        if !conditions.message_has_emoji.contains(&reaction.emoji) {
            continue;
        }
        if ignore_own && reaction.me {
            debug!(
                rule_name = %rule_name,
                message_id = %message.id,
                emoji = %reaction.emoji,
                "Candidate reaction added by bot, ignored (reactToAtMention)"
            );
            continue;
        }
        debug!(
            rule_name = %rule_name,
            message_id = %message.id,
            emoji = %reaction.emoji,
            "Condition passed (messageHasEmoji)"
        );
        return true;
    }

    false
}

/// Return the first rule whose conditions match, with its index.
pub fn select<'a>(
    message: &MessageSnapshot,
    rules: &'a [Rule],
    bot_id: Option<&str>,
) -> Option<(&'a Rule, usize)> {
    select_with(message, rules, |msg, rule| {
        evaluate(msg, &rule.conditions, bot_id, &rule.name)
    })
}

/// [`select`] with a caller-provided evaluator.
///
/// Rules are evaluated in order and evaluation stops at the first match.
pub fn select_with<'a, F>(
    message: &MessageSnapshot,
    rules: &'a [Rule],
    mut evaluator: F,
) -> Option<(&'a Rule, usize)>
where
    F: FnMut(&MessageSnapshot, &Rule) -> bool,
{
    for (index, rule) in rules.iter().enumerate() {
        debug!(
            rule_index = index + 1,
            rule_name = %rule.name,
            message_id = %message.id,
            "Evaluating rule"
        );
        if evaluator(message, rule) {
            debug!(rule_name = %rule.name, message_id = %message.id, "Rule matched");
            return Some((rule, index));
        }
    }

    debug!(
        message_id = %message.id,
        rule_count = rules.len(),
        "No rules matched"
    );
    None
}

/// Most urgent priority already signalled by the bot's own reactions.
///
/// A bot reaction counts when its emoji is the `reactionEmoji` of some rule;
/// that rule's priority is then assumed to have been notified. `None` means
/// no such reaction exists.
pub fn previously_notified(
    message: &MessageSnapshot,
    rules: &[Rule],
    order: PriorityOrder,
) -> Option<i32> {
    message
        .own_reactions()
        .flat_map(|reaction| {
            rules.iter().filter(move |rule| {
                rule.actions.reaction_emoji.as_deref() == Some(reaction.emoji.as_str())
            })
        })
        .map(|rule| rule.actions.priority)
        .reduce(|a, b| order.most_urgent(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleActions;
    use crate::message::ReactionSnapshot;

    const BOT: &str = "bot-1";

    fn message() -> MessageSnapshot {
        MessageSnapshot {
            id: "m1".to_string(),
            channel_id: "C1".to_string(),
            guild_id: Some("G1".to_string()),
            author_id: "u1".to_string(),
            content: "Prod OUTAGE in eu-west".to_string(),
            mentions: vec![BOT.to_string(), "u2".to_string()],
            mention_roles: vec!["r-oncall".to_string()],
            reactions: vec![],
        }
    }

    fn with_reactions(reactions: &[(&str, bool)]) -> MessageSnapshot {
        MessageSnapshot {
            reactions: reactions
                .iter()
                .map(|(e, me)| ReactionSnapshot::new(*e, *me))
                .collect(),
            ..message()
        }
    }

    fn emoji(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn rule(name: &str, conditions: RuleConditions, priority: i32, reaction: Option<&str>) -> Rule {
        Rule::new(
            name,
            conditions,
            RuleActions {
                pushover_destination: "ukey".to_string(),
                priority,
                reaction_emoji: reaction.map(String::from),
                emergency: None,
            },
        )
    }

    // ===================================================================
    // Condition evaluator
    // ===================================================================

    #[test]
    fn empty_conditions_always_match() {
        let conditions = RuleConditions::default();
        assert!(evaluate(&message(), &conditions, Some(BOT), "r"));
        assert!(evaluate(&MessageSnapshot::default(), &conditions, None, "r"));
    }

    #[test]
    fn channel_must_match_exactly() {
        let mut conditions = RuleConditions {
            channel_id: Some("C1".to_string()),
            ..Default::default()
        };
        assert!(evaluate(&message(), &conditions, Some(BOT), "r"));

        conditions.channel_id = Some("C2".to_string());
        assert!(!evaluate(&message(), &conditions, Some(BOT), "r"));
    }

    #[test]
    fn message_has_emoji_is_any_of() {
        let conditions = RuleConditions {
            message_has_emoji: emoji(&["🅰️", "🅱️"]),
            ..Default::default()
        };

        assert!(evaluate(&with_reactions(&[("🅰️", false)]), &conditions, Some(BOT), "r"));
        assert!(evaluate(&with_reactions(&[("🅱️", false)]), &conditions, Some(BOT), "r"));
        assert!(evaluate(
            &with_reactions(&[("🇨", false), ("🅱️", false)]),
            &conditions,
            Some(BOT),
            "r"
        ));
        assert!(!evaluate(&with_reactions(&[("🇨", false)]), &conditions, Some(BOT), "r"));
        assert!(!evaluate(&with_reactions(&[]), &conditions, Some(BOT), "r"));
    }

    #[test]
    fn bot_reaction_ignored_when_react_to_at_mention_is_set() {
        let conditions = RuleConditions {
            message_has_emoji: emoji(&["🔥"]),
            react_to_at_mention: true,
            ..Default::default()
        };
        assert!(!evaluate(&with_reactions(&[("🔥", true)]), &conditions, Some(BOT), "r"));
    }

    #[test]
    fn user_reaction_still_qualifies_next_to_ignored_bot_reaction() {
        let conditions = RuleConditions {
            message_has_emoji: emoji(&["🅰️", "🅱️"]),
            react_to_at_mention: true,
            ..Default::default()
        };
        let msg = with_reactions(&[("🅰️", true), ("🅱️", false)]);
        assert!(evaluate(&msg, &conditions, Some(BOT), "r"));
    }

    #[test]
    fn bot_reaction_counts_without_react_to_at_mention() {
        let conditions = RuleConditions {
            message_has_emoji: emoji(&["🅰️"]),
            ..Default::default()
        };
        assert!(evaluate(&with_reactions(&[("🅰️", true)]), &conditions, Some(BOT), "r"));
    }

    #[test]
    fn content_includes_is_all_of_and_case_insensitive() {
        let mut conditions = RuleConditions {
            content_includes: emoji(&["outage", "PROD"]),
            ..Default::default()
        };
        assert!(evaluate(&message(), &conditions, Some(BOT), "r"));

        conditions.content_includes.push("database".to_string());
        assert!(!evaluate(&message(), &conditions, Some(BOT), "r"));
    }

    #[test]
    fn react_to_at_mention_requires_bot_mention() {
        let conditions = RuleConditions {
            react_to_at_mention: true,
            ..Default::default()
        };
        assert!(evaluate(&message(), &conditions, Some(BOT), "r"));

        let mut msg = message();
        msg.mentions = vec!["u2".to_string()];
        assert!(!evaluate(&msg, &conditions, Some(BOT), "r"));
    }

    #[test]
    fn react_to_at_mention_fails_closed_without_identity() {
        let conditions = RuleConditions {
            react_to_at_mention: true,
            ..Default::default()
        };
        assert!(!evaluate(&message(), &conditions, None, "r"));
    }

    #[test]
    fn specific_mentions_match_users_or_roles() {
        let mut conditions = RuleConditions {
            specific_mentions: emoji(&["nobody", "u2"]),
            ..Default::default()
        };
        assert!(evaluate(&message(), &conditions, Some(BOT), "r"));

        conditions.specific_mentions = emoji(&["r-oncall"]);
        assert!(evaluate(&message(), &conditions, Some(BOT), "r"));

        conditions.specific_mentions = emoji(&["r-other", "u9"]);
        assert!(!evaluate(&message(), &conditions, Some(BOT), "r"));
    }

    #[test]
    fn all_active_conditions_are_combined_with_and() {
        let conditions = RuleConditions {
            channel_id: Some("C1".to_string()),
            message_has_emoji: emoji(&["🔥"]),
            react_to_at_mention: true,
            specific_mentions: emoji(&["r-oncall"]),
            content_includes: emoji(&["outage"]),
        };
        assert!(evaluate(&with_reactions(&[("🔥", false)]), &conditions, Some(BOT), "r"));
        // Drop one ingredient at a time.
        assert!(!evaluate(&with_reactions(&[]), &conditions, Some(BOT), "r"));
        let mut wrong_channel = with_reactions(&[("🔥", false)]);
        wrong_channel.channel_id = "C9".to_string();
        assert!(!evaluate(&wrong_channel, &conditions, Some(BOT), "r"));
        let mut no_role = with_reactions(&[("🔥", false)]);
        no_role.mention_roles.clear();
        assert!(!evaluate(&no_role, &conditions, Some(BOT), "r"));
    }

    // ===================================================================
    // Rule selector
    // ===================================================================

    #[test]
    fn first_matching_rule_wins_and_later_rules_are_not_evaluated() {
        let rules = vec![
            rule(
                "other-channel",
                RuleConditions {
                    channel_id: Some("C9".to_string()),
                    ..Default::default()
                },
                0,
                None,
            ),
            rule("first-match", RuleConditions::default(), 0, None),
            rule("second-match", RuleConditions::default(), 1, None),
            rule("third-match", RuleConditions::default(), 2, None),
        ];

        let mut evaluated = Vec::new();
        let selected = select_with(&message(), &rules, |msg, rule| {
            evaluated.push(rule.name.clone());
            evaluate(msg, &rule.conditions, Some(BOT), &rule.name)
        });

        let (rule, index) = selected.unwrap();
        assert_eq!(rule.name, "first-match");
        assert_eq!(index, 1);
        assert_eq!(evaluated, vec!["other-channel", "first-match"]);
    }

    #[test]
    fn select_returns_none_when_exhausted() {
        let rules = vec![rule(
            "elsewhere",
            RuleConditions {
                channel_id: Some("C9".to_string()),
                ..Default::default()
            },
            0,
            None,
        )];
        assert!(select(&message(), &rules, Some(BOT)).is_none());
        assert!(select(&message(), &[], Some(BOT)).is_none());
    }

    #[test]
    fn select_is_deterministic() {
        let rules = vec![
            rule("a", RuleConditions::default(), 0, None),
            rule("b", RuleConditions::default(), 0, None),
        ];
        for _ in 0..10 {
            assert_eq!(select(&message(), &rules, Some(BOT)).unwrap().1, 0);
        }
    }

    // ===================================================================
    // Previously-notified baseline
    // ===================================================================

    #[test]
    fn no_bot_reactions_means_no_baseline() {
        let rules = vec![rule("r", RuleConditions::default(), 0, Some("👍"))];
        let msg = with_reactions(&[("👍", false)]);
        assert_eq!(
            previously_notified(&msg, &rules, PriorityOrder::LowerIsMoreUrgent),
            None
        );
    }

    #[test]
    fn bot_reaction_matching_rule_sets_baseline() {
        let rules = vec![rule("r", RuleConditions::default(), 1, Some("✅"))];
        let msg = with_reactions(&[("✅", true)]);
        assert_eq!(
            previously_notified(&msg, &rules, PriorityOrder::LowerIsMoreUrgent),
            Some(1)
        );
    }

    #[test]
    fn bot_reaction_without_matching_rule_is_ignored() {
        let rules = vec![rule("r", RuleConditions::default(), 1, Some("✅"))];
        let msg = with_reactions(&[("👀", true)]);
        assert_eq!(
            previously_notified(&msg, &rules, PriorityOrder::LowerIsMoreUrgent),
            None
        );
    }

    #[test]
    fn baseline_picks_most_urgent_under_either_order() {
        let rules = vec![
            rule("low", RuleConditions::default(), -1, Some("🔵")),
            rule("high", RuleConditions::default(), 1, Some("🔴")),
            rule("unused", RuleConditions::default(), 2, Some("🟣")),
        ];
        let msg = with_reactions(&[("🔵", true), ("🔴", true), ("🟣", false)]);

        assert_eq!(
            previously_notified(&msg, &rules, PriorityOrder::LowerIsMoreUrgent),
            Some(-1)
        );
        assert_eq!(
            previously_notified(&msg, &rules, PriorityOrder::HigherIsMoreUrgent),
            Some(1)
        );
    }
}
