//! Horn request recognition, announcement batching, and message texts.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Most followers mentioned in a single announcement status.
const MAX_MENTIONS_PER_POST: usize = 10;

/// Remaining-call floor below which the budget counts as starved.
const STARVED_BUDGET: i64 = 5;

static HORN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:toot|sound|blow)(?:\s+on)?\s+(?:teh|the|that|your?)\s+horn\b")
        .expect("horn pattern is valid")
});

/// Whether a mention's content asks for the horn. The content arrives as
/// HTML; the phrase is inline text, so the raw body is searched.
pub fn is_horn_request(content: &str) -> bool {
    HORN_PATTERN.is_match(content)
}

/// How to pace an announcement run against the rate limit.
#[derive(Debug, PartialEq)]
pub struct BatchPlan {
    /// Followers mentioned per status.
    pub per_post: usize,
    /// Pause between statuses.
    pub wait_between: Duration,
}

/// Pick a batch size and inter-post delay for announcing to `followers`
/// accounts with `calls_remaining` API calls left in a window that resets
/// in roughly `secs_to_reset`.
///
/// Batches grow from 2 up to 10 mentions until the post count fits the
/// call budget. A starved budget posts maximal batches with a long delay;
/// a plan that still exceeds the budget is spread across the reset window.
pub fn plan_batches(
    followers: usize,
    calls_remaining: i64,
    secs_to_reset: u64,
    poll_interval: Duration,
) -> BatchPlan {
    if followers == 0 {
        return BatchPlan { per_post: MAX_MENTIONS_PER_POST, wait_between: Duration::ZERO };
    }
    if calls_remaining < STARVED_BUDGET {
        return BatchPlan { per_post: MAX_MENTIONS_PER_POST, wait_between: poll_interval * 2 };
    }

    let mut per_post = 2;
    let mut posts_needed = followers.div_ceil(per_post);
    while posts_needed as i64 > calls_remaining && per_post < MAX_MENTIONS_PER_POST {
        per_post += 1;
        posts_needed = followers.div_ceil(per_post);
    }

    let wait_between = if posts_needed as i64 > calls_remaining {
        Duration::from_secs(secs_to_reset / posts_needed as u64 + 1)
    } else {
        Duration::ZERO
    };

    BatchPlan { per_post, wait_between }
}

/// The announcement status for one batch of followers.
pub fn announcement(batch: &[String], link: &str) -> String {
    let mentions: Vec<String> = batch.iter().map(|acct| format!("@{acct}")).collect();
    format!(
        "{}\nHear ye, hear ye, Jitsi is in session: {}",
        mentions.join(" "),
        link
    )
}

/// Greeting for a new follower. `horn_live` is true when the horn sounded
/// recently or is about to sound this cycle.
pub fn follower_greeting(acct: &str, horn_live: bool, link: &str) -> String {
    if horn_live {
        format!(
            "Hello @{acct}, Jitsi may be going right now:\n{link}\nAnd I'll let you know the next time someone tells me to toot the horn!"
        )
    } else {
        format!("Hello @{acct}, I'll let you know when someone tells me to toot the horn!")
    }
}

/// In-thread reply to the account that requested the horn.
pub fn requester_reply(acct: &str, link: &str) -> String {
    format!("@{acct} Job's done! Toot toot!\n{link}")
}
