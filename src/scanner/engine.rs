//! The polling engine: watches notifications, greets followers, and sounds
//! the horn on request.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::mastodon::client::{Error, MastodonClient};
use crate::mastodon::types::Notification;
use crate::scanner::horn;
use crate::scanner::store::ScannerState;
use crate::timefmt::humanize_secs;

/// Consecutive failed polls tolerated before giving up.
const MAX_CONSECUTIVE_FAILURES: u64 = 15;

const STATE_FILE: &str = "hornbot-state.json";

pub struct Scanner {
    client: MastodonClient,
    jitsi_link: String,
    poll_interval: Duration,
    horn_window: Duration,
    dry_run: bool,
    state_path: PathBuf,
    state: ScannerState,
}

/// Actionable notifications from one poll.
#[derive(Debug, Default, PartialEq)]
struct Sifted {
    /// `acct` names of new followers, oldest first.
    new_followers: Vec<String>,
    /// Horn requesters: `acct` name to the status ID to reply to. A later
    /// request from the same account wins.
    horn_requests: BTreeMap<String, String>,
    /// ID of the newest notification seen, matched or not.
    newest_id: Option<String>,
}

/// Walk one page of notifications oldest-first and pull out the actionable
/// ones. The page arrives newest-first from the API.
fn sift(notes: &[Notification]) -> Sifted {
    let mut sifted = Sifted::default();
    for note in notes.iter().rev() {
        info!("notification id={} type={}", note.id, note.kind);
        sifted.newest_id = Some(note.id.clone());
        match note.kind.as_str() {
            "follow" => {
                if let Some(account) = &note.account {
                    info!("new follower @{}", account.acct);
                    sifted.new_followers.push(account.acct.clone());
                }
            }
            "mention" => {
                if let (Some(account), Some(status)) = (&note.account, &note.status)
                    && horn::is_horn_request(&status.content)
                {
                    info!(
                        "status={}: got a request to sound the horn from @{}",
                        status.id, account.acct
                    );
                    sifted.horn_requests.insert(account.acct.clone(), status.id.clone());
                }
            }
            _ => {}
        }
    }
    sifted
}

impl Scanner {
    pub fn new(config: &Config) -> Self {
        let state_path = config.storage_dir.join(STATE_FILE);
        let state = ScannerState::load_or_default(&state_path);
        let client = MastodonClient::new(
            &config.mastodon_instance,
            &config.mastodon_token,
            state.api_reset_period,
        );

        Self {
            client,
            jitsi_link: config.jitsi_link.clone(),
            poll_interval: config.poll_interval,
            horn_window: config.horn_window,
            dry_run: config.dry_run,
            state_path,
            state,
        }
    }

    /// Poll until a run of consecutive failures exhausts the retry budget.
    ///
    /// The n-th consecutive failure sleeps n minutes before the next try,
    /// so the total wait before giving up is triangular.
    pub async fn run(&mut self) -> Result<(), Error> {
        let mut failures: u64 = 0;
        loop {
            match self.process_notifications().await {
                Ok(()) => {
                    failures = 0;
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    // minutes already spent sleeping on this failure run
                    let waited_mins = (failures * failures + failures) / 2;
                    failures += 1;
                    error!("{e}");
                    if failures > MAX_CONSECUTIVE_FAILURES {
                        error!(
                            "after {} ({} failed polls), I give up.",
                            humanize_secs(waited_mins * 60),
                            failures - 1
                        );
                        return Err(e);
                    }
                    warn!(
                        "sleeping {} after failed poll (will be {} total)",
                        humanize_secs(failures * 60),
                        humanize_secs((waited_mins + failures) * 60)
                    );
                    tokio::time::sleep(Duration::from_secs(60 * failures)).await;
                }
            }
        }
    }

    /// One poll: fetch notifications newer than the stored ID, greet new
    /// followers, and sound the horn when asked and allowed.
    async fn process_notifications(&mut self) -> Result<(), Error> {
        let notes = self.client.notifications(self.state.last_note_id.as_deref()).await?;
        let sifted = sift(&notes);

        if sifted.new_followers.is_empty() && sifted.horn_requests.is_empty() {
            self.commit_note_id(sifted.newest_id);
            return Ok(());
        }

        let since_horn = self.secs_since_horn();
        let in_window = since_horn < self.horn_window.as_secs();
        if in_window && !sifted.horn_requests.is_empty() {
            warn!(
                "refusing to toot again after only {} ({} sec)",
                humanize_secs(since_horn),
                since_horn
            );
        }

        // New followers get told the horn is (or is about to be) sounding.
        let horn_live = in_window || !sifted.horn_requests.is_empty();
        for follower in &sifted.new_followers {
            let greeting = horn::follower_greeting(follower, horn_live, &self.jitsi_link);
            if !self.post(&greeting, None).await? {
                warn!("rate limited; dropping greeting for @{follower}");
            }
        }

        if !sifted.horn_requests.is_empty() && !in_window {
            self.sound_horn(&sifted.horn_requests, &sifted.new_followers).await?;
        }

        if !notes.is_empty() {
            self.commit_note_id(sifted.newest_id);
        }
        Ok(())
    }

    /// Announce the meeting link to every follower, paced against the rate
    /// limit, then reply to each requester in-thread.
    async fn sound_horn(
        &mut self,
        requests: &BTreeMap<String, String>,
        skip_followers: &[String],
    ) -> Result<(), Error> {
        let account_id = self.client.account_id().await?;
        let mut followers = self.client.all_followers(&account_id).await?;
        // Requesters and this cycle's new followers get their own messages.
        followers.retain(|acct| !requests.contains_key(acct) && !skip_followers.contains(acct));

        let secs_to_reset = self.client.estimated_secs_to_reset();
        let poll_secs = self.poll_interval.as_secs().max(1);
        // Notification polling keeps spending calls while we announce, and
        // each requester costs one reply at the end.
        let calls_remaining = i64::from(self.client.rate_remaining())
            - (secs_to_reset / poll_secs) as i64
            - requests.len() as i64;
        info!(
            "{} calls left after polling overhead, {} sec until reset",
            calls_remaining, secs_to_reset
        );

        let plan = horn::plan_batches(
            followers.len(),
            calls_remaining,
            secs_to_reset,
            self.poll_interval,
        );
        if plan.wait_between.is_zero() {
            info!("📯 tooting to {} followers {} at a time", followers.len(), plan.per_post);
        } else {
            info!(
                "📯 tooting to {} followers {} at a time, waiting {} between posts",
                followers.len(),
                plan.per_post,
                humanize_secs(plan.wait_between.as_secs())
            );
        }

        for batch in followers.chunks(plan.per_post) {
            let toot = horn::announcement(batch, &self.jitsi_link);
            while !self.post(&toot, None).await? {
                // The estimate can run early; if it did we get another
                // refusal, so never wait less than one poll period.
                let reset = self.client.estimated_secs_to_reset().max(poll_secs);
                warn!(
                    "failed to toot while sounding the horn; waiting {} for the next reset",
                    humanize_secs(reset)
                );
                tokio::time::sleep(Duration::from_secs(reset)).await;
            }
            if !plan.wait_between.is_zero() {
                tokio::time::sleep(plan.wait_between).await;
            }
        }

        self.state.last_horn_time = unix_now();
        self.persist();

        for (acct, status_id) in requests {
            if !self.post(&horn::requester_reply(acct, &self.jitsi_link), Some(status_id.as_str())).await?
            {
                warn!("rate limited; dropping reply to @{acct}");
            }
        }
        Ok(())
    }

    /// Post a status unless dry-run is on.
    async fn post(&self, content: &str, in_reply_to: Option<&str>) -> Result<bool, Error> {
        if self.dry_run {
            info!("[DRY RUN] would post: {:?}", content);
            return Ok(true);
        }
        self.client.post_status(content, in_reply_to).await
    }

    fn secs_since_horn(&self) -> u64 {
        (unix_now() - self.state.last_horn_time).max(0) as u64
    }

    /// Record and persist a new high-water notification ID, if it moved.
    fn commit_note_id(&mut self, newest: Option<String>) {
        if newest.is_some() && newest != self.state.last_note_id {
            self.state.last_note_id = newest;
            self.persist();
        }
    }

    fn persist(&mut self) {
        self.state.api_reset_period = self.client.observed_reset_period();
        if let Err(e) = self.state.save(&self.state_path) {
            error!("{e}");
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
