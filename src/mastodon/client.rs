//! Mastodon REST client, account-scoped via a bearer token.

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::sync::{LazyLock, Mutex};
use tracing::{debug, error, info, warn};

use crate::mastodon::rate::RateTracker;
use crate::mastodon::types::{Account, CredentialAccount, Notification};

/// Application name, used to namespace idempotency keys.
const APPLICATION_NAME: &str = "hornbot";

#[derive(Debug)]
pub enum Error {
    /// Transport-level failure (connect, timeout). Retried with backoff.
    Connect(String),
    /// The instance answered with a non-2xx status.
    Api(String),
    /// The instance answered with a body we could not make sense of.
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Connect(e) => write!(f, "connection error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

pub struct MastodonClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
    rate: Mutex<RateTracker>,
    /// Account ID for the token, cached after the first verify_credentials.
    account_id: Mutex<Option<String>>,
}

impl MastodonClient {
    /// `base_url` must carry no trailing slash. `seed_reset_period` is the
    /// persisted observed rate limit reset period, or 0 to start cold.
    pub fn new(base_url: &str, token: &str, seed_reset_period: f64) -> Self {
        Self {
            base_url: base_url.to_string(),
            token: token.to_string(),
            http: reqwest::Client::new(),
            rate: Mutex::new(RateTracker::with_seed(seed_reset_period)),
            account_id: Mutex::new(None),
        }
    }

    pub fn rate_remaining(&self) -> u32 {
        self.rate.lock().expect("rate tracker lock poisoned").remaining()
    }

    pub fn observed_reset_period(&self) -> f64 {
        self.rate
            .lock()
            .expect("rate tracker lock poisoned")
            .observed_reset_period()
    }

    pub fn estimated_secs_to_reset(&self) -> u64 {
        self.rate
            .lock()
            .expect("rate tracker lock poisoned")
            .estimated_secs_to_reset()
    }

    /// Send a request, feeding rate limit headers to the tracker before the
    /// caller sees the response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        self.rate
            .lock()
            .expect("rate tracker lock poisoned")
            .observe(response.headers());
        Ok(response)
    }

    /// Return the account ID for the configured token, caching it after the
    /// first successful lookup.
    pub async fn account_id(&self) -> Result<String, Error> {
        if let Some(id) = self.account_id.lock().expect("account id lock poisoned").clone() {
            return Ok(id);
        }

        let url = format!("{}/api/v1/accounts/verify_credentials", self.base_url);
        let response = self.send(self.http.get(&url)).await?;
        let response = require_success(response, "verify_credentials").await?;
        let account: CredentialAccount = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("verify_credentials: {e}")))?;

        *self.account_id.lock().expect("account id lock poisoned") = Some(account.id.clone());
        Ok(account.id)
    }

    /// Fetch notifications for the account, newest first. With `since_id`,
    /// only notifications newer than that ID are returned.
    pub async fn notifications(&self, since_id: Option<&str>) -> Result<Vec<Notification>, Error> {
        let url = format!("{}/api/v1/notifications", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(since) = since_id {
            request = request.query(&[("since_id", since)]);
        }

        let response = self.send(request).await?;
        let response = require_success(response, "notifications").await?;

        match response.json::<Vec<Notification>>().await {
            Ok(notes) => {
                if notes.is_empty() {
                    debug!("got 0 notifications");
                } else {
                    info!("got {} notifications", notes.len());
                }
                Ok(notes)
            }
            Err(e) => {
                // A mangled page is not worth dying over; the next poll retries.
                error!("error parsing notifications response: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Post a public status, optionally in reply to another status.
    ///
    /// Returns `Ok(false)` when the instance rejected the post for rate
    /// limiting; the caller should wait for the next reset and retry.
    pub async fn post_status(
        &self,
        content: &str,
        in_reply_to: Option<&str>,
    ) -> Result<bool, Error> {
        if content.trim().is_empty() {
            return Err(Error::Api("refusing to post an empty status".into()));
        }

        let mut form = vec![
            ("status", content.to_string()),
            ("visibility", "public".to_string()),
        ];
        if let Some(status_id) = in_reply_to {
            form.push(("in_reply_to_id", status_id.to_string()));
        }

        let url = format!("{}/api/v1/statuses", self.base_url);
        let request = self
            .http
            .post(&url)
            .header("Idempotency-Key", idempotency_key(content, in_reply_to))
            .form(&form);

        let response = self.send(request).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("post_status rejected: rate limited");
            return Ok(false);
        }
        require_success(response, "post_status").await?;
        Ok(true)
    }

    /// Fetch the complete follower list for an account, walking `Link`
    /// header pagination to the end. Returns the `acct` names.
    pub async fn all_followers(&self, account_id: &str) -> Result<Vec<String>, Error> {
        if account_id.is_empty() {
            return Err(Error::Api("no account_id provided for followers".into()));
        }

        let mut url = format!("{}/api/v1/accounts/{}/followers", self.base_url, account_id);
        let mut accts = Vec::new();
        loop {
            let response = self.send(self.http.get(&url)).await?;
            let response = require_success(response, "followers").await?;
            let next = next_page_url(response.headers());

            let page: Vec<Account> = response
                .json()
                .await
                .map_err(|e| Error::Parse(format!("followers: {e}")))?;
            accts.extend(page.into_iter().map(|account| account.acct));

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }
        Ok(accts)
    }
}

/// Error out on non-2xx, keeping the body for the message.
async fn require_success(
    response: reqwest::Response,
    action: &str,
) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api(format!("{action}: HTTP {status}: {body}")))
}

/// Build the idempotency key for a status post: application name, reply
/// marker, then every alphanumeric character of the content.
fn idempotency_key(content: &str, in_reply_to: Option<&str>) -> String {
    let mut key = match in_reply_to {
        Some(status_id) => format!("{APPLICATION_NAME}.Reply.{status_id}."),
        None => format!("{APPLICATION_NAME}.Toot."),
    };
    key.extend(content.chars().filter(|c| c.is_alphanumeric()));
    key
}

static LINK_REL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<(.*?)>;\s*rel="([^"]*)""#).unwrap());

/// Extract the `rel="next"` target from a `Link` header, if present.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let links = headers.get("Link")?.to_str().ok()?;
    LINK_REL
        .captures_iter(links)
        .find(|caps| &caps[2] == "next")
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn link_headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("Link", HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn test_idempotency_key_plain_toot() {
        let key = idempotency_key("Hello @alice, horn time!", None);
        assert_eq!(key, "hornbot.Toot.Helloalicehorntime");
    }

    #[test]
    fn test_idempotency_key_reply() {
        let key = idempotency_key("Job's done! Toot toot!", Some("98765"));
        assert_eq!(key, "hornbot.Reply.98765.JobsdoneToottoot");
    }

    #[test]
    fn test_idempotency_key_same_content_same_key() {
        assert_eq!(
            idempotency_key("toot the horn", None),
            idempotency_key("toot   the   horn", None)
        );
    }

    #[test]
    fn test_next_page_url_found() {
        let headers = link_headers(
            r#"<https://example.social/api/v1/accounts/1/followers?max_id=7628164>; rel="next", <https://example.social/api/v1/accounts/1/followers?since_id=7628320>; rel="prev""#,
        );
        assert_eq!(
            next_page_url(&headers).as_deref(),
            Some("https://example.social/api/v1/accounts/1/followers?max_id=7628164")
        );
    }

    #[test]
    fn test_next_page_url_only_prev() {
        let headers = link_headers(
            r#"<https://example.social/api/v1/accounts/1/followers?since_id=7628320>; rel="prev""#,
        );
        assert_eq!(next_page_url(&headers), None);
    }

    #[test]
    fn test_next_page_url_missing_header() {
        assert_eq!(next_page_url(&HeaderMap::new()), None);
    }

    #[test]
    fn test_next_page_url_next_listed_second() {
        let headers = link_headers(
            r#"<https://a.example/prev>; rel="prev", <https://a.example/next>; rel="next""#,
        );
        assert_eq!(next_page_url(&headers).as_deref(), Some("https://a.example/next"));
    }
}
