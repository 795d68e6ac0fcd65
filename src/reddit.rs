use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://oauth.reddit.com/";
pub const DEFAULT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

const TOKEN_REFRESH_SKEW: Duration = Duration::from_secs(30);

/// The three opaque strings a script application needs for read-only access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub base_url: Option<String>,
    pub token_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    #[default]
    Home,
    Popular,
}

impl Feed {
    pub fn display_name(&self) -> &'static str {
        match self {
            Feed::Home => "Home",
            Feed::Popular => "Popular",
        }
    }

    pub fn toggled(&self) -> Feed {
        match self {
            Feed::Home => Feed::Popular,
            Feed::Popular => Feed::Home,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Hot,
    Best,
    New,
    Top,
    Rising,
}

impl SortOption {
    fn as_str(&self) -> &'static str {
        match self {
            SortOption::Hot => "hot",
            SortOption::Best => "best",
            SortOption::New => "new",
            SortOption::Top => "top",
            SortOption::Rising => "rising",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SortOption::Hot => "Hot",
            SortOption::Best => "Best",
            SortOption::New => "New",
            SortOption::Top => "Top",
            SortOption::Rising => "Rising",
        }
    }

    pub fn cycled(&self) -> SortOption {
        match self {
            SortOption::Hot => SortOption::Best,
            SortOption::Best => SortOption::New,
            SortOption::New => SortOption::Top,
            SortOption::Top => SortOption::Rising,
            SortOption::Rising => SortOption::Hot,
        }
    }
}

#[derive(Debug, Clone)]
struct AppToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Read-only Reddit API client authenticated with application-only OAuth
/// (`grant_type=client_credentials`). Constructed once at startup with
/// injected credentials and shared behind an `Arc`.
pub struct Client {
    http: HttpClient,
    credentials: Credentials,
    base_url: Url,
    token_url: Url,
    token: RwLock<Option<AppToken>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.credentials.client_id.trim().is_empty() {
            bail!("reddit client id required");
        }
        if config.credentials.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let token = config
            .token_url
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        let token_url = Url::parse(&token)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            credentials: config.credentials,
            base_url,
            token_url,
            token: RwLock::new(None),
        })
    }

    /// Fetches one page of the given feed.
    pub fn listing(&self, feed: Feed, sort: SortOption, limit: u32) -> Result<Listing<Post>> {
        let path = listing_path(feed, sort);
        let params = vec![("limit".to_string(), limit.to_string())];
        let resp = self.request(Method::GET, &path, &params)?;
        let listing: ListingEnvelope<Post> = resp.json()?;
        Ok(listing.data)
    }

    /// Fetches a post and its comment tree by article id.
    pub fn comments(&self, article: &str) -> Result<(Post, Listing<Comment>)> {
        if article.trim().is_empty() {
            bail!("reddit: comments article id is required");
        }
        let path = format!("/comments/{}.json", article);
        let resp = self.request(Method::GET, &path, &[])?;
        let payload: Vec<Value> = resp.json()?;
        if payload.len() < 2 {
            bail!("reddit: comments payload missing elements");
        }
        let post_listing: ListingEnvelope<Post> =
            serde_json::from_value(payload[0].clone()).context("reddit: decode post listing")?;
        let comments_listing: ListingEnvelope<Comment> =
            serde_json::from_value(payload[1].clone()).context("reddit: decode comment listing")?;
        let post = post_listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data)
            .ok_or_else(|| anyhow!("reddit: post listing empty"))?;
        Ok((post, comments_listing.data))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Response> {
        let token = self.bearer_token()?;
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let resp = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.credentials.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                401 => Err(anyhow!("reddit: unauthorized")),
                403 => Err(anyhow!("reddit: forbidden")),
                429 => Err(anyhow!("reddit: rate limited: {}", body)),
                _ => Err(anyhow!("reddit: api error {}: {}", status, body)),
            }
        }
    }

    fn bearer_token(&self) -> Result<String> {
        if let Some(access) = self.cached_token() {
            return Ok(access);
        }
        let fresh = self.fetch_token()?;
        let access = fresh.access_token.clone();
        *self.token.write().unwrap() = Some(fresh);
        Ok(access)
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.read().unwrap();
        let token = guard.as_ref()?;
        if SystemTime::now() + TOKEN_REFRESH_SKEW < token.expires_at {
            Some(token.access_token.clone())
        } else {
            None
        }
    }

    fn fetch_token(&self) -> Result<AppToken> {
        #[derive(Deserialize)]
        struct TokenPayload {
            access_token: String,
            #[serde(default)]
            expires_in: u64,
        }

        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(USER_AGENT, self.credentials.user_agent.clone())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("reddit: request app token")?;
        if !resp.status().is_success() {
            bail!("reddit: token request failed: {}", resp.status());
        }
        let payload: TokenPayload = resp.json().context("reddit: decode app token")?;
        if payload.access_token.is_empty() {
            bail!("reddit: token response missing access token");
        }
        let lifetime = if payload.expires_in == 0 {
            3600
        } else {
            payload.expires_in
        };
        Ok(AppToken {
            access_token: payload.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(lifetime),
        })
    }
}

fn listing_path(feed: Feed, sort: SortOption) -> String {
    match feed {
        Feed::Home => format!("/{}.json", sort.as_str()),
        Feed::Popular => format!("/r/popular/{}.json", sort.as_str()),
    }
}

/// Depth-first flattening of a comment tree. `more` placeholders (children
/// whose kind is not `t1`) are collapsed away without expansion.
pub fn flatten_comments(listing: Listing<Comment>) -> Vec<Comment> {
    let mut flat = Vec::new();
    push_comments(listing, &mut flat);
    flat
}

fn push_comments(listing: Listing<Comment>, flat: &mut Vec<Comment>) {
    for thing in listing.children {
        if thing.kind != "t1" {
            continue;
        }
        let mut comment = thing.data;
        let replies = comment.replies.take();
        flat.push(comment);
        if let Some(replies) = replies {
            push_comments(*replies, flat);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub after: Option<String>,
    pub before: Option<String>,
    pub children: Vec<Thing<T>>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Listing {
            after: None,
            before: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub over_18: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub replies: Option<Box<Listing<Comment>>>,
}

impl<'de> Deserialize<'de> for Comment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Reddit encodes an empty reply tree as "" rather than null.
        #[derive(Deserialize)]
        struct CommentHelper {
            id: String,
            name: String,
            #[serde(default)]
            body: String,
            #[serde(default)]
            author: String,
            #[serde(default)]
            score: i64,
            #[serde(default)]
            depth: i64,
            #[serde(default)]
            created_utc: f64,
            #[serde(default)]
            replies: serde_json::Value,
        }

        let helper = CommentHelper::deserialize(deserializer)?;
        let replies = if helper.replies.is_null() || helper.replies == "" {
            None
        } else {
            serde_json::from_value::<ListingEnvelope<Comment>>(helper.replies)
                .ok()
                .map(|listing| Box::new(listing.data))
        };
        Ok(Comment {
            id: helper.id,
            name: helper.name,
            body: helper.body,
            author: helper.author,
            score: helper.score,
            depth: helper.depth,
            created_utc: helper.created_utc,
            replies,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    kind: String,
    data: Listing<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, body: &str, depth: i64, replies: Vec<Thing<Comment>>) -> Comment {
        Comment {
            id: id.to_string(),
            name: format!("t1_{}", id),
            body: body.to_string(),
            author: "tester".to_string(),
            score: 1,
            depth,
            created_utc: 0.0,
            replies: if replies.is_empty() {
                None
            } else {
                Some(Box::new(Listing {
                    after: None,
                    before: None,
                    children: replies,
                }))
            },
        }
    }

    fn t1(comment: Comment) -> Thing<Comment> {
        Thing {
            kind: "t1".to_string(),
            data: comment,
        }
    }

    #[test]
    fn listing_paths() {
        assert_eq!(listing_path(Feed::Home, SortOption::Hot), "/hot.json");
        assert_eq!(listing_path(Feed::Home, SortOption::Top), "/top.json");
        assert_eq!(
            listing_path(Feed::Popular, SortOption::New),
            "/r/popular/new.json"
        );
    }

    #[test]
    fn flatten_walks_depth_first() {
        let tree = Listing {
            after: None,
            before: None,
            children: vec![
                t1(comment(
                    "a",
                    "first",
                    0,
                    vec![t1(comment("a1", "first child", 1, vec![]))],
                )),
                t1(comment("b", "second", 0, vec![])),
            ],
        };
        let flat = flatten_comments(tree);
        let bodies: Vec<&str> = flat.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "first child", "second"]);
        assert!(flat.iter().all(|c| c.replies.is_none()));
    }

    #[test]
    fn flatten_collapses_more_placeholders() {
        let tree = Listing {
            after: None,
            before: None,
            children: vec![
                t1(comment("a", "kept", 0, vec![])),
                Thing {
                    kind: "more".to_string(),
                    data: comment("m", "", 0, vec![]),
                },
                t1(comment("b", "also kept", 0, vec![])),
            ],
        };
        let flat = flatten_comments(tree);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].body, "kept");
        assert_eq!(flat[1].body, "also kept");
    }

    #[test]
    fn comment_deserializes_empty_replies_string() {
        let raw = serde_json::json!({
            "id": "abc",
            "name": "t1_abc",
            "body": "hello",
            "author": "someone",
            "score": 5,
            "depth": 0,
            "created_utc": 0.0,
            "replies": ""
        });
        let comment: Comment = serde_json::from_value(raw).unwrap();
        assert_eq!(comment.body, "hello");
        assert!(comment.replies.is_none());
    }

    #[test]
    fn comment_deserializes_nested_replies() {
        let raw = serde_json::json!({
            "id": "abc",
            "name": "t1_abc",
            "body": "parent",
            "replies": {
                "kind": "Listing",
                "data": {
                    "after": null,
                    "before": null,
                    "children": [
                        {"kind": "t1", "data": {"id": "def", "name": "t1_def", "body": "child", "replies": ""}}
                    ]
                }
            }
        });
        let comment: Comment = serde_json::from_value(raw).unwrap();
        let replies = comment.replies.expect("nested replies");
        assert_eq!(replies.children.len(), 1);
        assert_eq!(replies.children[0].data.body, "child");
    }
}
