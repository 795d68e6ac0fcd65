use std::sync::Arc;

use anyhow::Result;

use crate::reddit::{self, Comment, Feed, Post, SortOption};

pub trait FeedService: Send + Sync {
    fn load_posts(&self, feed: Feed, sort: SortOption, limit: u32) -> Result<Vec<Post>>;
}

pub trait CommentService: Send + Sync {
    /// Fetches the post body and its flattened top-level comments.
    fn load_detail(&self, article: &str) -> Result<(Post, Vec<Comment>)>;
}

/// Fire-and-forget handoff to an external browser.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str);
}

pub struct RedditFeedService {
    client: Arc<reddit::Client>,
}

impl RedditFeedService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for RedditFeedService {
    fn load_posts(&self, feed: Feed, sort: SortOption, limit: u32) -> Result<Vec<Post>> {
        let listing = self.client.listing(feed, sort, limit)?;
        Ok(listing
            .children
            .into_iter()
            .map(|thing| thing.data)
            .collect())
    }
}

pub struct RedditCommentService {
    client: Arc<reddit::Client>,
}

impl RedditCommentService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RedditCommentService {
    fn load_detail(&self, article: &str) -> Result<(Post, Vec<Comment>)> {
        let (post, tree) = self.client.comments(article)?;
        Ok((post, reddit::flatten_comments(tree)))
    }
}

pub struct SystemLinkOpener;

impl LinkOpener for SystemLinkOpener {
    fn open(&self, url: &str) {
        let _ = webbrowser::open(url);
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn load_posts(&self, feed: Feed, _sort: SortOption, _limit: u32) -> Result<Vec<Post>> {
        Ok(vec![Post {
            id: "welcome".into(),
            name: "t3_welcome".into(),
            title: format!("Sample post for {}", feed.display_name()),
            author: "viewer".into(),
            selftext: "Sample content provided for offline browsing.".into(),
            score: 1234,
            num_comments: 1,
            ..Default::default()
        }])
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_detail(&self, article: &str) -> Result<(Post, Vec<Comment>)> {
        let post = Post {
            id: article.into(),
            name: format!("t3_{}", article),
            title: format!("Sample post {}", article),
            author: "viewer".into(),
            selftext: "Comments are unavailable in this mock response.".into(),
            score: 1,
            ..Default::default()
        };
        Ok((post, Vec::new()))
    }
}
