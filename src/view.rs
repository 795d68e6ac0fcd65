//! Single-threaded owner of all renderable state.
//!
//! `ViewState` is the only writer of on-screen data and the only consumer of
//! fetch envelopes. It tracks the latest issued token per slot; an envelope
//! whose token does not match is stale and silently dropped, so a slow fetch
//! can never overwrite the result of a newer one.

use std::sync::Arc;

use anyhow::Result;

use crate::data::{CommentService, FeedService, LinkOpener};
use crate::fetch::{Coordinator, FetchEnvelope, FetchPayload, FetchSlot, RequestToken};
use crate::reddit::{Feed, Post, SortOption};

use crossbeam_channel::Receiver;

pub const PAGE_LIMIT: u32 = 20;
pub const COMMENT_LIMIT: usize = 10;

pub const LIST_LOADING_PLACEHOLDER: &str = "Loading posts...";
pub const EMPTY_LIST_PLACEHOLDER: &str = "No posts found.";
pub const DETAIL_LOADING_PLACEHOLDER: &str = "Loading post details and comments...";
pub const DETAIL_IDLE_PLACEHOLDER: &str = "Select a post to load details and comments.";

/// Semantic role of a detail-region line, mapped to a terminal style by the
/// presentation shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Title,
    Score,
    Url,
    Content,
    Header,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLine {
    pub role: Role,
    pub text: String,
}

impl DetailLine {
    fn new(role: Role, text: impl Into<String>) -> Self {
        DetailLine {
            role,
            text: text.into(),
        }
    }
}

struct PendingFetch {
    token: RequestToken,
}

pub struct ViewState {
    coordinator: Coordinator,
    feed_service: Arc<dyn FeedService>,
    comment_service: Arc<dyn CommentService>,
    opener: Arc<dyn LinkOpener>,
    posts: Vec<Post>,
    list_lines: Vec<String>,
    detail_lines: Vec<DetailLine>,
    selected_url: Option<String>,
    pending_list: Option<PendingFetch>,
    pending_detail: Option<PendingFetch>,
}

impl ViewState {
    pub fn new(
        feed_service: Arc<dyn FeedService>,
        comment_service: Arc<dyn CommentService>,
        opener: Arc<dyn LinkOpener>,
    ) -> (Self, Receiver<FetchEnvelope>) {
        let (coordinator, rx) = Coordinator::new();
        let state = ViewState {
            coordinator,
            feed_service,
            comment_service,
            opener,
            posts: Vec::new(),
            list_lines: Vec::new(),
            detail_lines: vec![DetailLine::new(Role::Content, DETAIL_IDLE_PLACEHOLDER)],
            selected_url: None,
            pending_list: None,
            pending_detail: None,
        };
        (state, rx)
    }

    pub fn list_lines(&self) -> &[String] {
        &self.list_lines
    }

    pub fn detail_lines(&self) -> &[DetailLine] {
        &self.detail_lines
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn selected_url(&self) -> Option<&str> {
        self.selected_url.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_list.is_some() || self.pending_detail.is_some()
    }

    /// Replaces the post list wholesale: clears the visible list and the
    /// selection, then issues a fresh `PostList` fetch. Any fetch still
    /// pending for the slot is superseded by the new token.
    pub fn request_refresh(&mut self, feed: Feed, sort: SortOption) -> RequestToken {
        self.posts.clear();
        self.selected_url = None;
        self.list_lines = vec![LIST_LOADING_PLACEHOLDER.to_string()];

        let service = self.feed_service.clone();
        let token = self.coordinator.issue(FetchSlot::PostList, move || {
            service
                .load_posts(feed, sort, PAGE_LIMIT)
                .map(FetchPayload::Posts)
        });
        self.pending_list = Some(PendingFetch { token });
        token
    }

    /// Selecting past the end of the list (a placeholder row, say) is a
    /// defensive no-op, not an error.
    pub fn select_post(&mut self, index: usize) -> Option<RequestToken> {
        let post = self.posts.get(index)?;
        let article = post.id.clone();
        self.selected_url = Some(post.url.clone());
        self.detail_lines = vec![DetailLine::new(Role::Content, DETAIL_LOADING_PLACEHOLDER)];

        let service = self.comment_service.clone();
        let token = self.coordinator.issue(FetchSlot::PostDetail, move || {
            service
                .load_detail(&article)
                .map(|(post, comments)| FetchPayload::Detail(Box::new(post), comments))
        });
        self.pending_detail = Some(PendingFetch { token });
        Some(token)
    }

    pub fn open_selected_link(&self) {
        if let Some(url) = &self.selected_url {
            self.opener.open(url);
        }
    }

    pub fn handle_envelope(&mut self, envelope: FetchEnvelope) {
        match envelope.slot {
            FetchSlot::PostList => self.on_post_list(envelope.token, envelope.outcome),
            FetchSlot::PostDetail => self.on_post_detail(envelope.token, envelope.outcome),
        }
    }

    fn on_post_list(&mut self, token: RequestToken, outcome: Result<FetchPayload>) {
        let Some(pending) = &self.pending_list else {
            return;
        };
        if pending.token != token {
            return;
        }
        self.pending_list = None;

        match outcome {
            Ok(FetchPayload::Posts(posts)) => {
                self.posts = posts;
                self.render_post_list();
            }
            // Payload kind is fixed at the issue site.
            Ok(FetchPayload::Detail(..)) => {}
            Err(err) => {
                self.posts.clear();
                self.list_lines = vec![format!("Error fetching posts: {err:#}")];
            }
        }
    }

    fn on_post_detail(&mut self, token: RequestToken, outcome: Result<FetchPayload>) {
        let Some(pending) = &self.pending_detail else {
            return;
        };
        if pending.token != token {
            return;
        }
        self.pending_detail = None;

        match outcome {
            Ok(FetchPayload::Detail(post, comments)) => {
                let mut lines = vec![
                    DetailLine::new(Role::Title, format!("Title: {}", post.title)),
                    DetailLine::new(Role::Score, format!("Score: {}", post.score)),
                    DetailLine::new(Role::Url, format!("URL: {}", post.url)),
                ];
                if !post.selftext.is_empty() {
                    lines.push(DetailLine::new(
                        Role::Content,
                        format!("Content:\n{}", post.selftext),
                    ));
                }
                lines.push(DetailLine::new(Role::Header, "Comments:"));
                for comment in comments.iter().take(COMMENT_LIMIT) {
                    lines.push(DetailLine::new(Role::Comment, format!("- {}", comment.body)));
                }
                self.detail_lines = lines;
            }
            Ok(FetchPayload::Posts(..)) => {}
            Err(err) => {
                self.detail_lines = vec![DetailLine::new(
                    Role::Content,
                    format!("Error fetching comments: {err:#}"),
                )];
            }
        }
    }

    fn render_post_list(&mut self) {
        if self.posts.is_empty() {
            self.list_lines = vec![EMPTY_LIST_PLACEHOLDER.to_string()];
        } else {
            self.list_lines = self
                .posts
                .iter()
                .enumerate()
                .map(|(i, post)| format!("{}. {} (Score: {})", i + 1, post.title, post.score))
                .collect();
        }
    }
}
