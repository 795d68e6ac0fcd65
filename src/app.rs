use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data::{
    CommentService, FeedService, LinkOpener, RedditCommentService, RedditFeedService,
    SystemLinkOpener,
};
use crate::reddit;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let credentials = cfg.reddit.credentials()?;

    let client = Arc::new(reddit::Client::new(reddit::ClientConfig {
        credentials,
        ..Default::default()
    })?);

    let feed_service: Arc<dyn FeedService> = Arc::new(RedditFeedService::new(client.clone()));
    let comment_service: Arc<dyn CommentService> = Arc::new(RedditCommentService::new(client));
    let opener: Arc<dyn LinkOpener> = Arc::new(SystemLinkOpener);

    let options = ui::Options {
        status_message: "Browsing Reddit. Press j/k to navigate, Enter for details, q to quit."
            .to_string(),
        feed_service,
        comment_service,
        opener,
        default_feed: reddit::Feed::Home,
        default_sort: reddit::SortOption::Hot,
    };

    let mut model = ui::Model::new(options);
    model.run()
}
