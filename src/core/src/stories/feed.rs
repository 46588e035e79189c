use std::collections::HashMap;

use kiln_protocol::{FeedEntry, Story, StoryFeed};

/// Group visible stories into one tray slot per author.
///
/// Keeps the newest story per owner, pulls the viewer's own slot out, and
/// orders everyone else newest first.
pub fn compose_feed(stories: Vec<Story>, viewer_id: &str) -> StoryFeed {
    let mut by_owner: HashMap<String, FeedEntry> = HashMap::new();
    for story in stories {
        match by_owner.get_mut(&story.owner_id) {
            Some(entry) => {
                entry.story_count += 1;
                if story.created_at > entry.latest.created_at {
                    entry.latest = story;
                }
            }
            None => {
                by_owner.insert(
                    story.owner_id.clone(),
                    FeedEntry {
                        owner_id: story.owner_id.clone(),
                        latest: story,
                        story_count: 1,
                    },
                );
            }
        }
    }

    let own = by_owner.remove(viewer_id);
    let mut others: Vec<FeedEntry> = by_owner.into_values().collect();
    others.sort_by(|a, b| {
        b.latest
            .created_at
            .cmp(&a.latest.created_at)
            .then_with(|| a.owner_id.cmp(&b.owner_id))
    });

    StoryFeed { own, others }
}
