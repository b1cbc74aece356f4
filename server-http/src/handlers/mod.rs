pub mod health;
pub mod stories;

pub use health::health_check;
pub use stories::{
    create_story, delete_story, get_story, list_stories, search_stories, update_story,
    user_stats, user_stories,
};
