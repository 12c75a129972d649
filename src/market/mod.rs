pub mod token_feed;

pub use token_feed::{TokenFeed, TokenListing, TokenSource};
