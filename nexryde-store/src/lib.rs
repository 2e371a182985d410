mod feed;
mod rest;
mod server;

pub use feed::FeedDecoder;
pub use rest::RestStore;
pub use server::{feed_url, positions_url};
