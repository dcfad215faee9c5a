//! Files generated from the whole set of posts.

pub mod rss;
