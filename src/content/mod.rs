//! Post sources: filenames, front matter, link references and math.

mod error;
pub mod filename;
pub mod frontmatter;
pub mod links;
pub mod math;
mod post;

pub use error::PostError;
pub use post::{Post, collect_post_files, load_posts};
