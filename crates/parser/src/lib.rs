pub mod classify;
pub mod html;

pub use classify::LinkClassifier;
pub use html::{extract_links, RawLink};
