pub mod extractor;
pub mod html_extractor;

pub use extractor::{PageExtractor, PageHandle};
pub use html_extractor::{HtmlPageExtractor, EXTRACTOR_VERSION};

#[cfg(test)]
pub use extractor::MockPageExtractor;
