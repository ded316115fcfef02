pub mod chunker;
pub mod composer;
pub mod markup;

pub use chunker::{Block, Chunk, Chunker, TRUNCATION_MARKER};
pub use composer::{Composer, ImageRef, NotificationMessage, format_timestamp, imdb_link, plot_preview};
pub use markup::{MarkupDialect, PlainText, Span, text_len};
