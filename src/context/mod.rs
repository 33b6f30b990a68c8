pub mod adjacent;
pub mod generate;
pub mod markers;
pub mod sentences;
pub mod words;

pub use adjacent::{adjacent_citations, ADJACENT_PERIMETER};
pub use generate::{
    contexts_for_work, render_context, window_at, CitationGraph, ContextRecord, ContextSettings, WorkContexts,
};
pub use markers::{cite_marker, CITE_PATTERN};
pub use sentences::{sentence_spans, sentence_window};
pub use words::{word_distance_backward, word_distance_forward, word_window};
