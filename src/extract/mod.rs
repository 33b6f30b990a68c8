pub mod arxiv;
pub mod doi;
pub mod normalize;

pub use arxiv::{arxiv_id_guesses, arxiv_year_month, find_arxiv_id};
pub use doi::{doi_cache_key, doi_from_link};
pub use normalize::{has_author_overlap, normalize_title, reference_tokens, surname};
