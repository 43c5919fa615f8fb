pub mod encoder;
pub mod normalizer;
mod stopwords;

pub use encoder::{PAD_ID, PAD_TOKEN, SequenceEncoder, UNK_ID, UNK_TOKEN};
pub use normalizer::TextNormalizer;
