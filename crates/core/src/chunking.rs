use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{Chunk, IngestionOptions, LengthUnit};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
    pub unit: LengthUnit,
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self {
            size: value.chunk_size,
            overlap: value.chunk_overlap,
            unit: value.length_unit,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// A contiguous run of the normalized document text.
#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
    char_start: usize,
    char_end: usize,
    page: u32,
}

struct Tokenized {
    text: String,
    tokens: Vec<Token>,
}

fn tokenize(pages: &[PageText], config: &ChunkingConfig) -> Tokenized {
    let mut text = String::new();
    let mut tokens = Vec::new();
    let mut chars = 0usize;

    for page in pages {
        for word in page.text.split_whitespace() {
            if !text.is_empty() {
                text.push(' ');
                chars += 1;
            }

            let pieces = match config.unit {
                LengthUnit::Words => vec![word],
                LengthUnit::Characters => split_long_word(word, config.size),
            };

            for piece in pieces {
                let start = text.len();
                let char_start = chars;
                text.push_str(piece);
                chars += piece.chars().count();
                tokens.push(Token {
                    start,
                    end: text.len(),
                    char_start,
                    char_end: chars,
                    page: page.number,
                });
            }
        }
    }

    Tokenized { text, tokens }
}

fn split_long_word(word: &str, max_chars: usize) -> Vec<&str> {
    if word.chars().count() <= max_chars {
        return vec![word];
    }

    let boundaries = word
        .char_indices()
        .map(|(index, _)| index)
        .step_by(max_chars)
        .chain(std::iter::once(word.len()))
        .collect::<Vec<_>>();

    boundaries
        .windows(2)
        .map(|pair| &word[pair[0]..pair[1]])
        .collect()
}

fn measure(tokens: &[Token], start: usize, end: usize, unit: LengthUnit) -> usize {
    match unit {
        LengthUnit::Words => end - start,
        LengthUnit::Characters => tokens[end - 1].char_end - tokens[start].char_start,
    }
}

/// Token ranges `[start, end)` of every chunk, in document order.
fn pack_windows(tokens: &[Token], config: &ChunkingConfig) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        let mut end = start + 1;
        while end < tokens.len() && measure(tokens, start, end + 1, config.unit) <= config.size {
            end += 1;
        }
        windows.push((start, end));

        if end == tokens.len() {
            break;
        }

        let mut next = end;
        while next > start + 1 && measure(tokens, next - 1, end, config.unit) <= config.overlap {
            next -= 1;
        }
        start = next;
    }

    windows
}

/// Splits ordered pages into overlapping chunks. Chunks may cross page
/// boundaries and record the page range they cover.
pub fn build_chunks(
    document_id: &str,
    pages: &[PageText],
    options: &IngestionOptions,
) -> Result<Vec<Chunk>, IngestError> {
    let config = ChunkingConfig::from(*options);
    config.validate()?;

    let Tokenized { text, tokens } = tokenize(pages, &config);

    let chunks = pack_windows(&tokens, &config)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let first = tokens[start];
            let last = tokens[end - 1];
            let chunk_text = text[first.start..last.end].to_string();
            let chunk_index = index as u64;

            Chunk {
                chunk_id: make_chunk_id(document_id, chunk_index, &chunk_text),
                chunk_index,
                page_start: first.page,
                page_end: last.page,
                offset: first.start,
                text: chunk_text,
            }
        })
        .collect();

    Ok(chunks)
}

/// Rebuilds the normalized document text from ordered chunks, dropping the
/// duplicated overlap between neighbours.
pub fn merge_chunks(chunks: &[Chunk]) -> String {
    let mut merged = String::new();

    for chunk in chunks {
        let covered = merged.len();
        if chunk.offset > covered {
            if !merged.is_empty() {
                merged.push(' ');
            }
            merged.push_str(&chunk.text);
            continue;
        }

        let skip = covered - chunk.offset;
        if let Some(rest) = chunk.text.get(skip..) {
            merged.push_str(rest);
        }
    }

    merged
}

fn make_chunk_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number,
            text: text.to_string(),
        }
    }

    fn words(count: usize, prefix: &str) -> String {
        (0..count)
            .map(|index| format!("{prefix}{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn options(size: usize, overlap: usize, unit: LengthUnit) -> IngestionOptions {
        IngestionOptions {
            chunk_size: size,
            chunk_overlap: overlap,
            length_unit: unit,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let pages = vec![page(1, "some text")];
        let result = build_chunks("doc", &pages, &options(10, 10, LengthUnit::Words));
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));

        let result = build_chunks("doc", &pages, &options(0, 0, LengthUnit::Words));
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn word_chunks_respect_size_and_overlap() {
        let pages = vec![
            page(1, &words(500, "a")),
            page(2, &words(500, "b")),
            page(3, &words(500, "c")),
        ];

        let chunks = build_chunks("policy", &pages, &options(1000, 200, LengthUnit::Words))
            .expect("chunking should succeed");

        assert_eq!(chunks.len(), 2);
        assert!(chunks.len() <= 1500usize.div_ceil(800));
        assert_eq!(chunks[0].text.split_whitespace().count(), 1000);
        assert_eq!(chunks[0].page_start, 1);
        assert_eq!(chunks[0].page_end, 2);
        assert_eq!(chunks[1].page_start, 2);
        assert_eq!(chunks[1].page_end, 3);
        assert!(chunks[1].text.starts_with("b300 "));
    }

    #[test]
    fn character_chunks_stay_within_bound() {
        let pages = vec![page(1, "tiny supercalifragilisticexpialidocious word list here")];
        let chunks = build_chunks("doc", &pages, &options(10, 3, LengthUnit::Characters))
            .expect("chunking should succeed");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 10, "{:?}", chunk.text);
        }
    }

    #[test]
    fn merging_chunks_recovers_normalized_text() {
        let pages = vec![
            page(1, "The refund window is   thirty days.\nContact support for help."),
            page(2, "Shipping\tis free above fifty euros. Returns need a receipt."),
        ];
        let expected = normalize_whitespace(&format!("{} {}", pages[0].text, pages[1].text));

        for opts in [
            options(5, 2, LengthUnit::Words),
            options(4, 0, LengthUnit::Words),
            options(12, 4, LengthUnit::Characters),
            options(3, 1, LengthUnit::Characters),
        ] {
            let chunks = build_chunks("doc", &pages, &opts).expect("chunking should succeed");
            assert_eq!(merge_chunks(&chunks), expected, "options {opts:?}");
        }
    }

    #[test]
    fn chunk_ids_are_stable_and_ordered() {
        let pages = vec![page(1, &words(30, "w"))];
        let opts = options(10, 2, LengthUnit::Words);
        let first = build_chunks("doc", &pages, &opts).expect("chunking should succeed");
        let second = build_chunks("doc", &pages, &opts).expect("chunking should succeed");

        assert_eq!(first, second);
        for (position, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.chunk_index, position as u64);
        }
    }

    #[test]
    fn empty_pages_produce_no_chunks() {
        let pages = vec![page(1, "   \n\t ")];
        let chunks = build_chunks("doc", &pages, &IngestionOptions::default())
            .expect("chunking should succeed");
        assert!(chunks.is_empty());
    }
}
