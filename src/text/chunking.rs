//! Text chunking with overlap
//!
//! Page text is split recursively: first at paragraph breaks, then at line
//! breaks, sentence ends and spaces, and finally between characters. Pieces
//! are merged back into chunks of at most `chunk_size` characters, and each
//! new chunk starts with up to `overlap` characters carried over from the
//! previous one.

use crate::config::ChunkingConfig;
use crate::error::{QaError, Result};
use crate::text::pdf::PageText;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Split points, tried in order. The empty separator cuts between characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// A retrieval unit cut from one page of one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Sequence position across the whole corpus
    pub id: usize,

    /// The chunk text, whitespace-trimmed
    pub text: String,

    /// Source document name
    pub source: String,

    /// 1-based page number
    pub page: u32,

    /// Position of this chunk among the splits of its page
    pub split_index: usize,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits page text into overlapping chunks
pub struct TextChunker {
    config: ChunkingConfig,
    inline_whitespace: Regex,
    blank_lines: Regex,
}

impl TextChunker {
    /// Create a new text chunker with the given configuration
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(QaError::Config("chunk_size must be greater than zero".to_string()));
        }
        if config.overlap >= config.chunk_size {
            return Err(QaError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                config.overlap, config.chunk_size
            )));
        }

        let inline_whitespace = Regex::new(r"[ \t\x{A0}]+").map_err(|e| {
            QaError::TextProcessing(format!("Failed to compile whitespace regex: {}", e))
        })?;
        let blank_lines = Regex::new(r"\n[ \t]*\n\s*").map_err(|e| {
            QaError::TextProcessing(format!("Failed to compile paragraph regex: {}", e))
        })?;

        Ok(Self {
            config,
            inline_whitespace,
            blank_lines,
        })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Normalize line endings and collapse runs of spaces and blank lines
    fn preprocess_text(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.inline_whitespace.replace_all(&text, " ");
        self.blank_lines.replace_all(&text, "\n\n").to_string()
    }

    /// Split text into trimmed, overlapping pieces. No length filtering.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let text = self.preprocess_text(text);
        self.split_recursive(&text, DEFAULT_SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if piece.chars().count() < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge_pieces(&fitting));
                fitting.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_pieces(&fitting));
        }

        chunks.retain(|chunk| !chunk.is_empty());
        chunks
    }

    /// Greedily pack pieces into chunks, carrying trailing pieces forward as overlap
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.overlap;

        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = piece.chars().count();

            if total + len > chunk_size && !current.is_empty() {
                if total > chunk_size {
                    log::warn!(
                        "Created a chunk of {} characters, longer than the target {}",
                        total,
                        chunk_size
                    );
                }
                push_joined(&mut chunks, &current);

                while total > overlap || (total + len > chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        push_joined(&mut chunks, &current);
        chunks
    }

    /// Chunk a sequence of pages, dropping near-empty chunks
    ///
    /// Output order is page order, then split order within each page.
    pub fn chunk_pages(&self, pages: &[PageText]) -> Vec<Chunk> {
        let per_page: Vec<Vec<String>> = pages
            .par_iter()
            .map(|page| self.split_text(&page.text))
            .collect();

        let mut chunks = Vec::new();
        let mut produced = 0;

        for (page, splits) in pages.iter().zip(per_page) {
            for (split_index, text) in splits.into_iter().enumerate() {
                produced += 1;
                if text.trim().chars().count() <= self.config.min_content_length {
                    continue;
                }
                chunks.push(Chunk {
                    id: chunks.len(),
                    text,
                    source: page.source.clone(),
                    page: page.page,
                    split_index,
                });
            }
        }

        log::info!(
            "Created {} text chunks from {} pages (filtered from {} total)",
            chunks.len(),
            pages.len(),
            produced
        );
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, pieces: &VecDeque<(&str, usize)>) {
    let joined: String = pieces.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split at `separator`, attaching each separator to the start of the piece after it
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
