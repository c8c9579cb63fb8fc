//! Paragraph-boundary text chunker with overlap.
//!
//! Splits extracted document text into [`Chunk`]s of at most `max_tokens`
//! (approximated as 4 chars per token). Paragraphs (`\n\n`) are packed
//! greedily; a paragraph longer than the limit is split on whitespace.
//! Every chunk after the first is prefixed with up to `overlap_tokens` of
//! the previous chunk's tail, so the limit bounds a chunk before overlap.

use sha2::{Digest, Sha256};

const CHARS_PER_TOKEN: usize = 4;

/// A retrievable slice of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the document, contiguous from 0.
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Split `text` into chunks. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 2);

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if para.len() > max_chars {
            flush(&mut buf, &mut pieces);
            pieces.extend(split_long(para, max_chars));
            continue;
        }
        let needed = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if needed > max_chars {
            flush(&mut buf, &mut pieces);
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }
    flush(&mut buf, &mut pieces);

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let text = if i > 0 && overlap_chars > 0 {
                let carried = tail(&pieces[i - 1], overlap_chars);
                if carried.is_empty() {
                    piece.clone()
                } else {
                    format!("{} {}", carried, piece)
                }
            } else {
                piece.clone()
            };
            make_chunk(i, text)
        })
        .collect()
}

fn flush(buf: &mut String, pieces: &mut Vec<String>) {
    if !buf.is_empty() {
        pieces.push(std::mem::take(buf));
    }
}

/// Hard-split an oversized paragraph, preferring whitespace boundaries.
fn split_long(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = para;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.to_string());
            break;
        }
        let mut cut = max_chars;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = remaining.chars().next().map(char::len_utf8).unwrap_or(1);
        }
        let split = remaining[..cut]
            .rfind(char::is_whitespace)
            .filter(|&pos| pos > 0)
            .unwrap_or(cut);
        let (head, rest) = remaining.split_at(split);
        let head = head.trim();
        if !head.is_empty() {
            out.push(head.to_string());
        }
        remaining = rest.trim_start();
    }
    out
}

/// The last `n` bytes of `text`, advanced to a word boundary.
fn tail(text: &str, n: usize) -> &str {
    if text.len() <= n {
        return text;
    }
    let mut start = text.len() - n;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let rest = &text[start..];
    match rest.find(char::is_whitespace) {
        Some(pos) => rest[pos..].trim_start(),
        None => rest,
    }
}

fn make_chunk(index: usize, text: String) -> Chunk {
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    Chunk { index, text, hash }
}
