//! 文本分块
//!
//! 递归字符切分：优先在段落边界切，退而求其次句子、空格，
//! 最后硬切。相邻块之间保留重叠以保住跨界语境。

/// 按层次分隔符把长文本切为带重叠的块
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    let pieces = split_recursive(text, chunk_size, &["\n\n", "\n", ". ", " "]);

    // 合并小片段并加重叠
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && current.chars().count() + piece.chars().count() > chunk_size {
            chunks.push(current.clone());
            current = tail_chars(&current, overlap);
        }
        current.push_str(&piece);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

fn split_recursive(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((sep, rest)) = separators.split_first() else {
        // 分隔符用尽，按字符硬切
        return text
            .chars()
            .collect::<Vec<_>>()
            .chunks(chunk_size)
            .map(|c| c.iter().collect())
            .collect();
    };

    let mut pieces = Vec::new();
    let parts: Vec<&str> = text.split_inclusive(*sep).collect();
    if parts.len() <= 1 {
        return split_recursive(text, chunk_size, rest);
    }
    for part in parts {
        if part.chars().count() > chunk_size {
            pieces.extend(split_recursive(part, chunk_size, rest));
        } else {
            pieces.push(part.to_string());
        }
    }
    pieces
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("a short paragraph", 700, 250);
        assert_eq!(chunks, vec!["a short paragraph"]);
    }

    #[test]
    fn test_respects_chunk_size_with_overlap() {
        let paragraph = "word ".repeat(100);
        let text = format!("{}\n\n{}\n\n{}", paragraph, paragraph, paragraph);
        let chunks = split_text(&text, 200, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // 重叠合并后单块不会超过一个块尺寸加一个片段
            assert!(chunk.chars().count() <= 400, "chunk too large: {}", chunk.len());
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let text = "alpha beta gamma delta ".repeat(30);
        let chunks = split_text(&text, 100, 30);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail = tail_chars(&pair[0], 30);
            assert!(pair[1].starts_with(&tail), "missing overlap: {:?}", tail);
        }
    }

    #[test]
    fn test_no_separators_hard_split() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, 300, 0);
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_text("", 700, 250).is_empty());
    }
}
