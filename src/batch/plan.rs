//! Chunk planning for a page range

use serde::{Deserialize, Serialize};
use std::fmt;

/// One contiguous page range `[start, start + pages)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub start: u32,
    pub pages: u32,
}

impl ChunkPlan {
    pub fn end(&self) -> u32 {
        self.start + self.pages.saturating_sub(1)
    }

    /// Infix used in per-chunk log names, e.g. `darkforums_p201`
    pub fn label(&self, forum: &str) -> String {
        format!("{}_p{}", forum, self.start)
    }
}

impl fmt::Display for ChunkPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pages {}-{}", self.start, self.end())
    }
}

/// Splits `[1, max_page]` into chunks of `chunk_size` pages
///
/// The last chunk is shortened to end exactly at `max_page`.
///
/// # Examples
///
/// ```
/// use darkwatch::batch::plan_chunks;
///
/// let starts: Vec<u32> = plan_chunks(800, 200).iter().map(|c| c.start).collect();
/// assert_eq!(starts, vec![1, 201, 401, 601]);
/// ```
pub fn plan_chunks(max_page: u32, chunk_size: u32) -> Vec<ChunkPlan> {
    if max_page == 0 || chunk_size == 0 {
        return Vec::new();
    }
    (1..=max_page)
        .step_by(chunk_size as usize)
        .map(|start| ChunkPlan {
            start,
            pages: chunk_size.min(max_page - start + 1),
        })
        .collect()
}
