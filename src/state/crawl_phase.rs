/// Crawl phase definitions for walking one seed's pagination
///
/// This module defines the phases of the per-seed walk and which moves
/// between them are legal.
use crate::DarkwatchError;
use std::fmt;
use url::Url;

/// Represents the phase of one seed's pagination walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Fetching a list page and extracting thread links
    ListPage,

    /// Fetching and parsing one thread found on the current list page
    ThreadPage,

    /// Resolving the next-page link of the current list page
    NextListPage,

    /// Pagination for this seed is finished
    Done,
}

impl CrawlPhase {
    /// Returns true if no further work is done for the seed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if the move from `self` to `next` is legal
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        matches!(
            (self, next),
            (ListPage, ThreadPage)
                | (ListPage, NextListPage)
                | (ListPage, Done)
                | (ThreadPage, ThreadPage)
                | (ThreadPage, NextListPage)
                | (ThreadPage, Done)
                | (NextListPage, ListPage)
                | (NextListPage, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListPage => "list_page",
            Self::ThreadPage => "thread_page",
            Self::NextListPage => "next_list_page",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of one seed's walk: phase, current list URL and page budget
#[derive(Debug, Clone)]
pub struct SeedCursor {
    phase: CrawlPhase,
    list_url: Url,
    pages_entered: u32,
    max_pages: u32,
}

impl SeedCursor {
    /// Starts a walk at the seed's first list page
    pub fn new(seed: Url, max_pages: u32) -> Self {
        Self {
            phase: CrawlPhase::ListPage,
            list_url: seed,
            pages_entered: 1,
            max_pages,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn list_url(&self) -> &Url {
        &self.list_url
    }

    /// Number of list pages entered so far, the seed included
    pub fn pages_entered(&self) -> u32 {
        self.pages_entered
    }

    /// Moves to a new phase
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The transition is legal
    /// * `Err(DarkwatchError::InvalidTransition)` - It is not
    pub fn advance(&mut self, next: CrawlPhase) -> Result<(), DarkwatchError> {
        if !self.phase.can_transition_to(next) {
            return Err(DarkwatchError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        if next == CrawlPhase::ListPage {
            self.pages_entered += 1;
        }
        self.phase = next;
        Ok(())
    }

    /// Decides where pagination goes after a list page's threads are done
    ///
    /// Moves to `ListPage` on `next` when one was found and the page budget
    /// allows it; otherwise to `Done`.
    pub fn follow_next(&mut self, next: Option<Url>) -> Result<CrawlPhase, DarkwatchError> {
        let target = match next {
            Some(url) if self.pages_entered < self.max_pages => {
                self.list_url = url;
                CrawlPhase::ListPage
            }
            _ => CrawlPhase::Done,
        };
        self.advance(target)?;
        Ok(target)
    }
}
