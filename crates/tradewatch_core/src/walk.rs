use crate::{HighWaterMark, Sequenced};

/// One page of a newest-first, cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor of the next (older) page, `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStep {
    /// Fetch the older page behind `cursor`.
    Continue { cursor: String },
    /// The cycle is over; `mark` is the mark to carry into the next cycle.
    Finished { mark: HighWaterMark },
}

#[derive(Debug, PartialEq, Eq)]
pub struct PageVerdict<'a, T> {
    /// Items to emit, newest first.
    pub fresh: &'a [T],
    pub step: WalkStep,
}

/// Newest-first prefix of `items` lying strictly above `mark`.
///
/// Scanning stops at the first covered id: everything after it is older.
pub fn fresh_prefix<T: Sequenced>(items: &[T], mark: HighWaterMark) -> &[T] {
    let len = items
        .iter()
        .take_while(|item| !mark.covers(item.sequence_id()))
        .count();
    &items[..len]
}

/// Pure state machine for one sync cycle over a newest-first listing.
///
/// Feed it pages in fetch order; each verdict says what to emit and whether to
/// keep paging. From an uninitialized mark the first page only sets the
/// baseline.
#[derive(Debug, Clone)]
pub struct SyncWalk {
    start: HighWaterMark,
    newest: Option<HighWaterMark>,
    pages: usize,
}

impl SyncWalk {
    pub fn new(start: HighWaterMark) -> Self {
        Self {
            start,
            newest: None,
            pages: 0,
        }
    }

    pub fn start(&self) -> HighWaterMark {
        self.start
    }

    pub fn is_baseline(&self) -> bool {
        !self.start.is_initialized()
    }

    pub fn pages_seen(&self) -> usize {
        self.pages
    }

    pub fn accept<'a, T: Sequenced>(&mut self, page: &'a Page<T>) -> PageVerdict<'a, T> {
        self.pages += 1;
        if self.pages == 1 {
            self.newest = page
                .items
                .first()
                .map(|item| HighWaterMark::new(item.sequence_id()));
        }

        if self.is_baseline() {
            return PageVerdict {
                fresh: &[],
                step: self.finish(),
            };
        }

        let fresh = fresh_prefix(&page.items, self.start);
        let reached_mark = fresh.len() < page.items.len();
        let step = match page.next_cursor.as_deref() {
            Some(cursor) if !page.items.is_empty() && !reached_mark => WalkStep::Continue {
                cursor: cursor.to_string(),
            },
            _ => self.finish(),
        };

        PageVerdict { fresh, step }
    }

    fn finish(&self) -> WalkStep {
        let mark = match self.newest {
            Some(newest) => self.start.advanced_to(newest),
            None => self.start,
        };
        WalkStep::Finished { mark }
    }
}
