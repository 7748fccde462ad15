//! Complete, ordered retrieval of a project's raw records.
//!
//! Both strategies are exposed as lazy streams yielding one item per
//! chunk/page; [`drain`] collects a stream into a [`Retrieval`]. Units are
//! fetched strictly in order, one request (plus retries) at a time.

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{FetchError, FetchUnit, RetrievalError};
use crate::model::raw::RawRecord;
use crate::providers::{BatchSource, PageSource};
use crate::retry::{RetryController, RetryOutcome};

/// The ADO batch endpoint refuses more than 200 ids per call.
pub const ADO_BATCH_SIZE: usize = 200;
pub const JIRA_PAGE_SIZE: usize = 100;

#[derive(Debug)]
pub enum Fetched {
    Records {
        unit: FetchUnit,
        records: Vec<RawRecord>,
    },
    /// Retries ran out; the run moves on to the next unit.
    Skipped {
        unit: FetchUnit,
        expected: Option<usize>,
        error: FetchError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedUnit {
    pub unit: FetchUnit,
    /// Records the unit should have held, when known.
    pub expected: Option<usize>,
    pub reason: String,
}

/// Everything obtained for one project, including what went wrong.
#[derive(Debug, Default)]
pub struct Retrieval {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedUnit>,
    /// Number of ids enumerated up front (id-then-batch only).
    pub enumerated: Option<usize>,
    /// Set when retrieval stopped early; `records` holds what came before.
    pub aborted: Option<RetrievalError>,
    /// Chunks or pages drained from the stream, skipped and aborting ones
    /// included. Retries and the id query are not counted.
    pub units: usize,
}

impl Retrieval {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.aborted.is_none()
    }
}

pub async fn drain<S>(stream: S) -> Retrieval
where
    S: Stream<Item = Result<Fetched, RetrievalError>>,
{
    let mut retrieval = Retrieval::default();
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        retrieval.units += 1;
        match item {
            Ok(Fetched::Records { unit, records }) => {
                debug!(%unit, records = records.len(), "collected");
                retrieval.records.extend(records);
            }
            Ok(Fetched::Skipped {
                unit,
                expected,
                error,
            }) => retrieval.skipped.push(SkippedUnit {
                unit,
                expected,
                reason: error.to_string(),
            }),
            Err(err) => {
                retrieval.aborted = Some(err);
                break;
            }
        }
    }
    retrieval
}

// ---------------------------------------------------------------------------
// Id-then-batch
// ---------------------------------------------------------------------------

/// Enumerate every id of `project`, then stream the records back in
/// fixed-size chunks. Failing to enumerate ids aborts the project.
pub async fn batched<'a>(
    source: &'a dyn BatchSource,
    controller: &'a RetryController,
    project: &'a str,
    batch_size: usize,
) -> Result<(usize, impl Stream<Item = Result<Fetched, RetrievalError>> + 'a), RetrievalError> {
    let abort = |source_err| RetrievalError {
        project: project.to_string(),
        unit: FetchUnit::IdQuery,
        source: source_err,
    };

    controller.cancel_token().check().map_err(abort)?;
    let ids = match controller
        .run("id query", || source.fetch_ids(project))
        .await
        .map_err(abort)?
    {
        RetryOutcome::Succeeded(ids) => ids,
        RetryOutcome::Exhausted { last_error, .. } => return Err(abort(last_error)),
    };

    let total = ids.len();
    debug!(project, ids = total, "enumerated work item ids");

    let chunks: Vec<Vec<i64>> = ids
        .chunks(batch_size.max(1))
        .map(|c| c.to_vec())
        .collect();
    let cursor = BatchCursor {
        source,
        controller,
        project,
        chunks: chunks.into_iter().enumerate(),
        halted: false,
    };

    let stream = stream::unfold(cursor, |mut cursor| async move {
        let item = cursor.next().await?;
        Some((item, cursor))
    });
    Ok((total, stream))
}

struct BatchCursor<'a> {
    source: &'a dyn BatchSource,
    controller: &'a RetryController,
    project: &'a str,
    chunks: std::iter::Enumerate<std::vec::IntoIter<Vec<i64>>>,
    halted: bool,
}

impl BatchCursor<'_> {
    async fn next(&mut self) -> Option<Result<Fetched, RetrievalError>> {
        if self.halted {
            return None;
        }
        let (index, ids) = self.chunks.next()?;
        let unit = FetchUnit::Chunk(index);

        if let Err(err) = self.controller.cancel_token().check() {
            self.halted = true;
            return Some(Err(self.error(unit, err)));
        }

        let label = unit.to_string();
        let (source, project) = (self.source, self.project);
        let outcome = self
            .controller
            .run(&label, || source.fetch_batch(project, &ids))
            .await;

        let item = match outcome {
            Ok(RetryOutcome::Succeeded(items)) => {
                debug!(project, chunk = index, records = items.len(), "fetched chunk");
                Ok(Fetched::Records {
                    unit,
                    records: items.into_iter().map(RawRecord::Ado).collect(),
                })
            }
            Ok(RetryOutcome::Exhausted {
                attempts,
                last_error,
            }) => {
                warn!(project, chunk = index, ids = ids.len(), attempts, "skipping chunk");
                Ok(Fetched::Skipped {
                    unit,
                    expected: Some(ids.len()),
                    error: last_error,
                })
            }
            Err(err) => {
                self.halted = true;
                return Some(Err(self.error(unit, err)));
            }
        };

        // paced after every chunk, the last one included
        self.controller.pace().await;
        Some(item)
    }

    fn error(&self, unit: FetchUnit, source: FetchError) -> RetrievalError {
        RetrievalError {
            project: self.project.to_string(),
            unit,
            source,
        }
    }
}

pub async fn retrieve_batched(
    source: &dyn BatchSource,
    controller: &RetryController,
    project: &str,
) -> Retrieval {
    match batched(source, controller, project, ADO_BATCH_SIZE).await {
        Ok((total, stream)) => {
            let mut retrieval = drain(stream).await;
            retrieval.enumerated = Some(total);
            retrieval
        }
        Err(err) => Retrieval {
            aborted: Some(err),
            ..Retrieval::default()
        },
    }
}

// ---------------------------------------------------------------------------
// Offset pagination
// ---------------------------------------------------------------------------

/// Stream pages starting at offset 0 until a page comes back short.
pub fn paged<'a>(
    source: &'a dyn PageSource,
    controller: &'a RetryController,
    project_key: &'a str,
    page_size: usize,
) -> impl Stream<Item = Result<Fetched, RetrievalError>> + 'a {
    let cursor = PageCursor {
        source,
        controller,
        project_key,
        page_size: page_size.max(1),
        start_at: 0,
        index: 0,
        known_total: None,
        finished: false,
    };
    stream::unfold(cursor, |mut cursor| async move {
        let item = cursor.next().await?;
        Some((item, cursor))
    })
}

struct PageCursor<'a> {
    source: &'a dyn PageSource,
    controller: &'a RetryController,
    project_key: &'a str,
    page_size: usize,
    start_at: usize,
    index: usize,
    /// Last `total` the server reported.
    known_total: Option<u64>,
    finished: bool,
}

impl PageCursor<'_> {
    async fn next(&mut self) -> Option<Result<Fetched, RetrievalError>> {
        if self.finished {
            return None;
        }
        let unit = FetchUnit::Page(self.index);

        if let Err(err) = self.controller.cancel_token().check() {
            self.finished = true;
            return Some(Err(self.error(unit, err)));
        }

        let label = unit.to_string();
        let (source, key, start_at, page_size) =
            (self.source, self.project_key, self.start_at, self.page_size);
        let outcome = self
            .controller
            .run(&label, || source.fetch_page(key, start_at, page_size))
            .await;

        let item = match outcome {
            Ok(RetryOutcome::Succeeded(page)) => {
                if page.total.is_some() {
                    self.known_total = page.total;
                }
                let count = page.issues.len();
                debug!(project = key, page = self.index, start_at, records = count, "fetched page");
                if count < page_size {
                    self.finished = true;
                } else {
                    self.start_at += page_size;
                }
                Ok(Fetched::Records {
                    unit,
                    records: page.issues.into_iter().map(RawRecord::Jira).collect(),
                })
            }
            Ok(RetryOutcome::Exhausted {
                attempts,
                last_error,
            }) => {
                // without a reported total there is no telling whether more pages exist
                let next = start_at + page_size;
                let expected = self
                    .known_total
                    .map(|t| (t.saturating_sub(start_at as u64) as usize).min(page_size));
                match self.known_total {
                    Some(total) if (next as u64) < total => self.start_at = next,
                    _ => self.finished = true,
                }
                warn!(project = key, page = self.index, start_at, attempts, "skipping page");
                Ok(Fetched::Skipped {
                    unit,
                    expected,
                    error: last_error,
                })
            }
            Err(err) => {
                self.finished = true;
                return Some(Err(self.error(unit, err)));
            }
        };

        self.index += 1;
        self.controller.pace().await;
        Some(item)
    }

    fn error(&self, unit: FetchUnit, source: FetchError) -> RetrievalError {
        RetrievalError {
            project: self.project_key.to_string(),
            unit,
            source,
        }
    }
}

pub async fn retrieve_paged(
    source: &dyn PageSource,
    controller: &RetryController,
    project_key: &str,
) -> Retrieval {
    drain(paged(source, controller, project_key, JIRA_PAGE_SIZE)).await
}
